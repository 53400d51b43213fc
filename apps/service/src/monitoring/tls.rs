//! TLS client setup and extraction of negotiated session details.

use std::sync::Arc;

use anyhow::Result;
use chrono::DateTime;
use rustls::{ClientConfig, ClientConnection, ProtocolVersion, RootCertStore};
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

use super::types::{CertificateInfo, TlsInfo};

/// Client configuration trusting the platform's root certificates
pub fn native_client_config() -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        warn!("Failed to load a native root certificate: {}", error);
    }

    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "Loaded native root certificates");
    if added == 0 {
        warn!("No root certificates available - HTTPS probes will fail verification");
    }

    client_config(roots)
}

/// Client configuration with an explicit trust store
pub fn client_config(roots: RootCertStore) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    // Probes speak HTTP/1.1 only
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

pub(crate) fn version_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_2 => "TLS 1.2".to_string(),
        ProtocolVersion::TLSv1_3 => "TLS 1.3".to_string(),
        other => format!("{other:?}"),
    }
}

/// Details of an established session; `None` if the leaf certificate is
/// missing or unparsable
pub(crate) fn session_info(connection: &ClientConnection) -> Option<TlsInfo> {
    let version = version_name(connection.protocol_version()?);
    let cipher = format!("{:?}", connection.negotiated_cipher_suite()?.suite());
    let leaf = connection.peer_certificates()?.first()?;

    match parse_certificate(leaf.as_ref()) {
        Some(certificate) => Some(TlsInfo { version, cipher, certificate }),
        None => {
            warn!("Could not parse the peer's leaf certificate");
            None
        }
    }
}

pub(crate) fn parse_certificate(der: &[u8]) -> Option<CertificateInfo> {
    let (_, certificate) = X509Certificate::from_der(der).ok()?;

    let issuer = certificate
        .issuer()
        .iter_organization()
        .next()
        .and_then(|attribute| attribute.as_str().ok())
        .unwrap_or_default()
        .to_string();
    let subject = certificate
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attribute| attribute.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let validity = certificate.validity();
    Some(CertificateInfo {
        issuer,
        subject,
        not_before: DateTime::from_timestamp(validity.not_before.timestamp(), 0)?,
        not_after: DateTime::from_timestamp(validity.not_after.timestamp(), 0)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_version_names() {
        assert_eq!(version_name(ProtocolVersion::TLSv1_3), "TLS 1.3");
        assert_eq!(version_name(ProtocolVersion::TLSv1_2), "TLS 1.2");
    }

    #[test]
    fn test_garbage_certificate_is_rejected() {
        assert!(parse_certificate(b"not a certificate").is_none());
    }

    #[test]
    fn test_certificate_fields() {
        let der = include_bytes!("../../tests/fixtures/loopback.cert.der");
        let info = parse_certificate(der).unwrap();

        assert_eq!(info.issuer, "Uppe Test");
        assert_eq!(info.subject, "127.0.0.1");
        assert_eq!(info.not_before, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(info.not_after, Utc.with_ymd_and_hms(2124, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_client_config_builds_with_empty_store() {
        let config = client_config(RootCertStore::empty()).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }
}
