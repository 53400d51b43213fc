use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HOST, HeaderName, HeaderValue, USER_AGENT};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::{Host, Position, Url};

use super::error::{ProbeError, ProbeStage};
use super::tls;
use super::types::{MonitorSpec, ProbeResult, RequestBody, ResponseData, Timing};

/// Response bytes kept per probe
pub const DEFAULT_BODY_LIMIT: usize = 2048;

/// User agent sent with every probe
pub const DEFAULT_USER_AGENT: &str = concat!("uppe-synthetics/", env!("CARGO_PKG_VERSION"));

/// Everything needed for a single probe
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }
}

impl From<&MonitorSpec> for ProbeRequest {
    fn from(spec: &MonitorSpec) -> Self {
        Self {
            method: spec.method.clone(),
            url: spec.url.clone(),
            headers: spec.headers.clone(),
            body: spec.body.clone(),
            timeout: spec.timeout,
        }
    }
}

trait ProbeIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProbeIo for T {}

/// Where a probe connects to, resolved from the URL
struct Target {
    host: Host<String>,
    port: u16,
    tls: bool,
    authority: String,
    path_and_query: String,
}

impl Target {
    fn parse(raw: &str) -> Result<Self, ProbeError> {
        let url = Url::parse(raw).map_err(ProbeError::invalid_request)?;

        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(ProbeError::invalid_request(format!("unsupported scheme {other}"))),
        };
        let host = url
            .host()
            .map(|host| host.to_owned())
            .ok_or_else(|| ProbeError::invalid_request("url has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::invalid_request("url has no port"))?;

        let mut path_and_query = url.path().to_string();
        if let Some(query) = url.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Ok(Self {
            host,
            port,
            tls,
            authority: url[Position::BeforeHost..Position::AfterPort].to_string(),
            path_and_query,
        })
    }

    async fn resolve(&self) -> io::Result<SocketAddr> {
        match &self.host {
            Host::Ipv4(ip) => Ok(SocketAddr::new(IpAddr::V4(*ip), self.port)),
            Host::Ipv6(ip) => Ok(SocketAddr::new(IpAddr::V6(*ip), self.port)),
            Host::Domain(domain) => tokio::net::lookup_host((domain.as_str(), self.port))
                .await?
                .next()
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {domain}"))
                }),
        }
    }

    fn server_name(&self) -> Result<ServerName<'static>, ProbeError> {
        match &self.host {
            Host::Ipv4(ip) => Ok(ServerName::from(IpAddr::V4(*ip))),
            Host::Ipv6(ip) => Ok(ServerName::from(IpAddr::V6(*ip))),
            Host::Domain(domain) => ServerName::try_from(domain.clone())
                .map_err(|e| ProbeError::new(ProbeStage::TlsHandshake, e)),
        }
    }
}

/// Run `future` against the probe deadline, attributing failures to `stage`
async fn within<T, E, F>(
    deadline: Instant,
    budget: Duration,
    stage: ProbeStage,
    future: F,
) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match timeout_at(deadline, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ProbeError::new(stage, error)),
        Err(_) => Err(ProbeError::timeout(stage, budget)),
    }
}

/// Anything that can run a probe; the worker pool only depends on this
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError>;
}

/// Executes instrumented HTTP probes
///
/// Holds no mutable state; one executor is shared by every worker.
pub struct ProbeExecutor {
    connector: TlsConnector,
    user_agent: String,
    body_limit: usize,
}

impl ProbeExecutor {
    /// Create an executor trusting the platform root certificates
    pub fn new(user_agent: impl Into<String>, body_limit: usize) -> Result<Self> {
        Ok(Self::with_client_config(tls::native_client_config()?, user_agent, body_limit))
    }

    pub fn with_client_config(
        config: ClientConfig,
        user_agent: impl Into<String>,
        body_limit: usize,
    ) -> Self {
        Self {
            connector: TlsConnector::from(Arc::new(config)),
            user_agent: user_agent.into(),
            body_limit,
        }
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Perform one probe: a single network attempt, no redirects followed.
    ///
    /// `request.timeout` bounds everything from DNS resolution to the last
    /// captured body byte. Reading stops once `body_limit` bytes have been
    /// captured, so `content_transfer` measures the capped read.
    ///
    /// hyper does not report when the request has been flushed, so
    /// `server_processing` runs from the ready connection to the first
    /// response byte and includes writing the request and its body.
    pub async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError> {
        let target = Target::parse(&request.url)?;
        let http_request = self.build_request(request, &target)?;

        let budget = request.timeout;
        let started = Instant::now();
        let deadline = started + budget;

        let address = within(deadline, budget, ProbeStage::DnsLookup, target.resolve()).await?;
        let resolved = Instant::now();

        let stream =
            within(deadline, budget, ProbeStage::TcpConnection, TcpStream::connect(address)).await?;
        // Best effort; the probe works either way
        let _ = stream.set_nodelay(true);
        let connected = Instant::now();

        let (io, tls_info): (Box<dyn ProbeIo>, _) = if target.tls {
            let server_name = target.server_name()?;
            let stream = within(
                deadline,
                budget,
                ProbeStage::TlsHandshake,
                self.connector.connect(server_name, stream),
            )
            .await?;
            let info = tls::session_info(stream.get_ref().1);
            (Box::new(stream), info)
        } else {
            (Box::new(stream), None)
        };
        let secured = Instant::now();

        let (mut sender, connection) = within(
            deadline,
            budget,
            ProbeStage::ServerProcessing,
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(io)),
        )
        .await?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Probe connection closed with error: {}", e);
            }
        });

        let outcome = async {
            let response = within(
                deadline,
                budget,
                ProbeStage::ServerProcessing,
                sender.send_request(http_request),
            )
            .await?;
            let first_byte = Instant::now();

            let status_code = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
                })
                .collect();

            let mut body = response.into_body();
            let mut captured = Vec::with_capacity(self.body_limit.min(64 * 1024));
            while captured.len() < self.body_limit {
                let frame = match timeout_at(deadline, body.frame()).await {
                    Ok(Some(frame)) => frame.map_err(|e| ProbeError::new(ProbeStage::ContentTransfer, e))?,
                    Ok(None) => break,
                    Err(_) => return Err(ProbeError::timeout(ProbeStage::ContentTransfer, budget)),
                };
                if let Ok(data) = frame.into_data() {
                    let take = data.len().min(self.body_limit - captured.len());
                    captured.extend_from_slice(&data[..take]);
                }
            }
            let finished = Instant::now();

            Ok::<_, ProbeError>((ResponseData { status_code, headers, body: captured }, first_byte, finished))
        }
        .await;

        // Dropping the connection mid-body is how the read is capped
        connection.abort();
        let (response, first_byte, finished) = outcome?;

        let timing = Timing {
            dns_lookup: resolved - started,
            tcp_connection: connected - resolved,
            tls_handshake: secured - connected,
            server_processing: first_byte - secured,
            content_transfer: finished - first_byte,
            total: finished - started,
        };

        Ok(ProbeResult { response, timing, tls: tls_info })
    }

    fn build_request(
        &self,
        request: &ProbeRequest,
        target: &Target,
    ) -> Result<Request<Full<Bytes>>, ProbeError> {
        let method = Method::from_bytes(request.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(ProbeError::invalid_request)?;

        let mut builder = Request::builder().method(method).uri(target.path_and_query.as_str());
        let headers = builder
            .headers_mut()
            .ok_or_else(|| ProbeError::invalid_request("request builder is in an error state"))?;

        if let Some(body) = &request.body {
            if !body.content_type.is_empty() {
                let value = HeaderValue::from_str(&body.content_type).map_err(ProbeError::invalid_request)?;
                headers.insert(CONTENT_TYPE, value);
            }
        }

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(ProbeError::invalid_request)?;
            if name == HOST || name == USER_AGENT {
                continue;
            }
            let value = HeaderValue::from_str(value).map_err(ProbeError::invalid_request)?;
            if name == CONTENT_TYPE {
                headers.insert(name, value);
            } else {
                headers.append(name, value);
            }
        }

        let host = HeaderValue::from_str(&target.authority).map_err(ProbeError::invalid_request)?;
        headers.insert(HOST, host);
        let user_agent = HeaderValue::from_str(&self.user_agent).map_err(ProbeError::invalid_request)?;
        headers.insert(USER_AGENT, user_agent);

        let body = match &request.body {
            Some(body) => Full::new(Bytes::from(body.data.clone())),
            None => Full::new(Bytes::new()),
        };

        builder.body(body).map_err(ProbeError::invalid_request)
    }
}

#[async_trait]
impl Probe for ProbeExecutor {
    async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError> {
        ProbeExecutor::probe(self, request).await
    }
}
