/// Monitoring engine module - instrumented HTTP probes
///
/// This module is responsible for:
/// - Executing a single HTTP/HTTPS request per probe
/// - Breaking its latency down into DNS, TCP, TLS, server and transfer phases
/// - Capturing a bounded slice of the response and the TLS session details
/// - Scheduling recurring checks onto the task queue and working them off
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod tls;
pub mod types;
pub mod worker;

pub use error::{ProbeError, ProbeStage};
pub use scheduler::{MonitoringScheduler, SyncReport};
pub use worker::WorkerPool;
pub use executor::{DEFAULT_BODY_LIMIT, DEFAULT_USER_AGENT, Probe, ProbeExecutor, ProbeRequest};
pub use types::{
    CertificateInfo, CheckRecord, MonitorSpec, MonitorStatus, ProbeResult, RequestBody,
    ResponseData, Task, Timing, TlsInfo,
};
