//! Single probe attempts over HTTP and their classification

use crate::errors::{MonitorError, Result};
use crate::probe::{AvailabilityPair, Probe};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Request};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Per-request network timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A 2xx response must start arriving strictly before this to count as up
pub const LATENCY_THRESHOLD: Duration = Duration::from_millis(500);

/// Result of one classified attempt
#[derive(Debug)]
pub enum ProbeOutcome {
    Up { status: u16, ttfb: Duration },
    Down(DownReason),
}

/// Why an attempt was classified as a failure
#[derive(Debug)]
pub enum DownReason {
    /// Response arrived with a status outside 2xx
    Status { status: u16, ttfb: Duration },

    /// 2xx response that arrived at or after the latency threshold
    Slow { status: u16, ttfb: Duration },

    /// No response: the request could not be built, sent, or timed out
    Request(MonitorError),
}

impl ProbeOutcome {
    /// Classify a received response.
    ///
    /// Up iff the status is in `[200, 300)` and `ttfb < latency_threshold`.
    pub fn classify(status: u16, ttfb: Duration, latency_threshold: Duration) -> Self {
        if !(200..300).contains(&status) {
            ProbeOutcome::Down(DownReason::Status { status, ttfb })
        } else if ttfb >= latency_threshold {
            ProbeOutcome::Down(DownReason::Slow { status, ttfb })
        } else {
            ProbeOutcome::Up { status, ttfb }
        }
    }

    pub fn request_failed(error: MonitorError) -> Self {
        ProbeOutcome::Down(DownReason::Request(error))
    }

    pub fn is_up(&self) -> bool {
        matches!(self, ProbeOutcome::Up { .. })
    }

    /// The transport or construction error behind a failure, if any
    pub fn error(&self) -> Option<&MonitorError> {
        match self {
            ProbeOutcome::Down(DownReason::Request(err)) => Some(err),
            _ => None,
        }
    }

    /// Record this outcome: exactly one counter grows by one.
    pub fn apply_to(&self, pair: &mut AvailabilityPair) {
        if self.is_up() {
            pair.record_success();
        } else {
            pair.record_failure();
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Up { status, ttfb } => {
                write!(f, "up (status {}, {}ms)", status, ttfb.as_millis())
            }
            ProbeOutcome::Down(reason) => write!(f, "down ({})", reason),
        }
    }
}

impl fmt::Display for DownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownReason::Status { status, ttfb } => {
                write!(f, "status {} after {}ms", status, ttfb.as_millis())
            }
            DownReason::Slow { status, ttfb } => {
                write!(f, "status {} too slow at {}ms", status, ttfb.as_millis())
            }
            DownReason::Request(err) => write!(f, "{}", err),
        }
    }
}

/// Anything that can perform one attempt against a probe
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn attempt(&self, probe: &Probe) -> ProbeOutcome;
}

/// Issues probe requests with a shared HTTP client
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    client: Client,
    timeout: Duration,
    latency_threshold: Duration,
}

impl ProbeExecutor {
    /// Create a new executor
    pub fn new(request_timeout: Duration, latency_threshold: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(format!("availability_monitor/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MonitorError::Http)?;

        Ok(Self {
            client,
            timeout: request_timeout,
            latency_threshold,
        })
    }

    /// Executor with the fixed request timeout and latency threshold
    pub fn with_defaults() -> Result<Self> {
        Self::new(REQUEST_TIMEOUT, LATENCY_THRESHOLD)
    }

    /// Run one attempt and record it on the probe's counters
    pub async fn execute(&self, probe: &mut Probe) -> ProbeOutcome {
        let outcome = self.attempt(probe).await;
        outcome.apply_to(&mut probe.availability);
        outcome
    }

    /// Turn a probe into a request carrying its method, headers and body verbatim
    fn build_request(&self, probe: &Probe) -> Result<Request> {
        if probe.method.is_empty() {
            return Err(MonitorError::InvalidProbe(format!(
                "probe {} has no HTTP method",
                probe.name
            )));
        }

        let method = Method::from_bytes(probe.method.as_bytes()).map_err(|_| {
            MonitorError::InvalidProbe(format!("invalid HTTP method {:?}", probe.method))
        })?;

        let url = probe.target.clone().ok_or_else(|| {
            MonitorError::InvalidProbe(format!("invalid URL {:?}", probe.url))
        })?;

        let mut headers = HeaderMap::with_capacity(probe.headers.len());
        for (key, value) in &probe.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| MonitorError::InvalidProbe(format!("invalid header name {:?}", key)))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                MonitorError::InvalidProbe(format!("invalid value for header {:?}", key))
            })?;
            headers.insert(name, value);
        }

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = &probe.body {
            builder = builder.body(body.clone());
        }

        builder.build().map_err(MonitorError::Http)
    }

    async fn send(&self, request: Request) -> Result<(u16, Duration)> {
        let started = Instant::now();

        // `execute` resolves once the status line and headers are in, so the
        // elapsed time excludes the body download.
        let response = timeout(self.timeout, self.client.execute(request))
            .await
            .map_err(|_| MonitorError::Timeout(self.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    MonitorError::Timeout(self.timeout)
                } else {
                    MonitorError::Http(e)
                }
            })?;

        Ok((response.status().as_u16(), started.elapsed()))
    }
}

#[async_trait]
impl ProbeRunner for ProbeExecutor {
    async fn attempt(&self, probe: &Probe) -> ProbeOutcome {
        let outcome = match self.build_request(probe) {
            Ok(request) => match self.send(request).await {
                Ok((status, ttfb)) => ProbeOutcome::classify(status, ttfb, self.latency_threshold),
                Err(e) => ProbeOutcome::request_failed(e),
            },
            Err(e) => ProbeOutcome::request_failed(e),
        };

        if outcome.is_up() {
            debug!(probe = %probe.name, url = %probe.url, "Probe attempt {}", outcome);
        } else {
            warn!(probe = %probe.name, url = %probe.url, "Probe attempt {}", outcome);
        }
        outcome
    }
}
