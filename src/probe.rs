//! Probe definitions and their cumulative outcome counters

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use reqwest::Url;
use std::ops::AddAssign;

/// Success and failure counts, all that is needed to compute availability.
///
/// Both counters only ever grow while the process runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilityPair {
    pub successes: u64,
    pub failures: u64,
}

impl AvailabilityPair {
    pub fn new(successes: u64, failures: u64) -> Self {
        Self { successes, failures }
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Total number of classified attempts
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }
}

impl AddAssign for AvailabilityPair {
    fn add_assign(&mut self, other: Self) {
        self.successes += other.successes;
        self.failures += other.failures;
    }
}

/// One endpoint as declared in the probe file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeDefinition {
    pub name: String,
    pub url: String,

    /// HTTP method; the file loader fills in `GET` when omitted
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ProbeDefinition {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: default_method(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A registered endpoint plus its running counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Probe {
    pub name: String,
    pub url: String,
    /// Hostname of `url`, fixed at registration; empty when `url` does not parse
    pub domain: String,
    /// Parsed form of `url` that requests are sent to, `None` when unusable
    #[serde(skip)]
    pub target: Option<Url>,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub availability: AvailabilityPair,
}

impl Probe {
    /// Build a probe from its definition with zeroed counters.
    ///
    /// Returns the probe and whether the domain could be derived.
    pub fn from_definition(definition: ProbeDefinition) -> (Self, bool) {
        let (target, domain) = match parse_target(&definition.url) {
            Some((target, domain)) => (Some(target), domain),
            None => (None, String::new()),
        };
        let parsed = target.is_some();

        let probe = Self {
            name: definition.name,
            url: definition.url,
            domain,
            target,
            method: definition.method,
            headers: definition.headers,
            body: definition.body,
            availability: AvailabilityPair::default(),
        };

        (probe, parsed)
    }
}

/// Parse a probe URL into the request target and its domain.
///
/// Both come from the same parse, so a probe has a domain exactly when it can
/// be requested. The domain keeps the host as written (case, trailing dot)
/// whenever the parser did not have to rewrite it, e.g. for IDN hosts.
pub fn parse_target(raw: &str) -> Option<(Url, String)> {
    let url = Url::parse(raw).ok()?;
    let normalized = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
    if normalized.is_empty() {
        return None;
    }

    let domain = match raw_host(raw) {
        Some(host) if host.eq_ignore_ascii_case(normalized) => host.to_string(),
        _ => normalized.to_string(),
    };

    Some((url, domain))
}

/// Domain of a URL, see [`parse_target`]
pub fn derive_domain(raw: &str) -> Option<String> {
    parse_target(raw).map(|(_, domain)| domain)
}

/// Host text of the authority exactly as it appears in `raw`
fn raw_host(raw: &str) -> Option<&str> {
    let rest = &raw[raw.find("://")? + 3..];
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;

    match host_port.strip_prefix('[') {
        Some(bracketed) => bracketed.split(']').next(),
        None => host_port.split(':').next(),
    }
}
