//! Endpoint availability monitor
//!
//! Probes a fixed set of HTTP endpoints on a schedule, classifies each attempt
//! by status code and time to first byte, and reports a rolling availability
//! percentage per domain.

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod probe;
pub mod registry;
pub mod reporter;
pub mod scheduler;

pub use aggregator::{AvailabilityAggregator, DomainStats};
pub use config::Config;
pub use errors::{MonitorError, Result};
pub use executor::{DownReason, ProbeExecutor, ProbeOutcome, ProbeRunner};
pub use probe::{AvailabilityPair, Probe, ProbeDefinition};
pub use registry::ProbeRegistry;
pub use reporter::{AvailabilityReport, DomainAvailability, Reporter};
pub use scheduler::{RoundSummary, SchedulingLoop};
