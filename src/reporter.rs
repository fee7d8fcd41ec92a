//! Availability percentages and the per-domain report lines

use crate::aggregator::DomainStats;
use crate::probe::AvailabilityPair;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// One domain's line in a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainAvailability {
    pub domain: String,
    pub successes: u64,
    pub failures: u64,
    /// Rounded percentage, `None` when the domain has no attempts yet
    pub percentage: Option<u8>,
    pub line: String,
}

/// Snapshot of every domain's availability at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityReport {
    pub generated_at: DateTime<Utc>,
    pub domains: Vec<DomainAvailability>,
}

pub struct Reporter;

impl Reporter {
    /// `successes / total * 100`, rounded half up. `None` when total is zero.
    pub fn percentage(pair: &AvailabilityPair) -> Option<u8> {
        let total = pair.total();
        if total == 0 {
            return None;
        }
        // floor(100 * s / t + 1/2) in integers
        let rounded = (200 * pair.successes + total) / (2 * total);
        Some(rounded as u8)
    }

    /// Render the line for one domain
    pub fn format(domain: &str, pair: &AvailabilityPair) -> String {
        match Self::percentage(pair) {
            Some(percentage) => format!("{} has {}% availability percentage", domain, percentage),
            None => format!("{} has no data", domain),
        }
    }

    /// Build a report ordered by domain
    pub fn report(stats: &DomainStats) -> AvailabilityReport {
        let mut domains: Vec<DomainAvailability> = stats
            .iter()
            .map(|(domain, pair)| DomainAvailability {
                domain: domain.clone(),
                successes: pair.successes,
                failures: pair.failures,
                percentage: Self::percentage(pair),
                line: Self::format(domain, pair),
            })
            .collect();
        domains.sort_by(|a, b| a.domain.cmp(&b.domain));

        AvailabilityReport {
            generated_at: Utc::now(),
            domains,
        }
    }

    /// Build the report and log one line per domain
    pub fn emit(stats: &DomainStats) -> AvailabilityReport {
        let report = Self::report(stats);
        for entry in &report.domains {
            info!(
                domain = %entry.domain,
                successes = entry.successes,
                failures = entry.failures,
                percentage = entry.percentage,
                "{}",
                entry.line
            );
        }
        report
    }
}
