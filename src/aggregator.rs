//! Per-domain roll-up of probe counters

use crate::probe::{AvailabilityPair, Probe};
use crate::registry::ProbeRegistry;
use std::collections::HashMap;

/// Domain to summed counters, rebuilt from scratch on every reporting cycle
pub type DomainStats = HashMap<String, AvailabilityPair>;

pub struct AvailabilityAggregator;

impl AvailabilityAggregator {
    /// Sum every probe's counters into its domain's bucket.
    ///
    /// Domains are compared as raw strings, so `Example.com` and
    /// `example.com.` land in separate buckets.
    pub fn aggregate(registry: &ProbeRegistry) -> DomainStats {
        Self::aggregate_probes(registry.all())
    }

    pub fn aggregate_probes<'a>(probes: impl IntoIterator<Item = &'a Probe>) -> DomainStats {
        let mut stats = DomainStats::new();
        for probe in probes {
            *stats.entry(probe.domain.clone()).or_default() += probe.availability;
        }
        stats
    }
}
