//! Registry of probes keyed by endpoint URL

use crate::executor::ProbeOutcome;
use crate::probe::{Probe, ProbeDefinition};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Owns every configured probe for the lifetime of the process.
///
/// Exactly one entry exists per distinct URL; when the probe file declares
/// the same URL twice the later definition replaces the earlier one.
#[derive(Debug, Default, Clone)]
pub struct ProbeRegistry {
    probes: HashMap<String, Probe>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of definitions
    pub fn from_definitions(definitions: impl IntoIterator<Item = ProbeDefinition>) -> Self {
        let mut registry = Self::new();
        registry.register(definitions);
        registry
    }

    /// Register definitions, deriving each probe's domain.
    ///
    /// A URL that does not parse is not fatal: the probe is kept under an
    /// empty domain and will record failures when executed.
    pub fn register(&mut self, definitions: impl IntoIterator<Item = ProbeDefinition>) {
        for definition in definitions {
            let (probe, parsed) = Probe::from_definition(definition);

            if !parsed {
                warn!(
                    probe = %probe.name,
                    url = %probe.url,
                    "Could not derive a domain from probe URL, registering under empty domain"
                );
            }

            if let Some(previous) = self.probes.insert(probe.url.clone(), probe) {
                debug!(
                    "Probe {} replaced by a later definition for {}",
                    previous.name, previous.url
                );
            }
        }
    }

    /// All registered probes. Iteration order is unspecified.
    pub fn all(&self) -> impl Iterator<Item = &Probe> + '_ {
        self.probes.values()
    }

    pub fn get(&self, url: &str) -> Option<&Probe> {
        self.probes.get(url)
    }

    /// Copy of every probe, taken at round start so attempts run against
    /// a stable set while the registry itself stays untouched.
    pub fn snapshot(&self) -> Vec<Probe> {
        self.probes.values().cloned().collect()
    }

    /// Apply one attempt's outcome to the probe stored under `url`.
    ///
    /// Returns `false` when no such probe is registered.
    pub fn apply(&mut self, url: &str, outcome: &ProbeOutcome) -> bool {
        match self.probes.get_mut(url) {
            Some(probe) => {
                outcome.apply_to(&mut probe.availability);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
