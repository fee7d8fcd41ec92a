//! Periodic rounds: attempt every probe, apply outcomes, aggregate, report

use crate::aggregator::{AvailabilityAggregator, DomainStats};
use crate::config::Config;
use crate::executor::{ProbeOutcome, ProbeRunner};
use crate::registry::ProbeRegistry;
use crate::reporter::{AvailabilityReport, Reporter};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// What one completed round did
#[derive(Debug, Clone)]
pub struct RoundSummary {
    pub round_id: String,
    pub attempted: usize,
    pub up: usize,
    pub down: usize,
    pub duration: Duration,
    pub stats: DomainStats,
    pub report: AvailabilityReport,
}

/// Drives rounds on a fixed cadence until its token is cancelled
pub struct SchedulingLoop {
    registry: ProbeRegistry,
    runner: Arc<dyn ProbeRunner>,
    round_interval: Duration,
    max_concurrency: usize,
    token: CancellationToken,
    rounds_completed: u64,
}

impl SchedulingLoop {
    pub fn new(
        registry: ProbeRegistry,
        runner: Arc<dyn ProbeRunner>,
        config: &Config,
        token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            runner,
            round_interval: config.round_interval,
            max_concurrency: config.max_concurrency.max(1),
            token,
            rounds_completed: 0,
        }
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Run until cancelled, then hand the registry back for a final report
    pub async fn run(mut self) -> ProbeRegistry {
        info!(
            "Scheduling loop started with {} probes every {:?}",
            self.registry.len(),
            self.round_interval
        );

        self.drive(None).await;

        info!("Scheduling loop stopped after {} rounds", self.rounds_completed);
        self.registry
    }

    /// Run at most `rounds` rounds on the normal cadence
    pub async fn run_rounds(&mut self, rounds: usize) -> Vec<RoundSummary> {
        self.drive(Some(rounds)).await
    }

    async fn drive(&mut self, limit: Option<usize>) -> Vec<RoundSummary> {
        let mut ticker = interval(self.round_interval);
        // A round that overruns pushes the next one back instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summaries = Vec::new();

        while limit.is_none_or(|limit| summaries.len() < limit) {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_round().await {
                // Unbounded runs would otherwise keep every summary forever
                Some(summary) if limit.is_some() => summaries.push(summary),
                Some(_) => {}
                None => break,
            }
        }

        summaries
    }

    /// Run one round now. Returns `None` if cancelled before it completed,
    /// in which case no outcome of that round is applied.
    pub async fn run_round(&mut self) -> Option<RoundSummary> {
        let round_id = Uuid::new_v4().to_string();
        let span = info_span!("round", round_id = %round_id);
        self.round(round_id).instrument(span).await
    }

    async fn round(&mut self, round_id: String) -> Option<RoundSummary> {
        let started = Instant::now();

        let outcomes = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                info!("Round cancelled, discarding in-flight attempts");
                return None;
            }
            outcomes = self.attempt_all() => outcomes,
        };

        let attempted = outcomes.len();
        let mut up = 0;
        for (url, outcome) in &outcomes {
            if outcome.is_up() {
                up += 1;
            }
            if !self.registry.apply(url, outcome) {
                warn!("Outcome for unregistered probe {} dropped", url);
            }
        }

        let stats = AvailabilityAggregator::aggregate(&self.registry);
        let report = Reporter::emit(&stats);

        self.rounds_completed += 1;
        let duration = started.elapsed();
        debug!(
            attempted,
            up,
            down = attempted - up,
            elapsed_ms = duration.as_millis() as u64,
            "Round complete"
        );

        Some(RoundSummary {
            round_id,
            attempted,
            up,
            down: attempted - up,
            duration,
            stats,
            report,
        })
    }

    /// Attempt every probe of a snapshot with bounded parallelism
    async fn attempt_all(&self) -> Vec<(String, ProbeOutcome)> {
        let runner = &self.runner;

        stream::iter(self.registry.snapshot())
            .map(|probe| async move {
                let outcome = runner.attempt(&probe).await;
                (probe.url, outcome)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MonitorError;
    use crate::executor::{LATENCY_THRESHOLD, ProbeExecutor};
    use crate::probe::{AvailabilityPair, Probe, ProbeDefinition};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Up when the URL path contains "up", down otherwise
    struct ScriptedRunner {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedRunner {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProbeRunner for ScriptedRunner {
        async fn attempt(&self, probe: &Probe) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if probe.url.contains("up") {
                ProbeOutcome::classify(200, Duration::from_millis(5), LATENCY_THRESHOLD)
            } else {
                ProbeOutcome::request_failed(MonitorError::Timeout(Duration::from_secs(10)))
            }
        }
    }

    fn test_config(max_concurrency: usize) -> Config {
        Config {
            round_interval: Duration::from_millis(20),
            max_concurrency,
            ..Config::default()
        }
    }

    fn registry() -> ProbeRegistry {
        ProbeRegistry::from_definitions(vec![
            ProbeDefinition::new("a", "http://x.test/up/a"),
            ProbeDefinition::new("b", "http://x.test/down/b"),
            ProbeDefinition::new("c", "http://y.test/up/c"),
        ])
    }

    #[tokio::test]
    async fn test_rounds_accumulate_counters() {
        let runner = Arc::new(ScriptedRunner::new(Duration::ZERO));
        let mut scheduler =
            SchedulingLoop::new(registry(), runner.clone(), &test_config(4), CancellationToken::new());

        let summaries = scheduler.run_rounds(3).await;

        assert_eq!(summaries.len(), 3);
        assert_eq!(scheduler.rounds_completed(), 3);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 9);
        assert!(summaries.iter().all(|s| s.attempted == 3 && s.up == 2 && s.down == 1));

        let last = summaries.last().unwrap();
        assert_eq!(last.stats.get("x.test"), Some(&AvailabilityPair::new(3, 3)));
        assert_eq!(last.stats.get("y.test"), Some(&AvailabilityPair::new(3, 0)));

        let lines: Vec<&str> = last.report.domains.iter().map(|d| d.line.as_str()).collect();
        assert_eq!(
            lines,
            vec![
                "x.test has 50% availability percentage",
                "y.test has 100% availability percentage",
            ]
        );
    }

    #[tokio::test]
    async fn test_every_probe_gets_exactly_one_outcome_per_round() {
        let runner = Arc::new(ScriptedRunner::new(Duration::ZERO));
        let mut scheduler =
            SchedulingLoop::new(registry(), runner, &test_config(2), CancellationToken::new());

        scheduler.run_round().await.unwrap();

        assert!(scheduler.registry().all().all(|p| p.availability.total() == 1));
    }

    #[tokio::test]
    async fn test_fan_out_respects_concurrency_limit() {
        let definitions = (0..6)
            .map(|i| ProbeDefinition::new(format!("p{}", i), format!("http://x.test/up/{}", i)));
        let runner = Arc::new(ScriptedRunner::new(Duration::from_millis(30)));
        let mut scheduler = SchedulingLoop::new(
            ProbeRegistry::from_definitions(definitions),
            runner.clone(),
            &test_config(2),
            CancellationToken::new(),
        );

        let summary = scheduler.run_round().await.unwrap();

        assert_eq!(summary.attempted, 6);
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let runner = Arc::new(ScriptedRunner::new(Duration::ZERO));
        let scheduler = SchedulingLoop::new(registry(), runner.clone(), &test_config(4), token);

        let registry = scheduler.run().await;

        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert!(registry.all().all(|p| p.availability.total() == 0));
    }

    #[tokio::test]
    async fn test_cancel_mid_round_discards_outcomes() {
        let token = CancellationToken::new();
        let runner = Arc::new(ScriptedRunner::new(Duration::from_secs(5)));
        let scheduler = SchedulingLoop::new(registry(), runner, &test_config(4), token.clone());

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let registry = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop after cancellation")
            .unwrap();

        assert!(registry.all().all(|p| p.availability.total() == 0));
    }

    #[tokio::test]
    async fn test_url_with_space_reports_under_its_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a%20b"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = format!("http://127.0.0.1:{}/a b", server.address().port());
        let registry = ProbeRegistry::from_definitions(vec![ProbeDefinition::new("space", url)]);
        let executor = Arc::new(ProbeExecutor::with_defaults().unwrap());
        let mut scheduler =
            SchedulingLoop::new(registry, executor, &test_config(4), CancellationToken::new());

        let summary = scheduler.run_round().await.unwrap();

        assert!(!summary.stats.contains_key(""));
        assert_eq!(summary.stats.get("127.0.0.1"), Some(&AvailabilityPair::new(1, 0)));
        assert_eq!(
            summary.report.domains[0].line,
            "127.0.0.1 has 100% availability percentage"
        );
    }

    #[tokio::test]
    async fn test_round_against_live_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let port = server.address().port();
        let registry = ProbeRegistry::from_definitions(vec![
            ProbeDefinition::new("ok", format!("http://127.0.0.1:{}/ok", port)),
            ProbeDefinition::new("broken", format!("http://localhost:{}/broken", port)),
        ]);
        let executor = Arc::new(ProbeExecutor::with_defaults().unwrap());
        let mut scheduler =
            SchedulingLoop::new(registry, executor, &test_config(4), CancellationToken::new());

        let summaries = scheduler.run_rounds(2).await;
        let last = summaries.last().unwrap();

        assert_eq!(last.stats.get("127.0.0.1"), Some(&AvailabilityPair::new(2, 0)));
        assert_eq!(last.stats.get("localhost"), Some(&AvailabilityPair::new(0, 2)));
    }
}
