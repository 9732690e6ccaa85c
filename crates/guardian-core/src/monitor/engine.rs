use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::GuardianConfig;
use crate::endpoint::Endpoint;
use crate::monitor::outcome::CheckOutcome;
use crate::monitor::tracker::LivenessTracker;
use crate::probe::{ProbeReport, Prober};
use crate::webhook::Notifier;

/// Counts from one pass over the endpoint list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub endpoints: usize,
    pub reachable: usize,
    pub transitions: usize,
    pub failed_deliveries: usize,
}

/// Probes every endpoint, updates liveness memory and notifies on
/// transitions.
///
/// Probes within a cycle run concurrently. Liveness memory is only touched
/// afterwards, sequentially and in endpoint order, while the tracker lock is
/// held; two cycles therefore never evaluate the same endpoint at once.
pub struct CycleRunner {
    config: GuardianConfig,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    tracker: Mutex<LivenessTracker>,
}

impl CycleRunner {
    pub fn new(
        config: GuardianConfig,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_tracker(config, prober, notifier, LivenessTracker::new())
    }

    pub fn with_tracker(
        config: GuardianConfig,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
        tracker: LivenessTracker,
    ) -> Self {
        Self {
            config,
            prober,
            notifier,
            tracker: Mutex::new(tracker),
        }
    }

    /// Run one full cycle and return one outcome per endpoint, in order.
    pub async fn run_cycle(&self, endpoints: &[Endpoint]) -> Vec<CheckOutcome> {
        let (outcomes, _) = self.run_cycle_with_summary(endpoints).await;
        outcomes
    }

    pub async fn run_cycle_with_summary(
        &self,
        endpoints: &[Endpoint],
    ) -> (Vec<CheckOutcome>, CycleSummary) {
        debug!(endpoints = endpoints.len(), "Starting check cycle");

        let reports = self.probe_all(endpoints).await;

        let outcomes: Vec<CheckOutcome> = {
            let mut tracker = self.tracker.lock().await;
            endpoints
                .iter()
                .zip(reports)
                .map(|(endpoint, (report, observed_at))| {
                    debug!(
                        endpoint = %endpoint,
                        observed_at = %observed_at,
                        reachable = report.reachable,
                        latency_ms = report.latency_ms,
                        error = report.error.as_deref(),
                        "Probe result"
                    );
                    tracker
                        .evaluate(endpoint, report.reachable, report.latency_ms)
                        .with_error(report.error)
                        .with_observed_at(observed_at)
                })
                .collect()
        };

        let mut summary = CycleSummary {
            endpoints: outcomes.len(),
            reachable: outcomes.iter().filter(|o| o.reachable).count(),
            ..CycleSummary::default()
        };

        for outcome in outcomes.iter().filter(|o| o.transitioned) {
            summary.transitions += 1;
            if !self.notifier.deliver(outcome).await {
                summary.failed_deliveries += 1;
                error!(endpoint = %outcome.endpoint, "Transition notification was not delivered");
            }
        }

        info!(
            endpoints = summary.endpoints,
            reachable = summary.reachable,
            transitions = summary.transitions,
            failed_deliveries = summary.failed_deliveries,
            "Check cycle complete"
        );
        (outcomes, summary)
    }

    /// Probe every endpoint, each in its own task, keeping input order. Each
    /// report is paired with the time its probe finished. A task that dies is
    /// reported as an unreachable probe so the remaining endpoints are
    /// unaffected.
    async fn probe_all(&self, endpoints: &[Endpoint]) -> Vec<(ProbeReport, DateTime<Utc>)> {
        let timeout = self.config.probe_timeout;
        let concurrency = self.config.max_concurrent_probes.max(1);

        stream::iter(endpoints.iter().cloned())
            .map(|endpoint| {
                let prober = Arc::clone(&self.prober);
                let label = endpoint.to_string();
                let handle = tokio::spawn(async move {
                    let report = prober.probe(&endpoint, timeout).await;
                    (report, Utc::now())
                });
                async move {
                    match handle.await {
                        Ok(observed) => observed,
                        Err(e) => {
                            error!(endpoint = %label, error = %e, "Probe task failed");
                            (
                                ProbeReport::unreachable(format!("probe task failed: {e}")),
                                Utc::now(),
                            )
                        }
                    }
                }
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    /// Run a cycle immediately, then one per `check_interval` until
    /// `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// A cycle that overruns the interval makes the scheduler skip the missed
    /// ticks. A shutdown request abandons the cycle in flight; liveness memory
    /// stays consistent because each endpoint is evaluated atomically.
    pub async fn run(&self, endpoints: &[Endpoint], mut shutdown: watch::Receiver<bool>) {
        let period = self.config.check_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.check_interval.as_secs(),
            timeout_secs = self.config.probe_timeout.as_secs(),
            endpoints = endpoints.len(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_requested(&mut shutdown) => break,
            }

            tokio::select! {
                _ = self.run_cycle(endpoints) => {}
                _ = stop_requested(&mut shutdown) => {
                    warn!("Shutdown requested, abandoning check cycle in flight");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }
}

/// Resolves once `true` is published or the sender goes away.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProber(bool);

    #[async_trait]
    impl Prober for FixedProber {
        async fn probe(&self, _endpoint: &Endpoint, _timeout: Duration) -> ProbeReport {
            if self.0 {
                ProbeReport::reachable(Duration::from_millis(1))
            } else {
                ProbeReport::unreachable("refused")
            }
        }
    }

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn deliver(&self, _outcome: &CheckOutcome) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn run_cycle_keeps_endpoint_order() {
        let runner = CycleRunner::new(
            GuardianConfig::default().with_max_concurrent_probes(2),
            Arc::new(FixedProber(true)),
            Arc::new(CountingNotifier::default()),
        );
        let endpoints: Vec<_> = (1..=5)
            .map(|i| Endpoint::tcp(format!("ep{i}"), "127.0.0.1", 1000 + i))
            .collect();

        let outcomes = runner.run_cycle(&endpoints).await;
        let names: Vec<_> = outcomes.iter().map(|o| o.endpoint.name.as_str()).collect();
        assert_eq!(names, ["ep1", "ep2", "ep3", "ep4", "ep5"]);
    }

    #[tokio::test]
    async fn preloaded_tracker_reports_on_first_cycle() {
        let ep = Endpoint::tcp("web", "127.0.0.1", 80);
        let mut tracker = LivenessTracker::new();
        tracker.evaluate(&ep, true, None);

        let notifier = Arc::new(CountingNotifier::default());
        let runner = CycleRunner::with_tracker(
            GuardianConfig::default(),
            Arc::new(FixedProber(false)),
            notifier.clone(),
            tracker,
        );

        let (outcomes, summary) = runner.run_cycle_with_summary(&[ep]).await;
        assert!(outcomes[0].transitioned);
        assert_eq!(outcomes[0].error.as_deref(), Some("refused"));
        assert_eq!(summary.transitions, 1);
        assert_eq!(summary.reachable, 0);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_stops_when_shutdown_requested() {
        let notifier = Arc::new(CountingNotifier::default());
        let runner = Arc::new(CycleRunner::new(
            GuardianConfig::default().with_check_interval(3600),
            Arc::new(FixedProber(true)),
            notifier,
        ));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                runner
                    .run(&[Endpoint::tcp("web", "127.0.0.1", 80)], rx)
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler should stop after shutdown")
            .unwrap();
    }

    /// Sleeps `delay` before answering reachable.
    struct SlowProber(Duration);

    #[async_trait]
    impl Prober for SlowProber {
        async fn probe(&self, _endpoint: &Endpoint, _timeout: Duration) -> ProbeReport {
            tokio::time::sleep(self.0).await;
            ProbeReport::reachable(self.0)
        }
    }

    /// Answers instantly for endpoints named `fast`, after 300ms otherwise.
    struct MixedProber;

    #[async_trait]
    impl Prober for MixedProber {
        async fn probe(&self, endpoint: &Endpoint, _timeout: Duration) -> ProbeReport {
            if endpoint.name != "fast" {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            ProbeReport::reachable(Duration::from_millis(1))
        }
    }

    #[tokio::test]
    async fn run_abandons_cycle_in_flight_on_shutdown() {
        let runner = Arc::new(CycleRunner::new(
            GuardianConfig::default(),
            Arc::new(SlowProber(Duration::from_secs(30))),
            Arc::new(CountingNotifier::default()),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                runner
                    .run(&[Endpoint::tcp("stuck", "127.0.0.1", 80)], rx)
                    .await;
            })
        };

        // The first tick fires at once, so the cycle is now waiting on the probe.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let requested = std::time::Instant::now();
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should abandon the running cycle")
            .unwrap();
        assert!(requested.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn observed_at_reflects_each_probe_completion() {
        let runner = CycleRunner::new(
            GuardianConfig::default(),
            Arc::new(MixedProber),
            Arc::new(CountingNotifier::default()),
        );
        let endpoints = [
            Endpoint::tcp("fast", "127.0.0.1", 80),
            Endpoint::tcp("slow", "127.0.0.1", 81),
        ];

        let outcomes = runner.run_cycle(&endpoints).await;
        let gap = outcomes[1].observed_at - outcomes[0].observed_at;
        assert!(
            gap >= chrono::Duration::milliseconds(200),
            "fast endpoint stamped at {}, slow at {}",
            outcomes[0].observed_at,
            outcomes[1].observed_at
        );
    }
}
