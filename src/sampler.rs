//! Sampler: drives repeated probes against one target on a schedule.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::orchestrator::CancelHandle;
use crate::probe::Prober;
use crate::registry::Target;
use crate::stats::{FailureKind, Sample, Statistics};

/// Per-sampler schedule parameters.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Delay between consecutive probes.
    pub probe_interval: Duration,
    /// Upper bound on one probe call.
    pub per_probe_timeout: Duration,
    /// Samples retained and the per-run sample cap.
    pub window_size: usize,
    /// Wall-clock cap on one sampling run.
    pub total_budget: Duration,
}

/// Repeatedly probes one target, folding outcomes into a sliding window.
///
/// Pull-driven: each [`next_stats`](Sampler::next_stats) call performs one
/// probe and yields the updated statistics, until the window fills, the
/// budget elapses, or cancellation is observed. Failed probes are folded
/// into the window like successes; there is no in-place retry, the next
/// scheduled probe is the retry.
pub struct Sampler<P: Prober> {
    target: Target,
    prober: Arc<P>,
    config: SamplerConfig,
    cancel: watch::Receiver<bool>,
    stats: Statistics,
    taken: usize,
    deadline: Option<Instant>,
    interval: Option<tokio::time::Interval>,
    finished: bool,
}

impl<P: Prober> Sampler<P> {
    pub fn new(target: Target, prober: Arc<P>, config: SamplerConfig, cancel: &CancelHandle) -> Self {
        let stats = Statistics::new(config.window_size);
        Self {
            target,
            prober,
            config,
            cancel: cancel.watch(),
            stats,
            taken: 0,
            deadline: None,
            interval: None,
            finished: false,
        }
    }

    /// Perform the next scheduled probe and return the updated statistics,
    /// or `None` once this run is over. Partial statistics survive in
    /// [`stats`](Sampler::stats) either way.
    pub async fn next_stats(&mut self) -> Option<Statistics> {
        if self.finished || self.taken >= self.config.window_size {
            return None;
        }
        if *self.cancel.borrow() {
            self.finished = true;
            return None;
        }

        if self.deadline.is_none() {
            // Stagger start-up so a fleet of samplers does not fire its
            // first probe at the same instant.
            let stagger = Duration::from_millis(rand::random::<u64>() % 100);
            tokio::select! {
                _ = self.cancel.changed() => {
                    self.finished = true;
                    return None;
                }
                _ = tokio::time::sleep(stagger) => {}
            }
            self.deadline = Some(Instant::now() + self.config.total_budget);
            let mut interval = tokio::time::interval(self.config.probe_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.interval = Some(interval);
            tracing::debug!("Sampler started for {}", self.target.id);
        }

        let deadline = self.deadline.unwrap_or_else(Instant::now);
        let interval = self.interval.as_mut()?;

        tokio::select! {
            _ = self.cancel.changed() => {
                tracing::debug!("Sampler for {} cancelled", self.target.id);
                self.finished = true;
                None
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::debug!("Sampler for {} exhausted its budget", self.target.id);
                self.finished = true;
                None
            }
            _ = interval.tick() => {
                // The outer timeout guards probers that do not enforce
                // their own bound; an overrun counts as a timed-out probe.
                let timeout = self.config.per_probe_timeout;
                let measured = tokio::time::timeout(
                    timeout,
                    self.prober.measure(&self.target, timeout),
                )
                .await;

                let sample = match measured {
                    Err(_) => Sample::failed(Utc::now(), FailureKind::Timeout),
                    Ok(Ok(sample)) => sample,
                    Ok(Err(err)) => {
                        // Configuration problem, not a network condition;
                        // stop this sampler and keep what it measured.
                        tracing::error!("Probe failed for {}: {}", self.target.id, err);
                        self.finished = true;
                        return None;
                    }
                };

                self.stats.push(sample);
                self.taken += 1;
                Some(self.stats.clone())
            }
        }
    }

    /// Statistics accumulated so far (partial windows included).
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Restart the sequence: clears the window and re-arms the budget on
    /// the next probe.
    pub fn reset(&mut self) {
        self.stats.clear();
        self.taken = 0;
        self.deadline = None;
        self.interval = None;
        self.finished = false;
    }

    pub fn into_stats(self) -> Statistics {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::registry::Protocol;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn target() -> Target {
        Target::new("euw", "EU West", "lol", "192.0.2.1", Protocol::Icmp)
    }

    fn config(window: usize) -> SamplerConfig {
        SamplerConfig {
            probe_interval: Duration::from_millis(100),
            per_probe_timeout: Duration::from_millis(500),
            window_size: window,
            total_budget: Duration::from_secs(60),
        }
    }

    /// Prober whose outcomes are scripted: `Some(ms)` succeeds, `None`
    /// fails with a timeout.
    struct Scripted {
        outcomes: Vec<Option<u64>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: Vec<Option<u64>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Prober for Scripted {
        fn measure(
            &self,
            _target: &Target,
            _timeout: Duration,
        ) -> impl Future<Output = Result<Sample, EngineError>> + Send {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcomes[i % self.outcomes.len()];
            async move {
                Ok(match outcome {
                    Some(ms) => Sample::ok(Utc::now(), Duration::from_millis(ms)),
                    None => Sample::failed(Utc::now(), FailureKind::Timeout),
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn yields_one_snapshot_per_probe_until_window_full() {
        init_tracing();
        let prober = Scripted::new(vec![Some(20)]);
        let cancel = CancelHandle::new();
        let mut sampler = Sampler::new(target(), prober.clone(), config(5), &cancel);

        let mut yielded = 0;
        while let Some(stats) = sampler.next_stats().await {
            yielded += 1;
            assert_eq!(stats.count(), yielded);
        }
        assert_eq!(yielded, 5);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_keep_the_sequence_alive() {
        let prober = Scripted::new(vec![Some(20), None]);
        let cancel = CancelHandle::new();
        let mut sampler = Sampler::new(target(), prober, config(10), &cancel);

        while sampler.next_stats().await.is_some() {}

        let stats = sampler.stats();
        assert_eq!(stats.count(), 10);
        assert!((stats.loss_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_bounds_the_run() {
        let prober = Scripted::new(vec![Some(20)]);
        let cancel = CancelHandle::new();
        let mut cfg = config(1000);
        cfg.total_budget = Duration::from_millis(450);
        let mut sampler = Sampler::new(target(), prober, cfg, &cancel);

        while sampler.next_stats().await.is_some() {}
        // Interval 100ms within a 450ms budget: far fewer than 1000.
        assert!(sampler.stats().count() < 10);
        assert!(sampler.stats().count() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_start_yields_nothing() {
        let prober = Scripted::new(vec![Some(20)]);
        let cancel = CancelHandle::new();
        cancel.cancel();
        let mut sampler = Sampler::new(target(), prober, config(5), &cancel);
        assert!(sampler.next_stats().await.is_none());
        assert_eq!(sampler.stats().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restarts_the_sequence() {
        let prober = Scripted::new(vec![Some(20)]);
        let cancel = CancelHandle::new();
        let mut sampler = Sampler::new(target(), prober, config(3), &cancel);

        while sampler.next_stats().await.is_some() {}
        assert_eq!(sampler.stats().count(), 3);

        sampler.reset();
        assert_eq!(sampler.stats().count(), 0);
        assert!(sampler.next_stats().await.is_some());
    }
}
