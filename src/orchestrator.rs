//! Orchestrator: fans samplers out across targets and collects a snapshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::error::EngineError;
use crate::probe::{self, NetProber, Prober};
use crate::quality::Thresholds;
use crate::rank::{rank, RankPolicy, RankedResult};
use crate::registry::Target;
use crate::sampler::{Sampler, SamplerConfig};
use crate::stats::{Statistics, DEFAULT_WINDOW_SIZE};

/// Parameters for one measurement run. All values must be positive.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on a single probe call.
    pub per_probe_timeout: Duration,
    /// Delay between consecutive probes of one target.
    pub probe_interval: Duration,
    /// Wall-clock cap per sampler; a sampler also stops after
    /// `window_size` samples, whichever comes first.
    pub total_budget: Duration,
    /// How many samplers may be actively probing at once. Unbounded
    /// fan-out would saturate the local interface and skew the very
    /// latencies being measured.
    pub max_concurrency: usize,
    /// Samples retained per target.
    pub window_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            per_probe_timeout: Duration::from_secs(2),
            probe_interval: Duration::from_millis(500),
            total_budget: Duration::from_secs(30),
            max_concurrency: 5,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl RunConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.per_probe_timeout.is_zero() {
            return Err(EngineError::Config("per_probe_timeout must be positive".into()));
        }
        if self.probe_interval.is_zero() {
            return Err(EngineError::Config("probe_interval must be positive".into()));
        }
        if self.total_budget.is_zero() {
            return Err(EngineError::Config("total_budget must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(EngineError::Config("max_concurrency must be positive".into()));
        }
        if self.window_size == 0 {
            return Err(EngineError::Config("window_size must be positive".into()));
        }
        Ok(())
    }
}

/// Handle used to abort an in-progress run.
///
/// Backed by a watch channel so a cancel issued before a sampler
/// subscribes is still observed. Cancellation is not an error: a
/// cancelled run returns its best-effort snapshot, tagged as cancelled.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !*self.tx.borrow() {
            tracing::info!("Measurement run cancelled");
        }
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One target's statistics within a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub target: Target,
    pub stats: Statistics,
}

/// Immutable point-in-time view of per-target statistics, in
/// registration order. Targets that produced no successful samples are
/// present with empty statistics, never omitted.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    /// True when the run was aborted; statistics are best-effort.
    pub cancelled: bool,
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub(crate) fn from_entries(cancelled: bool, entries: Vec<SnapshotEntry>) -> Self {
        Self {
            taken_at: Utc::now(),
            cancelled,
            entries,
        }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&Statistics> {
        self.entries
            .iter()
            .find(|e| e.target.id == id)
            .map(|e| &e.stats)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshot plus its ranking, as handed to the UI/reporting layer.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub snapshot: Snapshot,
    pub ranking: RankedResult,
}

/// The measurement engine: orchestrates samplers, ranks the outcome.
///
/// Configuration is passed in explicitly and results are returned as
/// values; the engine holds no mutable state across runs.
pub struct Engine<P: Prober = NetProber> {
    config: RunConfig,
    policy: RankPolicy,
    thresholds: Thresholds,
    prober: Arc<P>,
}

impl Engine<NetProber> {
    pub fn new(config: RunConfig) -> Self {
        Self::with_prober(config, NetProber)
    }
}

impl<P: Prober> Engine<P> {
    /// Build an engine around a custom prober (tests, simulations).
    pub fn with_prober(config: RunConfig, prober: P) -> Self {
        Self {
            config,
            policy: RankPolicy::default(),
            thresholds: Thresholds::default(),
            prober: Arc::new(prober),
        }
    }

    pub fn with_policy(mut self, policy: RankPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Run one measurement pass over `targets` and return the snapshot.
    ///
    /// One sampler per target, at most `max_concurrency` actively probing;
    /// the rest queue in registration order. Returns only after every
    /// started sampler has stopped. A target whose probes all fail
    /// degrades to total loss in the snapshot; only configuration
    /// problems fail the run itself.
    pub async fn run(
        &self,
        targets: &[Target],
        cancel: &CancelHandle,
    ) -> Result<Snapshot, EngineError> {
        self.config.validate()?;
        if targets.is_empty() {
            return Err(EngineError::Config("target list is empty".into()));
        }
        let mut ids = HashSet::new();
        for target in targets {
            if !ids.insert(target.id.as_str()) {
                return Err(EngineError::DuplicateTargetId(target.id.clone()));
            }
            probe::validate_address(target)?;
        }

        tracing::info!("Starting measurement run over {} targets", targets.len());

        let sampler_config = SamplerConfig {
            probe_interval: self.config.probe_interval,
            per_probe_timeout: self.config.per_probe_timeout,
            window_size: self.config.window_size,
            total_budget: self.config.total_budget,
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut cancel_rx = cancel.watch();
        let mut handles: Vec<(usize, JoinHandle<Statistics>)> = Vec::new();

        for (idx, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            // Acquiring the permit here, in registration order, is what
            // queues excess samplers instead of starting them all.
            let permit = tokio::select! {
                _ = cancel_rx.changed() => break,
                acquired = semaphore.clone().acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let mut sampler = Sampler::new(
                target.clone(),
                self.prober.clone(),
                sampler_config.clone(),
                cancel,
            );
            handles.push((
                idx,
                tokio::spawn(async move {
                    let _permit = permit;
                    while sampler.next_stats().await.is_some() {}
                    sampler.into_stats()
                }),
            ));
        }

        // Join every started sampler; none may outlive the run.
        let mut results: Vec<Option<Statistics>> = vec![None; targets.len()];
        for (idx, handle) in handles {
            match handle.await {
                Ok(stats) => results[idx] = Some(stats),
                Err(err) => {
                    // A panicked sampler costs that target its data, not
                    // the whole run.
                    tracing::error!("Sampler task for {} failed: {}", targets[idx].id, err);
                }
            }
        }

        let entries = targets
            .iter()
            .zip(results)
            .map(|(target, stats)| SnapshotEntry {
                target: target.clone(),
                stats: stats.unwrap_or_else(|| Statistics::new(self.config.window_size)),
            })
            .collect();

        let cancelled = cancel.is_cancelled();
        if cancelled {
            tracing::info!("Run finished after cancellation; snapshot is best-effort");
        }
        Ok(Snapshot::from_entries(cancelled, entries))
    }

    /// Run one measurement pass and rank the result: the single call the
    /// UI layer makes per refresh.
    pub async fn analyze(
        &self,
        targets: &[Target],
        cancel: &CancelHandle,
    ) -> Result<Report, EngineError> {
        let snapshot = self.run(targets, cancel).await?;
        let ranking = rank(&snapshot, &self.policy, &self.thresholds);
        Ok(Report { snapshot, ranking })
    }
}
