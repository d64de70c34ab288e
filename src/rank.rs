//! Ranking: orders targets from a snapshot, picks the best connection.
//!
//! Loss dominates latency: a lossy-but-fast path is worse for gaming
//! than a slightly slower stable one, so candidates are first bucketed
//! by loss-rate tier and only then compared on round-trip time.

use std::time::Duration;

use serde::Serialize;

use crate::orchestrator::{Snapshot, SnapshotEntry};
use crate::quality::{self, QualityTier, Thresholds};
use crate::registry::Target;
use crate::stats::Statistics;

/// Tunable ranking parameters.
#[derive(Debug, Clone)]
pub struct RankPolicy {
    /// Upper bounds of the first two loss tiers; loss at or beyond the
    /// second bound lands in the worst tier.
    pub loss_tiers: [f64; 2],
    /// Average RTTs closer than this are treated as tied and fall
    /// through to the jitter comparison.
    pub rtt_epsilon: Duration,
}

impl Default for RankPolicy {
    fn default() -> Self {
        Self {
            loss_tiers: [0.01, 0.05],
            rtt_epsilon: Duration::from_millis(1),
        }
    }
}

impl RankPolicy {
    fn loss_tier(&self, loss_rate: f64) -> u8 {
        if loss_rate < self.loss_tiers[0] {
            0
        } else if loss_rate < self.loss_tiers[1] {
            1
        } else {
            2
        }
    }

    /// Quantize an average RTT so the epsilon tie is a real equivalence
    /// (bucketing keeps the order total and transitive).
    fn rtt_bucket(&self, avg: Duration) -> u128 {
        let eps = self.rtt_epsilon.as_micros().max(1);
        avg.as_micros() / eps
    }
}

/// One ranked target with its classification and score.
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntry {
    pub target: Target,
    pub stats: Statistics,
    pub tier: QualityTier,
    /// Informational 0-100 quality score; the ordering itself comes from
    /// the tiered comparison, not from this number.
    pub score: f64,
}

/// Targets ordered best-first. Produced fresh per invocation and not
/// persisted; the ranker keeps no selection history.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    entries: Vec<RankedEntry>,
}

impl RankedResult {
    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    /// The best connection: the top-ranked entry that has data. `None`
    /// when nothing was reachable. Acting on a change of selection is
    /// the caller's business.
    pub fn best(&self) -> Option<&RankedEntry> {
        self.entries.iter().find(|e| e.stats.has_data())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Order every target in the snapshot.
///
/// Ascending loss tier, then average RTT (bucketed at the policy's
/// epsilon), then jitter, then target id for determinism. Targets with
/// no successful samples sort last, keeping their registration order.
pub fn rank(snapshot: &Snapshot, policy: &RankPolicy, thresholds: &Thresholds) -> RankedResult {
    let mut measured: Vec<&SnapshotEntry> = Vec::new();
    let mut no_data: Vec<&SnapshotEntry> = Vec::new();

    for entry in snapshot.entries() {
        if entry.stats.has_data() {
            measured.push(entry);
        } else {
            no_data.push(entry);
        }
    }

    measured.sort_by(|a, b| {
        let key = |e: &SnapshotEntry| {
            // has_data() held, so avg_rtt is present.
            let avg = e.stats.avg_rtt().unwrap_or(Duration::ZERO);
            let jitter = e.stats.jitter().unwrap_or(Duration::ZERO);
            (
                policy.loss_tier(e.stats.loss_rate()),
                policy.rtt_bucket(avg),
                jitter.as_micros(),
            )
        };
        key(a).cmp(&key(b)).then_with(|| a.target.id.cmp(&b.target.id))
    });

    let entries = measured
        .into_iter()
        .chain(no_data)
        .map(|entry| RankedEntry {
            target: entry.target.clone(),
            stats: entry.stats.clone(),
            tier: thresholds.classify(&entry.stats),
            score: quality::score(&entry.stats),
        })
        .collect();

    RankedResult { entries }
}
