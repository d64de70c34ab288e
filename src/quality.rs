//! Quality classification: statistics -> discrete tier plus a numeric score.

use serde::{Deserialize, Serialize};

use crate::stats::Statistics;

/// Discrete fitness label for real-time gaming traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
    /// No successful samples; nothing can be said about the target.
    /// Shown as an explicit "no data", never as a 0ms ping.
    Unknown,
}

impl QualityTier {
    /// Advice line the UI shows next to the tier.
    pub fn recommendation(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "Connection is ideal for competitive play",
            QualityTier::Good => "Connection is solid; minor lag spikes possible",
            QualityTier::Fair => {
                "Playable but inconsistent; prefer a wired connection and close background apps"
            }
            QualityTier::Poor => {
                "Expect lag; check for packet loss, restart your router, or switch connections"
            }
            QualityTier::Unknown => "Server unreachable; no measurements available",
        }
    }
}

/// Per-metric threshold ladders. Each array holds the upper bounds for
/// Excellent / Good / Fair; beyond the last bound the metric rates Poor.
/// The overall tier is the worst of the three metric tiers, so heavy
/// packet loss classifies Poor no matter how low the latency is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub rtt_ms: [f64; 3],
    pub jitter_ms: [f64; 3],
    pub loss: [f64; 3],
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rtt_ms: [50.0, 80.0, 120.0],
            jitter_ms: [10.0, 20.0, 40.0],
            loss: [0.01, 0.03, 0.05],
        }
    }
}

impl Thresholds {
    /// Map statistics to a tier. Pure and total: every statistics value
    /// maps to exactly one tier, `Unknown` iff there are no successes.
    pub fn classify(&self, stats: &Statistics) -> QualityTier {
        let Some(avg) = stats.avg_rtt() else {
            return QualityTier::Unknown;
        };
        let avg_ms = avg.as_secs_f64() * 1000.0;
        // Undefined jitter (a single success) breaches nothing.
        let jitter_ms = stats
            .jitter()
            .map(|j| j.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        let rtt_tier = ladder(avg_ms, &self.rtt_ms);
        let jitter_tier = ladder(jitter_ms, &self.jitter_ms);
        let loss_tier = ladder(stats.loss_rate(), &self.loss);

        rtt_tier.max(jitter_tier).max(loss_tier)
    }
}

fn ladder(value: f64, bounds: &[f64; 3]) -> QualityTier {
    if value < bounds[0] {
        QualityTier::Excellent
    } else if value < bounds[1] {
        QualityTier::Good
    } else if value < bounds[2] {
        QualityTier::Fair
    } else {
        QualityTier::Poor
    }
}

/// Numeric quality score from 0.0 (worst) to 100.0 (best).
///
/// Weighted combination of loss, latency, and jitter; loss carries the
/// largest weight because a lossy-but-fast path is worse for gaming than
/// a slightly slower stable one. 0.0 when there is no data.
pub fn score(stats: &Statistics) -> f64 {
    const W_LATENCY: f64 = 0.35;
    const W_JITTER: f64 = 0.25;
    const W_LOSS: f64 = 0.40;

    let Some(avg) = stats.avg_rtt() else {
        return 0.0;
    };
    let avg_ms = avg.as_secs_f64() * 1000.0;
    let jitter_ms = stats
        .jitter()
        .map(|j| j.as_secs_f64() * 1000.0)
        .unwrap_or(0.0);

    // Latency score: 100 at 0ms, 0 at 500ms+
    let latency_score = (1.0 - (avg_ms / 500.0).min(1.0)) * 100.0;
    // Jitter score: 100 at 0ms, 0 at 100ms+
    let jitter_score = (1.0 - (jitter_ms / 100.0).min(1.0)) * 100.0;
    // Loss score: 100 at 0%, 0 at 10%+
    let loss_score = (1.0 - (stats.loss_rate() / 0.10).min(1.0)) * 100.0;

    (W_LATENCY * latency_score + W_JITTER * jitter_score + W_LOSS * loss_score).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{FailureKind, Sample};
    use chrono::Utc;
    use std::time::Duration;

    fn stats_from(successes_ms: &[u64], failures: usize) -> Statistics {
        let mut stats = Statistics::new(successes_ms.len() + failures);
        for _ in 0..failures {
            stats.push(Sample::failed(Utc::now(), FailureKind::Timeout));
        }
        for &ms in successes_ms {
            stats.push(Sample::ok(Utc::now(), Duration::from_millis(ms)));
        }
        stats
    }

    #[test]
    fn excellent_when_all_metrics_inside_first_bound() {
        // avg 20ms, jitter 2ms, no loss
        let stats = stats_from(&[19, 21, 19, 21], 0);
        assert_eq!(Thresholds::default().classify(&stats), QualityTier::Excellent);
    }

    #[test]
    fn loss_breach_dominates_low_latency() {
        // 8/10 successes, avg 45ms, jitter well under 10ms, loss 0.2 -> Poor
        let stats = stats_from(&[45, 45, 45, 45, 45, 45, 45, 45], 2);
        assert!((stats.loss_rate() - 0.2).abs() < 1e-9);
        assert_eq!(Thresholds::default().classify(&stats), QualityTier::Poor);
    }

    #[test]
    fn unknown_when_no_successes() {
        let stats = stats_from(&[], 5);
        assert_eq!(Thresholds::default().classify(&stats), QualityTier::Unknown);
        let empty = Statistics::new(10);
        assert_eq!(Thresholds::default().classify(&empty), QualityTier::Unknown);
    }

    #[test]
    fn classify_is_idempotent() {
        let stats = stats_from(&[30, 90, 30], 1);
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.classify(&stats), thresholds.classify(&stats));
    }

    #[test]
    fn single_breach_degrades_one_tier() {
        // avg 60ms (Good band), everything else Excellent -> Good
        let stats = stats_from(&[59, 61, 59, 61], 0);
        assert_eq!(Thresholds::default().classify(&stats), QualityTier::Good);
    }

    #[test]
    fn every_tier_has_a_recommendation() {
        for tier in [
            QualityTier::Excellent,
            QualityTier::Good,
            QualityTier::Fair,
            QualityTier::Poor,
            QualityTier::Unknown,
        ] {
            assert!(!tier.recommendation().is_empty());
        }
    }

    #[test]
    fn perfect_connection_scores_full() {
        let stats = stats_from(&[0, 0, 0], 0);
        assert!((score(&stats) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn no_data_scores_zero() {
        assert_eq!(score(&Statistics::new(10)), 0.0);
    }

    #[test]
    fn lossy_path_scores_below_stable_slower_path() {
        let lossy_fast = stats_from(&[10, 10, 10, 10, 10, 10, 10, 10], 2);
        let stable_slow = stats_from(&[60, 60, 60, 60, 60, 60, 60, 60, 60, 60], 0);
        assert!(score(&lossy_fast) < score(&stable_slow));
    }
}
