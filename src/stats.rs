//! Probe samples and per-target sliding-window statistics.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of samples retained per target.
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Why a probe failed to produce a round-trip time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No reply within the per-probe timeout.
    Timeout,
    /// Host or network unreachable.
    Unreachable,
    /// The destination actively refused the connection.
    Refused,
    /// A reply arrived but was malformed or did not match the request.
    ProtocolError,
}

/// Outcome of a single probe. Exactly one of `rtt` / `failure` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub rtt: Option<Duration>,
    pub failure: Option<FailureKind>,
}

impl Sample {
    /// A successful measurement.
    pub fn ok(timestamp: DateTime<Utc>, rtt: Duration) -> Self {
        Self {
            timestamp,
            rtt: Some(rtt),
            failure: None,
        }
    }

    /// A failed measurement.
    pub fn failed(timestamp: DateTime<Utc>, kind: FailureKind) -> Self {
        Self {
            timestamp,
            rtt: None,
            failure: Some(kind),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.rtt.is_some()
    }
}

/// Rolling statistics over the most recent samples for one target.
///
/// The window keeps at most `window_size` samples in insertion order;
/// failed samples occupy a slot like successes so the loss rate is an
/// honest fraction of recent attempts. RTT aggregates are computed over
/// successful samples only and are `None` when there are none.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    window_size: usize,
    samples: VecDeque<Sample>,
}

impl Statistics {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            samples: VecDeque::with_capacity(window_size),
        }
    }

    /// Append a sample, evicting the oldest once the window is full.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.window_size {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Drop all samples, keeping the configured window size.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples currently in the window.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn success_count(&self) -> usize {
        self.samples.iter().filter(|s| s.succeeded()).count()
    }

    /// True when at least one probe in the window succeeded.
    pub fn has_data(&self) -> bool {
        self.success_count() > 0
    }

    /// Fraction of failed probes in the window; 0.0 for an empty window.
    pub fn loss_rate(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let failed = count - self.success_count();
        failed as f64 / count as f64
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        self.successful_rtts().min()
    }

    pub fn avg_rtt(&self) -> Option<Duration> {
        let mut total = Duration::ZERO;
        let mut n = 0u32;
        for rtt in self.successful_rtts() {
            total += rtt;
            n += 1;
        }
        if n == 0 {
            None
        } else {
            Some(total / n)
        }
    }

    /// 95th percentile RTT over the successful samples in the window.
    ///
    /// Computed exactly (nearest-rank); the window is small enough that
    /// no sketch is needed.
    pub fn p95_rtt(&self) -> Option<Duration> {
        let mut rtts: Vec<Duration> = self.successful_rtts().collect();
        if rtts.is_empty() {
            return None;
        }
        rtts.sort_unstable();
        let rank = ((rtts.len() as f64) * 0.95).ceil() as usize;
        Some(rtts[rank.clamp(1, rtts.len()) - 1])
    }

    /// Mean absolute deviation between consecutive successful RTTs.
    ///
    /// `None` until two successful samples exist. Failed samples in
    /// between are skipped, not treated as zero-RTT points.
    pub fn jitter(&self) -> Option<Duration> {
        let rtts: Vec<Duration> = self.successful_rtts().collect();
        if rtts.len() < 2 {
            return None;
        }
        let total: Duration = rtts
            .windows(2)
            .map(|pair| {
                if pair[1] > pair[0] {
                    pair[1] - pair[0]
                } else {
                    pair[0] - pair[1]
                }
            })
            .sum();
        Some(total / (rtts.len() - 1) as u32)
    }

    /// Samples in insertion order (oldest first).
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    fn successful_rtts(&self) -> impl Iterator<Item = Duration> + '_ {
        self.samples.iter().filter_map(|s| s.rtt)
    }
}
