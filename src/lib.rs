//! serverscout - concurrent game-server latency prober and selection engine.
//!
//! Probes a catalogue of game-server endpoints (ICMP echo, TCP connect,
//! or application-level UDP echo), maintains a sliding window of latency
//! samples per target, and ranks the targets so a caller can pick the
//! best server or network path. Loss dominates latency in the ranking;
//! every run returns a complete snapshot, with unreachable targets
//! reported as "no data" rather than omitted.
//!
//! The crate is the measurement core only: it owns no UI, no
//! persistence, and no listening sockets. A typical caller registers a
//! [`GameProfile`]'s targets and asks the [`Engine`] for a [`Report`]:
//!
//! ```no_run
//! use serverscout::{CancelHandle, Engine, GameProfile, RunConfig, TargetRegistry};
//!
//! # async fn demo() -> Result<(), serverscout::EngineError> {
//! let mut registry = TargetRegistry::new();
//! let profile = GameProfile::LeagueOfLegends;
//! registry.register_all(profile.targets())?;
//!
//! let engine = Engine::new(RunConfig::default()).with_thresholds(profile.thresholds());
//! let cancel = CancelHandle::new();
//! let report = engine.analyze(registry.list(), &cancel).await?;
//!
//! if let Some(best) = report.ranking.best() {
//!     println!("best region: {} ({:?})", best.target.display_name, best.tier);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod orchestrator;
mod probe;
mod profiles;
mod quality;
mod rank;
mod registry;
mod sampler;
mod stats;

pub use error::EngineError;
pub use orchestrator::{CancelHandle, Engine, Report, RunConfig, Snapshot, SnapshotEntry};
pub use probe::{NetProber, Prober};
pub use profiles::GameProfile;
pub use quality::{score, QualityTier, Thresholds};
pub use rank::{rank, RankPolicy, RankedEntry, RankedResult};
pub use registry::{Protocol, Target, TargetRegistry};
pub use sampler::{Sampler, SamplerConfig};
pub use stats::{FailureKind, Sample, Statistics, DEFAULT_WINDOW_SIZE};
