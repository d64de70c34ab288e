//! Public error taxonomy.
//!
//! Only configuration-level problems surface as errors: transient network
//! failures are recorded as failed samples and show up as loss, never as
//! an `Err` at the engine boundary.

use thiserror::Error;

/// Errors returned by the engine's public API.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A run or registry call was made with invalid parameters
    /// (empty target list, non-positive timeout/interval/budget/window).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A target with the same id is already registered.
    #[error("duplicate target id: {0}")]
    DuplicateTargetId(String),

    /// A target's address does not fit its configured protocol
    /// (e.g. missing port for a TCP-connect probe).
    #[error("invalid address for target {id}: {reason}")]
    InvalidTarget { id: String, reason: String },
}
