//! Probe protocols: one round-trip measurement against a single target.
//!
//! Network-level failures (timeout, unreachable, refused, bad reply) are
//! part of normal operation and come back as failed [`Sample`]s; only a
//! malformed target address is an error at this boundary.

mod echo;
mod icmp;
mod tcp;

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::error::EngineError;
use crate::registry::{Protocol, Target};
use crate::stats::{FailureKind, Sample};

/// Internal probe failure detail, mapped to [`FailureKind`] before it
/// leaves this module.
#[derive(Error, Debug)]
pub(crate) enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("destination unreachable: {0}")]
    Unreachable(String),
    #[error("connection refused")]
    Refused,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("command fallback failed: {0}")]
    Command(String),
    #[error("invalid probe address: {0}")]
    Address(String),
}

impl ProbeError {
    /// The sample-level failure this maps to, or `None` for address
    /// errors, which are configuration mistakes and surface as `Err`.
    fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProbeError::Timeout(_) => Some(FailureKind::Timeout),
            ProbeError::Unreachable(_) => Some(FailureKind::Unreachable),
            ProbeError::Refused => Some(FailureKind::Refused),
            ProbeError::Protocol(_) | ProbeError::Permission(_) | ProbeError::Command(_) => {
                Some(FailureKind::ProtocolError)
            }
            ProbeError::Address(_) => None,
        }
    }
}

/// Issues one latency measurement against a target.
///
/// The trait seam exists so the orchestrator can be driven by scripted
/// probers in tests; production code uses [`NetProber`].
pub trait Prober: Send + Sync + 'static {
    fn measure(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> impl Future<Output = Result<Sample, EngineError>> + Send;
}

/// The real network prober, dispatching on the target's protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetProber;

impl Prober for NetProber {
    async fn measure(&self, target: &Target, timeout: Duration) -> Result<Sample, EngineError> {
        let started = Utc::now();

        let result = match target.protocol {
            Protocol::Icmp => icmp::measure(&target.address, timeout).await,
            Protocol::TcpConnect => tcp::measure(&target.address, timeout).await,
            Protocol::AppEcho => echo::measure(&target.address, timeout).await,
        };

        match result {
            // A measured RTT at or past the timeout is a timeout, even if
            // the reply technically arrived.
            Ok(rtt) if rtt >= timeout => Ok(Sample::failed(started, FailureKind::Timeout)),
            Ok(rtt) => Ok(Sample::ok(started, rtt)),
            Err(err) => match err.failure_kind() {
                Some(kind) => Ok(Sample::failed(started, kind)),
                None => Err(EngineError::InvalidTarget {
                    id: target.id.clone(),
                    reason: err.to_string(),
                }),
            },
        }
    }
}

/// Check that a target's address fits its protocol. Runs before any
/// sampler starts so a bad address rejects the whole run synchronously.
pub(crate) fn validate_address(target: &Target) -> Result<(), EngineError> {
    let invalid = |reason: &str| EngineError::InvalidTarget {
        id: target.id.clone(),
        reason: reason.to_string(),
    };

    let address = target.address.as_str();
    if address.is_empty() {
        return Err(invalid("address is empty"));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(invalid("address contains whitespace"));
    }

    match target.protocol {
        // Host or IP literal; port not used.
        Protocol::Icmp => Ok(()),
        // host:port required.
        Protocol::TcpConnect | Protocol::AppEcho => match split_host_port(address) {
            Ok(_) => Ok(()),
            Err(err) => Err(invalid(&err.to_string())),
        },
    }
}

/// Split a `host:port` address, bracket-stripped for IPv6 literals.
pub(crate) fn split_host_port(address: &str) -> Result<(&str, u16), ProbeError> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(ProbeError::Address(format!(
            "expected host:port, got {:?}",
            address
        )));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(ProbeError::Address(format!(
            "expected host:port, got {:?}",
            address
        )));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| ProbeError::Address(format!("invalid port in {:?}", address)))?;
    Ok((host, port))
}
