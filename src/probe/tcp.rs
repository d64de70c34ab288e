//! TCP connect probe: times the connect handshake to a fixed port.
//!
//! This is the configured fallback for environments where ICMP sockets
//! need privileges the process does not have.

use std::io;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use super::{split_host_port, ProbeError};

/// Time a TCP connect to `host:port`.
pub(crate) async fn measure(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    // Reject malformed addresses up front; connect errors past this
    // point are network conditions, not configuration mistakes.
    let (host, port) = split_host_port(address)?;
    let dest = format!("{}:{}", host, port);

    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(&dest)).await {
        Err(_) => Err(ProbeError::Timeout(timeout)),
        Ok(Ok(stream)) => {
            let rtt = start.elapsed();
            drop(stream);
            Ok(rtt)
        }
        Ok(Err(err)) => Err(classify_io_error(err, timeout)),
    }
}

fn classify_io_error(err: io::Error, timeout: Duration) -> ProbeError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ProbeError::Refused,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProbeError::Timeout(timeout),
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ProbeError::Unreachable(err.to_string())
        }
        _ => ProbeError::Protocol(err.to_string()),
    }
}
