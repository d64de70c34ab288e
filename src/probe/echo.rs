//! Application-level echo probe over UDP.
//!
//! Sends a small datagram carrying a random nonce and waits for the
//! server to echo it back. The nonce plays the same role as a DNS
//! transaction id: replies that do not carry it are ignored rather than
//! timed, so a stale datagram cannot produce a bogus RTT.

use std::time::{Duration, Instant};

use tokio::net::UdpSocket;

use super::{split_host_port, ProbeError};

/// Payload bytes: 8-byte nonce plus 8-byte send timestamp.
const PAYLOAD_LEN: usize = 16;

/// Run one echo round trip against `host:port`.
pub(crate) async fn measure(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let (host, port) = split_host_port(address)?;
    let dest = format!("{}:{}", host, port);

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| ProbeError::Protocol(format!("failed to bind socket: {}", e)))?;
    socket
        .connect(&dest)
        .await
        .map_err(|e| ProbeError::Unreachable(format!("failed to connect: {}", e)))?;

    let packet = build_echo_packet();
    let start = Instant::now();

    socket
        .send(&packet)
        .await
        .map_err(|e| ProbeError::Protocol(format!("failed to send: {}", e)))?;

    // Wait for our echo, skipping datagrams with the wrong nonce.
    let mut buf = [0u8; 512];
    loop {
        let remaining = timeout
            .checked_sub(start.elapsed())
            .ok_or(ProbeError::Timeout(timeout))?;

        let n = match tokio::time::timeout(remaining, socket.recv(&mut buf)).await {
            Err(_) => return Err(ProbeError::Timeout(timeout)),
            // An ICMP port-unreachable for the destination surfaces here
            // as a refused connection on connected UDP sockets.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(ProbeError::Refused)
            }
            Ok(Err(e)) => return Err(ProbeError::Protocol(format!("failed to recv: {}", e))),
            Ok(Ok(n)) => n,
        };

        let elapsed = start.elapsed();
        if n >= 8 && buf[..8] == packet[..8] {
            return Ok(elapsed);
        }
        // Short or wrong-nonce datagram, keep waiting for ours.
    }
}

fn build_echo_packet() -> [u8; PAYLOAD_LEN] {
    let mut packet = [0u8; PAYLOAD_LEN];
    let nonce: u64 = rand::random();
    packet[..8].copy_from_slice(&nonce.to_be_bytes());
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..].copy_from_slice(&timestamp.to_be_bytes());
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    /// Spawn a UDP server that echoes every datagram back verbatim.
    async fn spawn_echo_server() -> std::net::SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..n], peer).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn round_trip_against_local_echo_server() {
        let addr = spawn_echo_server().await;
        let rtt = assert_ok!(measure(&addr.to_string(), Duration::from_secs(2)).await);
        assert!(rtt < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn stray_short_datagrams_are_skipped() {
        // Server that prefixes every echo with a runt datagram.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(b"ack", peer).await;
                let _ = socket.send_to(&buf[..n], peer).await;
            }
        });

        let rtt = assert_ok!(measure(&addr.to_string(), Duration::from_secs(2)).await);
        assert!(rtt < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Bind but never reply.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        let err = measure(&addr.to_string(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
    }

    #[test]
    fn packets_carry_distinct_nonces() {
        let a = build_echo_packet();
        let b = build_echo_packet();
        assert_ne!(a[..8], b[..8]);
    }
}
