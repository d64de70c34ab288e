//! ICMP echo probe with native sockets and a `ping` command fallback.
//!
//! Native ICMP uses blocking sockets inside `spawn_blocking` for
//! sub-millisecond timing precision. Where neither a RAW nor a DGRAM
//! ICMP socket can be created (no CAP_NET_RAW, no ping_group_range),
//! the system `ping` binary is used instead.

use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    /// Native ICMP sockets are available.
    Native,
    /// Only the command fallback is available.
    CommandOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

/// Sequence counter so concurrent pings to the same destination can be
/// told apart.
static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

fn generate_ping_id() -> (u16, u16) {
    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (identifier, sequence)
}

/// Detect ICMP capability by attempting to create a socket.
fn detect_icmp_capability() -> IcmpCapability {
    // RAW first (requires CAP_NET_RAW or root).
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("ICMP probe: using native sockets (RAW, privileged)");
        return IcmpCapability::Native;
    }
    // DGRAM (unprivileged on Linux with ping_group_range set, or macOS).
    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("ICMP probe: using native sockets (DGRAM, unprivileged)");
        return IcmpCapability::Native;
    }
    tracing::info!("ICMP probe: native sockets unavailable, using ping command");
    IcmpCapability::CommandOnly
}

/// Run one ICMP echo round trip against a host or IP literal.
pub(crate) async fn measure(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);

    if capability == IcmpCapability::Native {
        // Resolve before spawn_blocking; DNS is async.
        let ip = resolve_address(address).await?;

        let result = tokio::task::spawn_blocking(move || run_blocking_ping(ip, timeout))
            .await
            .map_err(|e| ProbeError::Protocol(format!("spawn_blocking failed: {}", e)))?;

        return match result {
            Err(ProbeError::Permission(reason)) => {
                tracing::warn!(
                    "Native ping for {} denied ({}), falling back to command",
                    address,
                    reason
                );
                run_ping_command(address, timeout).await
            }
            other => other,
        };
    }

    run_ping_command(address, timeout).await
}

/// Resolve a hostname to an IP address; passes IP literals through.
async fn resolve_address(address: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<_> = tokio::net::lookup_host(format!("{}:0", address))
        .await
        .map_err(|e| ProbeError::Unreachable(format!("DNS resolution failed: {}", e)))?
        .collect();

    addrs
        .into_iter()
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Unreachable(format!("no addresses found for {}", address)))
}

/// Blocking ICMP ping with precise timing; runs in a dedicated thread.
fn run_blocking_ping(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    match ip {
        IpAddr::V4(v4) => run_blocking_ping_v4(v4, timeout),
        IpAddr::V6(v6) => run_blocking_ping_v6(v6, timeout),
    }
}

fn open_icmp_socket(domain: Domain, protocol: Protocol) -> Result<Socket, ProbeError> {
    // RAW first (privileged), then DGRAM (unprivileged).
    Socket::new(domain, Type::RAW, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)))
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ProbeError::Permission(e.to_string())
            } else {
                ProbeError::Protocol(format!("failed to create ICMP socket: {}", e))
            }
        })
}

fn classify_send_error(err: std::io::Error) -> ProbeError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => ProbeError::Permission(err.to_string()),
        std::io::ErrorKind::HostUnreachable | std::io::ErrorKind::NetworkUnreachable => {
            ProbeError::Unreachable(err.to_string())
        }
        _ => ProbeError::Protocol(format!("failed to send: {}", err)),
    }
}

fn run_blocking_ping_v4(ip: Ipv4Addr, timeout: Duration) -> Result<Duration, ProbeError> {
    let socket = open_icmp_socket(Domain::IPV4, Protocol::ICMPV4)?;

    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Protocol(format!("failed to set timeout: {}", e)))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| ProbeError::Protocol(format!("failed to set timeout: {}", e)))?;

    let dest = SocketAddr::new(IpAddr::V4(ip), 0);
    socket
        .connect(&dest.into())
        .map_err(|e| ProbeError::Unreachable(format!("failed to connect: {}", e)))?;

    let (identifier, sequence) = generate_ping_id();
    let packet = build_icmp_echo_request(identifier, sequence);

    // Start timing just before send.
    let start = Instant::now();
    socket.send(&packet).map_err(classify_send_error)?;

    // Receive replies until ours arrives or the timeout passes.
    loop {
        let mut buf: [MaybeUninit<u8>; 1500] = unsafe { MaybeUninit::uninit().assume_init() };
        let len = socket.recv(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut
            {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Protocol(format!("failed to receive: {}", e))
            }
        })?;
        // SAFETY: recv initialized `len` bytes
        let buf: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }

        // DGRAM sockets deliver just the ICMP header; RAW sockets include
        // the IP header in front of it.
        if len >= 8 {
            let icmp_offset = if buf[0] >> 4 == 4 { 20 } else { 0 };
            if len > icmp_offset + 7 {
                let reply_type = buf[icmp_offset];
                let reply_id = u16::from_be_bytes([buf[icmp_offset + 4], buf[icmp_offset + 5]]);
                let reply_seq = u16::from_be_bytes([buf[icmp_offset + 6], buf[icmp_offset + 7]]);

                // Type 0 = Echo Reply
                if reply_type == 0 && reply_id == identifier && reply_seq == sequence {
                    return Ok(elapsed);
                }
                // Type 3 = Destination Unreachable
                if reply_type == 3 {
                    return Err(ProbeError::Unreachable(format!(
                        "ICMP destination unreachable (code {})",
                        buf[icmp_offset + 1]
                    )));
                }
            }
        }
        // Someone else's reply, keep waiting.
    }
}

fn run_blocking_ping_v6(ip: Ipv6Addr, timeout: Duration) -> Result<Duration, ProbeError> {
    let socket = open_icmp_socket(Domain::IPV6, Protocol::ICMPV6)?;

    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Protocol(format!("failed to set timeout: {}", e)))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| ProbeError::Protocol(format!("failed to set timeout: {}", e)))?;

    let dest = SocketAddr::new(IpAddr::V6(ip), 0);
    socket
        .connect(&dest.into())
        .map_err(|e| ProbeError::Unreachable(format!("failed to connect: {}", e)))?;

    let (identifier, sequence) = generate_ping_id();
    let packet = build_icmpv6_echo_request(identifier, sequence);

    let start = Instant::now();
    socket.send(&packet).map_err(classify_send_error)?;

    loop {
        let mut buf: [MaybeUninit<u8>; 1500] = unsafe { MaybeUninit::uninit().assume_init() };
        let len = socket.recv(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut
            {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Protocol(format!("failed to receive: {}", e))
            }
        })?;
        // SAFETY: recv initialized `len` bytes
        let buf: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }

        if len >= 8 {
            let reply_type = buf[0];
            let reply_id = u16::from_be_bytes([buf[4], buf[5]]);
            let reply_seq = u16::from_be_bytes([buf[6], buf[7]]);

            // Type 129 = Echo Reply
            if reply_type == 129 && reply_id == identifier && reply_seq == sequence {
                return Ok(elapsed);
            }
            // Type 1 = Destination Unreachable
            if reply_type == 1 {
                return Err(ProbeError::Unreachable(format!(
                    "ICMPv6 destination unreachable (code {})",
                    buf[1]
                )));
            }
        }
    }
}

/// Build an ICMP Echo Request packet (type 8, code 0).
fn build_icmp_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64]; // 8 byte header + 56 byte payload

    packet[0] = 8; // Type: Echo Request
    packet[1] = 0; // Code: 0
                   // Checksum at [2..4], computed below
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    // Payload carries the send timestamp.
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());

    packet
}

/// Build an ICMPv6 Echo Request packet (type 128, code 0). The kernel
/// fills in the checksum for ICMPv6 sockets.
fn build_icmpv6_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64];

    packet[0] = 128; // Type: Echo Request
    packet[1] = 0; // Code: 0
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    packet
}

/// Compute ICMP checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i < data.len() - 1 {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }

    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Ping via command execution (fallback).
async fn run_ping_command(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);

    let output = Command::new("ping")
        .args(["-c", "1", "-W", &timeout_secs.to_string(), address])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stderr.contains("timeout")
            || stdout.contains("100% packet loss")
            || stdout.contains("100.0% packet loss")
        {
            return Err(ProbeError::Timeout(timeout));
        }
        if stderr.contains("unreachable") || stdout.contains("unreachable") {
            return Err(ProbeError::Unreachable(stdout.trim().to_string()));
        }
        return Err(ProbeError::Command(format!("ping failed: {}", stdout)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ping_output(&stdout)
}

/// Parse ping command output for latency.
fn parse_ping_output(output: &str) -> Result<Duration, ProbeError> {
    let ms_to_duration = |ms: f64| Duration::from_secs_f64(ms / 1000.0);

    // Pattern 1: per-packet "time=X.XXX ms" (Linux, some macOS)
    static RE1: OnceLock<Regex> = OnceLock::new();
    let re1 = RE1.get_or_init(|| Regex::new(r"time[=<](?P<val>[0-9.]+)\s*ms").unwrap());

    if let Some(caps) = re1.captures(output) {
        if let Some(val_match) = caps.name("val") {
            if let Ok(ms) = val_match.as_str().parse::<f64>() {
                return Ok(ms_to_duration(ms));
            }
        }
    }

    // Pattern 2: "round-trip min/avg/max/stddev = X/X/X/X ms" (macOS)
    static RE2: OnceLock<Regex> = OnceLock::new();
    let re2 = RE2.get_or_init(|| {
        Regex::new(r"round-trip\s+min/avg/max/stddev\s*=\s*([0-9.]+)/([0-9.]+)/([0-9.]+)").unwrap()
    });

    if let Some(caps) = re2.captures(output) {
        if let Some(avg_match) = caps.get(2) {
            if let Ok(ms) = avg_match.as_str().parse::<f64>() {
                return Ok(ms_to_duration(ms));
            }
        }
    }

    // Pattern 3: "rtt min/avg/max/mdev = X/X/X/X ms" (Linux)
    static RE3: OnceLock<Regex> = OnceLock::new();
    let re3 = RE3.get_or_init(|| {
        Regex::new(r"rtt\s+min/avg/max/mdev\s*=\s*([0-9.]+)/([0-9.]+)/([0-9.]+)").unwrap()
    });

    if let Some(caps) = re3.captures(output) {
        if let Some(avg_match) = caps.get(2) {
            if let Ok(ms) = avg_match.as_str().parse::<f64>() {
                return Ok(ms_to_duration(ms));
            }
        }
    }

    Err(ProbeError::Command(format!(
        "failed to parse ping output: {}",
        output
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_echo_request_header() {
        let mut packet = vec![0u8; 8];
        packet[0] = 8; // Echo request
        packet[4] = 0x12;
        packet[5] = 0x34;
        packet[7] = 0x01;

        let checksum = icmp_checksum(&packet);
        assert_ne!(checksum, 0);
    }

    #[test]
    fn echo_request_layout() {
        let packet = build_icmp_echo_request(0x1234, 0x0001);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8); // Type
        assert_eq!(packet[1], 0); // Code
        assert_eq!(packet[4..6], [0x12, 0x34]); // ID
        assert_eq!(packet[6..8], [0x00, 0x01]); // Sequence
    }

    #[test]
    fn sequence_numbers_advance() {
        let (_, s1) = generate_ping_id();
        let (_, s2) = generate_ping_id();
        assert_ne!(s1, s2);
    }

    #[test]
    fn parse_per_packet_time() {
        let output = "64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.345 ms";
        let rtt = parse_ping_output(output).unwrap();
        assert!((rtt.as_secs_f64() * 1000.0 - 12.345).abs() < 1e-6);
    }

    #[test]
    fn parse_macos_summary() {
        let output = r#"PING google.com (142.250.69.174): 56 data bytes

--- google.com ping statistics ---
1 packets transmitted, 1 packets received, 0.0% packet loss
round-trip min/avg/max/stddev = 17.906/17.906/17.906/0.000 ms"#;
        let rtt = parse_ping_output(output).unwrap();
        assert!((rtt.as_secs_f64() * 1000.0 - 17.906).abs() < 1e-6);
    }

    #[test]
    fn parse_linux_summary_prefers_per_packet_time() {
        let output = r#"PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.3 ms

--- 8.8.8.8 ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
rtt min/avg/max/mdev = 12.300/12.300/12.300/0.000 ms"#;
        let rtt = parse_ping_output(output).unwrap();
        assert!((rtt.as_secs_f64() * 1000.0 - 12.3).abs() < 1e-6);
    }

    #[test]
    fn unparseable_output_is_an_error() {
        assert!(matches!(
            parse_ping_output("no latency here"),
            Err(ProbeError::Command(_))
        ));
    }
}
