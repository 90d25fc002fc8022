use pnet::packet::icmp::IcmpTypes;
use pnet::packet::icmpv6::Icmpv6Types;
use pnet::packet::util::checksum;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use crate::error::ProbeError;
use crate::probe::correlate::{ReplyKind, parse_reply};
use crate::probe::socket::{
    RECV_BUFFER_SIZE, create_raw_icmp_socket, is_timeout, recv_icmp, send_icmp, set_ttl,
};
use crate::probe::{ProbeReply, Prober};

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Payload size, matching the classic 32 byte Windows ping buffer
pub const DEFAULT_PAYLOAD_SIZE: usize = 32;

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build an ICMP (or ICMPv6) Echo Request packet
///
/// The ICMPv6 checksum is left zero; the kernel fills it in for raw ICMPv6
/// sockets.
pub fn build_echo_request(identifier: u16, sequence: u16, payload_size: usize, ipv6: bool) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + payload_size];

    buffer[0] = if ipv6 {
        Icmpv6Types::EchoRequest.0
    } else {
        IcmpTypes::EchoRequest.0
    };
    buffer[1] = 0;
    buffer[4..6].copy_from_slice(&identifier.to_be_bytes());
    buffer[6..8].copy_from_slice(&sequence.to_be_bytes());
    buffer[ICMP_HEADER_SIZE..].fill(b'a');

    if !ipv6 {
        let cksum = checksum(&buffer, 1);
        buffer[2..4].copy_from_slice(&cksum.to_be_bytes());
    }

    buffer
}

/// Native prober using a raw ICMP socket per probe
///
/// Every raw socket sees every inbound ICMP message, so replies are matched
/// on the (identifier, sequence) pair quoted back by the responder.
#[derive(Debug)]
pub struct IcmpProber {
    identifier: u16,
    sequence: AtomicU16,
}

impl IcmpProber {
    pub fn new() -> Self {
        Self {
            identifier: get_identifier(),
            sequence: AtomicU16::new(0),
        }
    }

    fn next_sequence(&self) -> u16 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober for IcmpProber {
    async fn probe(&self, target: IpAddr, ttl: u8, timeout: Duration) -> Result<ProbeReply, ProbeError> {
        let identifier = self.identifier;
        let sequence = self.next_sequence();

        tokio::task::spawn_blocking(move || probe_blocking(target, ttl, identifier, sequence, timeout))
            .await
            .map_err(|e| ProbeError::Task(e.to_string()))?
    }

    fn name(&self) -> &'static str {
        "icmp"
    }
}

/// Send one echo request and wait for the matching answer or the deadline
fn probe_blocking(
    target: IpAddr,
    ttl: u8,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
) -> Result<ProbeReply, ProbeError> {
    let ipv6 = target.is_ipv6();
    let socket = create_raw_icmp_socket(ipv6)?;
    set_ttl(&socket, ttl, ipv6)?;

    let packet = build_echo_request(identifier, sequence, DEFAULT_PAYLOAD_SIZE, ipv6);
    let sent_at = Instant::now();
    send_icmp(&socket, &packet, target)?;

    let mut buffer = [0u8; RECV_BUFFER_SIZE];
    loop {
        let elapsed = sent_at.elapsed();
        let Some(remaining) = timeout.checked_sub(elapsed).filter(|d| !d.is_zero()) else {
            return Ok(ProbeReply::no_reply(elapsed));
        };

        let (len, source) = match recv_icmp(&socket, &mut buffer, remaining) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(ProbeError::Transport(e)),
        };

        let Some(reply) = parse_reply(&buffer[..len], source, identifier, sequence, ipv6) else {
            // someone else's traffic
            continue;
        };

        let rtt = sent_at.elapsed();
        tracing::trace!(addr = %target, ttl, responder = %reply.responder, kind = ?reply.kind, ?rtt);
        return Ok(match reply.kind {
            ReplyKind::EchoReply | ReplyKind::TimeExceeded => {
                ProbeReply::answered(reply.responder, rtt)
            }
            ReplyKind::Unreachable(_) => ProbeReply {
                responder: Some(reply.responder),
                rtt,
                succeeded: false,
            },
        });
    }
}
