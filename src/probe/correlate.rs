use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::icmpv6::{Icmpv6Packet, Icmpv6Types};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use std::net::IpAddr;

// Original ICMP echo request types, as quoted back in error payloads
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMPV6_ECHO_REQUEST: u8 = 128;

const IPV6_HEADER_SIZE: usize = 40;
const IPV6_NH_ICMPV6: u8 = 58;

/// Kind of ICMP message matched to our probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// The target itself answered
    EchoReply,
    /// A router decremented TTL to zero
    TimeExceeded,
    /// A router or the target refused the probe (code kept for logs)
    Unreachable(u8),
}

/// ICMP message correlated with one of our probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedReply {
    pub responder: IpAddr,
    pub kind: ReplyKind,
}

/// Match a received datagram against the probe `(identifier, sequence)`.
///
/// IPv4 raw sockets deliver the IP header; IPv6 raw sockets deliver the
/// ICMPv6 message only, so `source` is used as the responder there.
///
/// Returns None if the packet is malformed or belongs to another probe.
pub fn parse_reply(
    data: &[u8],
    source: IpAddr,
    identifier: u16,
    sequence: u16,
    ipv6: bool,
) -> Option<ParsedReply> {
    if ipv6 {
        parse_reply_v6(data, source, identifier, sequence)
    } else {
        parse_reply_v4(data, identifier, sequence)
    }
}

fn parse_reply_v4(data: &[u8], identifier: u16, sequence: u16) -> Option<ParsedReply> {
    let ip_packet = Ipv4Packet::new(data)?;
    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    if data.len() < ip_header_len + 8 {
        return None;
    }
    let responder = IpAddr::V4(ip_packet.get_source());

    let icmp_data = &data[ip_header_len..];
    let icmp_packet = IcmpPacket::new(icmp_data)?;

    let kind = match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => {
            return matches_echo(icmp_data, identifier, sequence).then_some(ParsedReply {
                responder,
                kind: ReplyKind::EchoReply,
            });
        }
        IcmpTypes::TimeExceeded => ReplyKind::TimeExceeded,
        IcmpTypes::DestinationUnreachable => ReplyKind::Unreachable(icmp_packet.get_icmp_code().0),
        _ => return None,
    };

    // Error payload: original IP header + first 8 bytes of our echo request
    let quoted = icmp_packet.payload().get(4..)?;
    let original_ip = Ipv4Packet::new(quoted)?;
    let orig_ihl = (original_ip.get_header_length() as usize) * 4;
    let original = quoted.get(orig_ihl..)?;

    (original.first() == Some(&ICMP_ECHO_REQUEST) && matches_echo(original, identifier, sequence))
        .then_some(ParsedReply { responder, kind })
}

fn parse_reply_v6(data: &[u8], source: IpAddr, identifier: u16, sequence: u16) -> Option<ParsedReply> {
    let icmp_packet = Icmpv6Packet::new(data)?;
    if data.len() < 8 {
        return None;
    }

    let kind = match icmp_packet.get_icmpv6_type() {
        Icmpv6Types::EchoReply => {
            return matches_echo(data, identifier, sequence).then_some(ParsedReply {
                responder: source,
                kind: ReplyKind::EchoReply,
            });
        }
        Icmpv6Types::TimeExceeded => ReplyKind::TimeExceeded,
        Icmpv6Types::DestinationUnreachable => {
            ReplyKind::Unreachable(icmp_packet.get_icmpv6_code().0)
        }
        _ => return None,
    };

    // Error payload: original IPv6 header + our echo request
    let quoted = data.get(8..)?;
    if quoted.len() < IPV6_HEADER_SIZE + 8 || quoted[6] != IPV6_NH_ICMPV6 {
        return None;
    }
    let original = &quoted[IPV6_HEADER_SIZE..];

    (original[0] == ICMPV6_ECHO_REQUEST && matches_echo(original, identifier, sequence))
        .then_some(ParsedReply {
            responder: source,
            kind,
        })
}

/// Compare the identifier and sequence fields of an echo header
fn matches_echo(icmp: &[u8], identifier: u16, sequence: u16) -> bool {
    if icmp.len() < 8 {
        return false;
    }
    u16::from_be_bytes([icmp[4], icmp[5]]) == identifier
        && u16::from_be_bytes([icmp[6], icmp[7]]) == sequence
}
