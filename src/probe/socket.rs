use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::ProbeError;

/// Largest datagram we expect to read back
pub const RECV_BUFFER_SIZE: usize = 1500;

/// Check that raw ICMP sockets can be opened for this address family
pub fn check_permissions(ipv6: bool) -> Result<(), ProbeError> {
    match create_raw_icmp_socket(ipv6) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let binary_path = std::env::current_exe()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "hopwatch".to_string());
            Err(ProbeError::Unavailable(format!(
                "insufficient permissions for raw sockets; run with sudo or \
                 `sudo setcap cap_net_raw+ep {}`",
                binary_path
            )))
        }
        Err(e) => Err(ProbeError::Transport(e)),
    }
}

/// Create a raw ICMP (or ICMPv6) socket
pub fn create_raw_icmp_socket(ipv6: bool) -> io::Result<Socket> {
    let (domain, protocol) = if ipv6 {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    };

    let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Set TTL (IPv4) or unicast hop limit (IPv6)
pub fn set_ttl(socket: &Socket, ttl: u8, ipv6: bool) -> io::Result<()> {
    if ipv6 {
        socket.set_unicast_hops_v6(ttl as u32)
    } else {
        socket.set_ttl(ttl as u32)
    }
}

/// Send ICMP packet to target
pub fn send_icmp(socket: &Socket, packet: &[u8], target: IpAddr) -> io::Result<usize> {
    let addr = SockAddr::from(SocketAddr::new(target, 0));
    socket.send_to(packet, &addr)
}

/// Receive one datagram, waiting at most `wait`
///
/// Returns the number of bytes written into `buffer` and the sender address.
pub fn recv_icmp(socket: &Socket, buffer: &mut [u8], wait: Duration) -> io::Result<(usize, IpAddr)> {
    // A zero read timeout means "block forever" to the OS
    socket.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;

    let mut raw = [MaybeUninit::<u8>::uninit(); RECV_BUFFER_SIZE];
    let (len, from) = socket.recv_from(&mut raw)?;
    let len = len.min(buffer.len());

    // SAFETY: recv_from initialised the first `len` bytes of `raw`
    let data = unsafe { std::slice::from_raw_parts(raw.as_ptr() as *const u8, len) };
    buffer[..len].copy_from_slice(data);

    let source = from
        .as_socket()
        .map(|addr| addr.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "reply without source address"))?;
    Ok((len, source))
}

/// Whether a receive error just means the wait elapsed
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
