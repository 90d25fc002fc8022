use std::net::{IpAddr, ToSocketAddrs};

use crate::error::ResolveError;

/// Resolve a hostname or literal address to a single target address.
///
/// IPv4 results are preferred when a name has both families.
pub fn resolve_target(target: &str) -> Result<IpAddr, ResolveError> {
    // Try parsing as IP address first
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<IpAddr> = (target, 0)
        .to_socket_addrs()
        .map_err(|source| ResolveError::Lookup {
            target: target.to_string(),
            source,
        })?
        .map(|s| s.ip())
        .collect();

    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ResolveError::NotFound(target.to_string()))
}
