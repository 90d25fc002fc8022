pub mod correlate;
pub mod icmp;
pub mod ping;
pub mod socket;

pub use correlate::*;
pub use icmp::*;
pub use ping::*;
pub use socket::*;

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::ProbeBackend;
use crate::error::ProbeError;

/// What a single probe observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReply {
    /// Router or target that answered, if any
    pub responder: Option<IpAddr>,
    pub rtt: Duration,
    /// True for Time Exceeded from a router or Echo Reply from the target
    pub succeeded: bool,
}

impl ProbeReply {
    pub fn answered(responder: IpAddr, rtt: Duration) -> Self {
        Self {
            responder: Some(responder),
            rtt,
            succeeded: true,
        }
    }

    pub fn no_reply(rtt: Duration) -> Self {
        Self {
            responder: None,
            rtt,
            succeeded: false,
        }
    }
}

/// Sends one TTL-limited echo probe and waits for its answer
pub trait Prober: Send + Sync {
    fn probe(
        &self,
        target: IpAddr,
        ttl: u8,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProbeReply, ProbeError>> + Send;

    /// Short name for banners and logs
    fn name(&self) -> &'static str;
}

/// Probe backend chosen at startup
#[derive(Debug)]
pub enum AnyProber {
    Icmp(IcmpProber),
    Ping(PingProber),
}

impl AnyProber {
    /// Pick a backend for this platform and privilege level
    pub fn select(backend: ProbeBackend, target: IpAddr) -> Result<Self, ProbeError> {
        let ipv6 = target.is_ipv6();
        match backend {
            ProbeBackend::Icmp => {
                check_permissions(ipv6)?;
                Ok(Self::Icmp(IcmpProber::new()))
            }
            ProbeBackend::Ping => Ok(Self::Ping(PingProber::new())),
            ProbeBackend::Auto => match check_permissions(ipv6) {
                Ok(()) => Ok(Self::Icmp(IcmpProber::new())),
                Err(e) => {
                    tracing::warn!(error = %e, "raw ICMP unavailable, falling back to system ping");
                    Ok(Self::Ping(PingProber::new()))
                }
            },
        }
    }
}

impl Prober for AnyProber {
    fn probe(
        &self,
        target: IpAddr,
        ttl: u8,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProbeReply, ProbeError>> + Send {
        async move {
            match self {
                Self::Icmp(p) => p.probe(target, ttl, timeout).await,
                Self::Ping(p) => p.probe(target, ttl, timeout).await,
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Icmp(p) => p.name(),
            Self::Ping(p) => p.name(),
        }
    }
}
