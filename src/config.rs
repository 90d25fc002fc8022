use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::DEFAULT_WINDOW_SIZE;

/// Probe backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Raw ICMP sockets when permitted, otherwise the system ping utility
    #[default]
    Auto,
    /// Raw ICMP sockets only
    Icmp,
    /// Shell out to the system ping utility
    Ping,
}

impl std::str::FromStr for ProbeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "icmp" => Ok(Self::Icmp),
            "ping" => Ok(Self::Ping),
            other => Err(format!("Unknown backend: {}. Use auto, icmp, or ping", other)),
        }
    }
}

/// Runtime configuration derived from defaults, the config file and CLI args
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum hop distance probed while discovering
    pub max_hops: u8,
    /// Per-probe timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Target time between round starts
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    /// Samples kept per hop
    pub window_size: usize,
    pub backend: ProbeBackend,
    /// Halt on malformed probe replies instead of counting a loss
    pub strict: bool,
    /// Enable location lookups
    pub geo_enabled: bool,
    /// Probe one hop at a time, stopping at the target
    pub sequential: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_hops: 30,
            timeout: Duration::from_millis(1000),
            interval: Duration::from_millis(1000),
            window_size: DEFAULT_WINDOW_SIZE,
            backend: ProbeBackend::Auto,
            strict: false,
            geo_enabled: true,
            sequential: false,
        }
    }
}

/// Serde helper for Duration stored as whole milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
