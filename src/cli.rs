use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ProbeBackend};
use crate::prefs::Prefs;

/// Target used when no argument is given in debug builds
const DEBUG_TARGET: &str = "bing.com";

/// Upper bound on hop distance (one concurrent probe per hop each round)
const MAX_SAFE_HOPS: u8 = 64;

/// Upper bound on samples kept per hop
const MAX_WINDOW: usize = 1000;

/// Printed when no usable target was given
pub const USAGE: &str = "Invalid target.\nusage: hopwatch <target>";

/// Live mtr-style path monitor: per-hop latency, jitter and loss
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "hopwatch")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to monitor (IP address or hostname)
    pub target: Option<String>,

    /// Maximum hops probed while discovering the path [default: 30]
    #[arg(short = 'm', long = "max-hops")]
    pub max_hops: Option<u8>,

    /// Per-probe timeout in milliseconds [default: 1000]
    #[arg(long = "timeout")]
    pub timeout_ms: Option<u64>,

    /// Round interval in milliseconds [default: 1000]
    #[arg(short = 'i', long = "interval")]
    pub interval_ms: Option<u64>,

    /// Samples kept per hop for averages and jitter [default: 10]
    #[arg(long = "window")]
    pub window: Option<usize>,

    /// Probe backend (auto, icmp, ping) [default: auto]
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<ProbeBackend>,

    /// Treat malformed probe replies as fatal
    #[arg(long = "strict")]
    pub strict: bool,

    /// Probe one hop at a time instead of all at once, stopping at the target
    #[arg(long = "sequential")]
    pub sequential: bool,

    /// Path to a MaxMind GeoLite2-City database
    #[arg(long = "geoip-city")]
    pub geoip_city: Option<PathBuf>,

    /// Path to a MaxMind GeoLite2-ASN database
    #[arg(long = "geoip-asn")]
    pub geoip_asn: Option<PathBuf>,

    /// Skip location lookups
    #[arg(long = "no-geo")]
    pub no_geo: bool,

    /// Write diagnostic logs to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Log filter directive (tracing env-filter syntax)
    #[arg(long = "log-filter", default_value = "hopwatch=debug")]
    pub log_filter: String,
}

impl Args {
    /// Target to monitor, falling back to a development default in debug builds
    pub fn target(&self) -> Option<String> {
        match self.target.as_deref().map(str::trim) {
            Some(target) if !target.is_empty() => Some(target.to_string()),
            Some(_) => None,
            None if cfg!(debug_assertions) => Some(DEBUG_TARGET.to_string()),
            None => None,
        }
    }

    /// Target to monitor, or the usage message when none was given
    pub fn require_target(&self) -> Result<String, &'static str> {
        self.target().ok_or(USAGE)
    }

    /// Merge defaults, config-file preferences and CLI overrides
    pub fn to_config(&self, prefs: &Prefs) -> Config {
        let mut config = prefs.apply(Config::default());
        if let Some(max_hops) = self.max_hops {
            config.max_hops = max_hops;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.interval_ms {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(window) = self.window {
            config.window_size = window;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        config.strict |= self.strict;
        config.sequential |= self.sequential;
        config.geo_enabled = !self.no_geo;
        config
    }

    /// Validate the merged configuration
    pub fn validate(config: &Config) -> Result<(), String> {
        if config.max_hops == 0 {
            return Err("Max hops must be at least 1".into());
        }
        if config.max_hops > MAX_SAFE_HOPS {
            return Err(format!("Max hops cannot exceed {}", MAX_SAFE_HOPS));
        }
        if config.timeout.is_zero() {
            return Err("Timeout must be positive".into());
        }
        if config.interval.is_zero() {
            return Err("Interval must be positive".into());
        }
        if config.window_size == 0 {
            return Err("Window must hold at least one sample".into());
        }
        if config.window_size > MAX_WINDOW {
            return Err(format!("Window cannot exceed {} samples", MAX_WINDOW));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_target_parses() {
        let args = Args::try_parse_from(["hopwatch", "1.1.1.1"]).unwrap();
        assert_eq!(args.target(), Some("1.1.1.1".to_string()));
    }

    #[test]
    fn test_two_targets_rejected() {
        assert!(Args::try_parse_from(["hopwatch", "1.1.1.1", "8.8.8.8"]).is_err());
    }

    #[test]
    fn test_missing_target_uses_debug_default_only_in_debug() {
        let args = Args::try_parse_from(["hopwatch"]).unwrap();
        if cfg!(debug_assertions) {
            assert_eq!(args.target(), Some(DEBUG_TARGET.to_string()));
        } else {
            assert_eq!(args.target(), None);
        }
    }

    #[test]
    fn test_blank_target_rejected() {
        let args = Args::try_parse_from(["hopwatch", "  "]).unwrap();
        assert_eq!(args.target(), None);
        assert_eq!(args.require_target(), Err(USAGE));
    }

    #[test]
    fn test_require_target_passes_name_through() {
        let args = Args::try_parse_from(["hopwatch", " example.com "]).unwrap();
        assert_eq!(args.require_target(), Ok("example.com".to_string()));
    }

    #[test]
    fn test_sequential_flag() {
        let args = Args::try_parse_from(["hopwatch", "--sequential", "x"]).unwrap();
        assert!(args.to_config(&Prefs::default()).sequential);

        let args = Args::try_parse_from(["hopwatch", "x"]).unwrap();
        assert!(!args.to_config(&Prefs::default()).sequential);
    }

    #[test]
    fn test_cli_overrides_prefs() {
        let prefs = Prefs {
            max_hops: Some(60),
            timeout_ms: Some(2000),
            ..Prefs::default()
        };
        let args =
            Args::try_parse_from(["hopwatch", "-m", "20", "--backend", "ping", "x"]).unwrap();
        let config = args.to_config(&prefs);
        assert_eq!(config.max_hops, 20);
        assert_eq!(config.timeout, Duration::from_millis(2000));
        assert_eq!(config.backend, ProbeBackend::Ping);
    }

    #[test]
    fn test_huge_window_flag_fails_validation() {
        let args =
            Args::try_parse_from(["hopwatch", "--window", "4294967295", "1.1.1.1"])
                .unwrap();
        let config = args.to_config(&Prefs::default());
        assert!(Args::validate(&config).is_err());
    }

    #[test]
    fn test_validate_bounds() {
        let mut config = Config::default();
        assert!(Args::validate(&config).is_ok());

        config.max_hops = 0;
        assert!(Args::validate(&config).is_err());

        config.max_hops = 65;
        assert!(Args::validate(&config).is_err());

        config.max_hops = 30;
        config.window_size = 0;
        assert!(Args::validate(&config).is_err());

        config.window_size = MAX_WINDOW;
        assert!(Args::validate(&config).is_ok());
        config.window_size = MAX_WINDOW + 1;
        assert!(Args::validate(&config).is_err());

        config.window_size = 10;
        config.timeout = Duration::ZERO;
        assert!(Args::validate(&config).is_err());
    }
}
