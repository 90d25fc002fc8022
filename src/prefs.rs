//! Optional user defaults.
//!
//! Read from ~/.config/hopwatch/config.toml. Every field is optional; values
//! given on the command line take precedence.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Config, ProbeBackend};

/// Defaults loaded from the config file
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    pub max_hops: Option<u8>,
    /// Per-probe timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Round interval in milliseconds
    pub interval_ms: Option<u64>,
    pub window_size: Option<usize>,
    pub backend: Option<ProbeBackend>,
    pub strict: Option<bool>,
    pub sequential: Option<bool>,
    pub geoip_city: Option<PathBuf>,
    pub geoip_asn: Option<PathBuf>,
}

impl Prefs {
    /// Get config file path: ~/.config/hopwatch/config.toml
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hopwatch").join("config.toml"))
    }

    /// Load preferences from the default location (default if missing)
    pub fn load() -> anyhow::Result<Self> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load preferences from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Overlay these preferences on top of the built-in defaults
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(max_hops) = self.max_hops {
            config.max_hops = max_hops;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.interval_ms {
            config.interval = std::time::Duration::from_millis(ms);
        }
        if let Some(window) = self.window_size {
            config.window_size = window;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(strict) = self.strict {
            config.strict = strict;
        }
        if let Some(sequential) = self.sequential {
            config.sequential = sequential;
        }
        config
    }
}
