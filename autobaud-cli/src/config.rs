//! Configuration file support for autobaud.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (AUTOBAUD_*)
//! 3. Local config file (./autobaud.toml)
//! 4. Global config file (~/.config/autobaud/config.toml)

use anyhow::Result;
use autobaud::{CandidateSet, DEFAULT_ALLOWED_MANUFACTURERS, ProbeConfig};
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "autobaud.toml";

/// Vendor filter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Manufacturer strings eligible for probing.
    pub manufacturers: Option<Vec<String>>,
}

/// Handshake search configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSection {
    /// Baud rates to try.
    pub baud_rates: Option<Vec<u32>>,
    /// Per-attempt read timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Handshake command; `\n`, `\r`, `\t` and `\\` escapes are recognised.
    pub command: Option<String>,
    /// Manufacturers that are never opened.
    pub skip_manufacturers: Option<Vec<String>>,
    /// Search devices concurrently.
    pub parallel: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Vendor filter configuration.
    #[serde(default)]
    pub filter: FilterConfig,
    /// Probe configuration.
    #[serde(default)]
    pub probe: ProbeSection,
}

/// Values given on the command line; `None`/empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct ProbeOverrides {
    /// `--baud`.
    pub baud_rates: Vec<u32>,
    /// `--timeout-ms`.
    pub timeout_ms: Option<u64>,
    /// `--command`.
    pub command: Option<String>,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "autobaud").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.filter.manufacturers.is_some() {
            self.filter.manufacturers = other.filter.manufacturers;
        }

        if other.probe.baud_rates.is_some() {
            self.probe.baud_rates = other.probe.baud_rates;
        }
        if other.probe.timeout_ms.is_some() {
            self.probe.timeout_ms = other.probe.timeout_ms;
        }
        if other.probe.command.is_some() {
            self.probe.command = other.probe.command;
        }
        if other.probe.skip_manufacturers.is_some() {
            self.probe.skip_manufacturers = other.probe.skip_manufacturers;
        }
        if other.probe.parallel.is_some() {
            self.probe.parallel = other.probe.parallel;
        }
    }

    /// Whether to search devices concurrently; `--parallel` forces it on.
    pub fn parallel(&self, cli: bool) -> bool {
        cli || self.probe.parallel.unwrap_or(false)
    }

    /// Manufacturer allow-list: CLI values, then config, then the built-in default.
    pub fn allowed_manufacturers(&self, cli: &[String]) -> Vec<String> {
        if !cli.is_empty() {
            return cli.to_vec();
        }

        self.filter.manufacturers.clone().unwrap_or_else(|| {
            DEFAULT_ALLOWED_MANUFACTURERS
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        })
    }

    /// Build the library probe configuration, applying CLI overrides.
    pub fn probe_config(&self, overrides: &ProbeOverrides) -> Result<ProbeConfig> {
        let mut config = ProbeConfig::default();

        let rates = if overrides.baud_rates.is_empty() {
            self.probe.baud_rates.clone()
        } else {
            Some(overrides.baud_rates.clone())
        };
        if let Some(rates) = rates {
            config = config.with_candidates(CandidateSet::new(rates)?);
        }

        if let Some(ms) = overrides.timeout_ms.or(self.probe.timeout_ms) {
            if ms == 0 {
                anyhow::bail!("timeout must be greater than zero");
            }
            config = config.with_timeout(Duration::from_millis(ms));
        }

        if let Some(command) = overrides.command.as_deref().or(self.probe.command.as_deref()) {
            config = config.with_command(unescape_command(command));
        }

        if let Some(names) = &self.probe.skip_manufacturers {
            config = config.with_skipped_manufacturers(names.iter().cloned());
        }

        Ok(config)
    }
}

/// Turn `\n`, `\r`, `\t` and `\\` escapes into bytes; other text is copied as-is.
pub fn unescape_command(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('\\') => out.push(b'\\'),
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            },
            None => out.push(b'\\'),
        }
    }

    out
}
