//! TOML configuration.
//!
//! Precedence for every knob: CLI flag, then `PAGETAP_*` environment
//! variable, then the config file, then the built-in default. The file
//! itself comes from `--config`, `$PAGETAP_CONFIG`, or
//! `~/.pagetap/config.toml`; a missing file is simply the defaults.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use pagetap_telemetry::TelemetryConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CliConfig {
    /// Host the browser's DevTools endpoint listens on.
    pub host: String,
    /// DevTools port used when `--ws` and `--port` are both absent.
    pub port: u16,
    pub telemetry: TelemetryConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9222,
            telemetry: TelemetryConfig::default(),
        }
    }
}

pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os("PAGETAP_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".pagetap").join("config.toml"))
}

pub fn load(explicit: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = config_path(explicit) else {
        return Ok(CliConfig::default());
    };
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CliConfig::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading {}", path.display()));
        }
    };
    toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// Endpoint host after applying the flag > env > file precedence.
pub fn resolve_host(flag: Option<String>, config: &CliConfig) -> String {
    flag.or_else(|| std::env::var("PAGETAP_HOST").ok())
        .unwrap_or_else(|| config.host.clone())
}

/// Endpoint port after applying the flag > env > file precedence.
pub fn resolve_port(flag: Option<u16>, config: &CliConfig) -> u16 {
    flag.or_else(|| {
        std::env::var("PAGETAP_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
    })
    .unwrap_or(config.port)
}
