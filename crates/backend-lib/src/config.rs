// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use figment::{Figment, providers::{Env, Format, Serialized, Toml}};
use anyhow::Result;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Base64-url encoded 32-byte credential signing key. When absent, an
    /// ephemeral key is generated at startup and tokens do not survive a
    /// restart.
    pub token_key: Option<String>,
    /// Rate limiting for the API routes
    pub rate_limit: RateLimitSettings,
}

/// Fixed-window per-IP rate limit. The budget has to accommodate the
/// session controller's 1-second poll cadence inside the final minute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Window length in seconds
    pub window_secs: u64,
    /// Maximum requests per window
    pub max_requests: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            token_key: None,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 120,
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` and `MEETGATE_`-prefixed environment
    /// variables, over the defaults.
    pub fn load() -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("MEETGATE_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Load settings from an explicit file path, still honoring the
    /// environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MEETGATE_").split("__"))
            .extract()?;
        Ok(settings)
    }
}
