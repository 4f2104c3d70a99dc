// src/config.rs

//! Layered configuration for the native user store: compiled-in defaults,
//! an optional TOML file, then environment variables prefixed
//! `NATIVE_USER_STORE_`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// The well-known security index name and template name. Fixed constants
/// supplied by the surrounding system, not user-configurable.
pub const SECURITY_INDEX_NAME: &str = ".security";
pub const SECURITY_INDEX_TEMPLATE_NAME: &str = ".security-template";

/// The document type name used for every stored user record.
pub const USER_DOC_TYPE: &str = "user";

/// The bounded wait for the blocking read-path surfaces.
pub const BLOCKING_READ_TIMEOUT: Duration = Duration::from_secs(30);

fn default_scroll_size() -> usize {
    1000
}

fn default_scroll_keep_alive() -> Duration {
    Duration::from_secs(10)
}

fn default_reload_interval() -> Duration {
    Duration::from_secs(30)
}

/// Runtime configuration for the native user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `authc.native.scroll.size` -- scroll page size for user scans.
    #[serde(rename = "authc.native.scroll.size")]
    pub scroll_size: usize,

    /// `authc.native.scroll.keep_alive` -- scroll cursor TTL.
    #[serde(rename = "authc.native.scroll.keep_alive", with = "humantime_serde")]
    pub scroll_keep_alive: Duration,

    /// `authc.native.reload.interval` -- fixed delay between poller iterations.
    #[serde(rename = "authc.native.reload.interval", with = "humantime_serde")]
    pub reload_interval: Duration,

    /// BCrypt work factor used by the default hasher.
    pub bcrypt_cost: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scroll_size: default_scroll_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
            reload_interval: default_reload_interval(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl StoreConfig {
    /// Loads configuration, layering an optional TOML file and environment
    /// variables (prefix `NATIVE_USER_STORE_`) over the compiled-in defaults.
    pub fn load(file_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&StoreConfig::default())?);

        if let Some(path) = file_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NATIVE_USER_STORE").separator("__"),
        );

        let resolved: StoreConfig = builder
            .build()
            .context("failed to assemble native user store configuration")?
            .try_deserialize()
            .context("failed to deserialize native user store configuration")?;

        resolved.validate()?;
        Ok(resolved)
    }

    fn validate(&self) -> Result<()> {
        if self.scroll_size == 0 {
            bail!("authc.native.scroll.size must be greater than 0");
        }
        if self.scroll_keep_alive.is_zero() {
            bail!("authc.native.scroll.keep_alive must be greater than 0");
        }
        if self.reload_interval.is_zero() {
            bail!("authc.native.reload.interval must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = StoreConfig::default();
        assert_eq!(config.scroll_size, 1000);
        assert_eq!(config.scroll_keep_alive, Duration::from_secs(10));
        assert_eq!(config.reload_interval, Duration::from_secs(30));
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let config = StoreConfig::load(None).unwrap();
        assert_eq!(config.scroll_size, 1000);
    }

    #[test]
    fn rejects_a_zero_scroll_size() {
        let mut config = StoreConfig::default();
        config.scroll_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn a_toml_file_overrides_the_compiled_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("native-user-store.toml");
        std::fs::write(&path, "\"authc.native.scroll.size\" = 250\n").unwrap();

        let config = StoreConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.scroll_size, 250);
        // Untouched keys keep their compiled-in default.
        assert_eq!(config.reload_interval, Duration::from_secs(30));
    }
}
