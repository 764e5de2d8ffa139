use std::{env, path::PathBuf, time::Duration};

use super::ConfigError;
use super::schema::Config;
use crate::paths;

/// Configuration loading helpers.
///
/// `Config::load` tries environment variables first (prefix `PRESTOD__`), then an
/// optional config file and falls back to struct defaults.
impl Config {
    /// Load settings from environment and optional config file.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("PRESTOD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let config: Config = cfg.try_deserialize()?;
        Ok(config)
    }

    /// Load and validate in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load, validate, and fall back to defaults on any problem.
    ///
    /// The config file is optional; failures never prevent the daemon from starting.
    pub fn load_or_default() -> Self {
        Self::load_validated().unwrap_or_else(|e| {
            tracing::warn!("{e}; using defaults");
            Self::default()
        })
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.scan.progress_every == 0 {
            return Err("scan.progress_every must be >= 1".to_string());
        }
        if self.daemon.max_line_bytes < 1024 {
            return Err("daemon.max_line_bytes must be >= 1024".to_string());
        }
        if self.client.connect_timeout_ms == 0 || self.client.probe_timeout_ms == 0 {
            return Err("client timeouts must be > 0".to_string());
        }
        Ok(())
    }

    pub fn socket_path(&self) -> PathBuf {
        self.daemon
            .socket_path
            .clone()
            .unwrap_or_else(paths::socket_path)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.paths.cache_dir.clone().unwrap_or_else(paths::cache_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.paths.data_dir.clone().unwrap_or_else(paths::data_dir)
    }

    /// Worker count with `0` resolved to the machine's parallelism.
    pub fn scan_workers(&self) -> usize {
        match self.scan.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            n => n,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.client.connect_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.client.probe_timeout_ms)
    }
}

/// Resolve the config path from `PRESTOD_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("PRESTOD_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    Some(default_config_path())
}

/// `$XDG_CONFIG_HOME/prestod/config.toml` or `~/.config/prestod/config.toml`.
pub fn default_config_path() -> PathBuf {
    paths::config_dir().join("config.toml")
}
