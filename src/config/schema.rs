use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level service settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/prestod/config.toml` or `~/.config/prestod/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `PRESTOD__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonSettings,
    pub scan: ScanSettings,
    pub paths: PathSettings,
    pub client: ClientSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Override for the socket location. Defaults to the runtime directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// Largest request line accepted before the connection is dropped.
    pub max_line_bytes: usize,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_line_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Metadata extraction threads per scan. 0 picks the available parallelism.
    pub workers: usize,
    /// Emit a progress event every N extracted files.
    pub progress_every: usize,
    /// Whether to follow symlinks while walking the library.
    pub follow_links: bool,
    /// Keep base64 cover art inside every cached record.
    /// Off by default: cover art is served per file through `cover-art`.
    pub embed_cover_art: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            progress_every: 10,
            follow_links: false,
            embed_cover_art: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// How long a front-end waits for the socket before giving up (milliseconds).
    pub connect_timeout_ms: u64,
    /// Timeout of the bare "is the daemon up" probe (milliseconds).
    pub probe_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            probe_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, e.g. `info` or `prestod=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
