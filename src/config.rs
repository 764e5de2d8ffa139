//! Configuration loader and schema types.
//!
//! This module exposes the configuration schema used to drive the daemon,
//! the scanner and the client, plus helpers to load it from disk.

mod load;
mod schema;

pub use load::{default_config_path, resolve_config_path};
pub use schema::*;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("invalid config: {0}")]
    Invalid(String),
}
