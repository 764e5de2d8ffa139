//! Library service behind the presto player.
//!
//! `prestod` scans music directories, caches the results, keeps small user
//! documents (favorites, settings, queue, play counts) and serves all of it
//! over a Unix socket to any number of front-ends.

pub mod cache;
pub mod client;
pub mod config;
pub mod daemon;
pub mod fsutil;
pub mod library;
pub mod logging;
pub mod paths;
pub mod protocol;
pub mod store;

#[cfg(test)]
mod testutil;

pub use client::Client;
pub use config::Config;
pub use daemon::{Daemon, DaemonError, DaemonHandle};
