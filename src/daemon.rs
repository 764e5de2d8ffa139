//! The long-running service: owns the cache and the store, listens on a Unix
//! socket and answers one request per line.

mod error;
mod handlers;
mod server;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::cache::Cache;
use crate::config::Config;
use crate::library::{Extractor, LoftyExtractor, Scanner};
use crate::store::Store;

pub use error::DaemonError;
pub use server::DaemonHandle;

pub struct Daemon {
    config: Config,
    cache: Cache,
    store: Store,
    extractor: Arc<dyn Extractor>,
    /// Directories with a scan currently running.
    scanning: Mutex<HashSet<PathBuf>>,
}

impl Daemon {
    /// Build a daemon reading tags with lofty.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        let extractor = LoftyExtractor::new().embed_cover_art(config.scan.embed_cover_art);
        Self::with_extractor(config, Arc::new(extractor))
    }

    pub fn with_extractor(
        config: Config,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self, DaemonError> {
        let cache = Cache::open(config.cache_dir())?;
        let store = Store::open(config.data_dir())?;
        info!(
            "cache in {}, data in {}",
            cache.dir().display(),
            store.dir().display()
        );
        Ok(Self {
            config,
            cache,
            store,
            extractor,
            scanning: Mutex::new(HashSet::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn scanner(&self) -> Scanner {
        Scanner::new(self.extractor.clone())
            .workers(self.config.scan_workers())
            .progress_every(self.config.scan.progress_every)
            .follow_links(self.config.scan.follow_links)
    }

    /// Mark `dir` as being scanned; the mark goes away when the guard drops.
    fn begin_scan(&self, dir: &Path) -> Result<ScanGuard<'_>, DaemonError> {
        let mut scanning = self
            .scanning
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !scanning.insert(dir.to_path_buf()) {
            return Err(DaemonError::ScanInProgress(dir.display().to_string()));
        }
        Ok(ScanGuard {
            scanning: &self.scanning,
            dir: dir.to_path_buf(),
        })
    }

    pub fn is_scanning(&self, dir: &Path) -> bool {
        self.scanning
            .lock()
            .map(|s| s.contains(dir))
            .unwrap_or(false)
    }
}

struct ScanGuard<'a> {
    scanning: &'a Mutex<HashSet<PathBuf>>,
    dir: PathBuf,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        let mut scanning = self
            .scanning
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        scanning.remove(&self.dir);
    }
}

#[cfg(test)]
mod tests;
