//! Small per-user documents kept next to the cache: favorites, settings, the
//! playback queue and play counters.
//!
//! Each document lives in its own JSON file with its own lock, so a slow write
//! to one never holds up readers of another.

mod model;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::fsutil::{self, PersistError};

pub use model::{DEFAULT_PORT, DEFAULT_VOLUME, QueueState, RepeatMode, Settings};

pub type PlayStats = BTreeMap<String, u64>;

const FAVORITES_FILE: &str = "favorites.json";
const SETTINGS_FILE: &str = "settings.json";
const QUEUE_FILE: &str = "queue.json";
const STATS_FILE: &str = "playstats.json";

#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    favorites: RwLock<()>,
    settings: RwLock<()>,
    queue: RwLock<()>,
    stats: RwLock<()>,
}

/// Take a document lock even if a previous holder panicked; the guarded data
/// is on disk and every write is atomic.
macro_rules! lock {
    ($lock:expr, read) => {
        $lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    };
    ($lock:expr, write) => {
        $lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    };
}

impl Store {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fsutil::ensure_dir(&dir)?;
        Ok(Self {
            dir,
            favorites: RwLock::new(()),
            settings: RwLock::new(()),
            queue: RwLock::new(()),
            stats: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read a document, treating a malformed file like a missing one.
    fn read_or_default<T: DeserializeOwned + Default>(
        &self,
        name: &str,
    ) -> Result<T, PersistError> {
        match fsutil::read_json(&self.path(name)) {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(e @ PersistError::Json { .. }) => {
                warn!("{e}; starting from an empty document");
                Ok(T::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_favorites(&self) -> Result<Vec<String>, PersistError> {
        let _guard = lock!(self.favorites, read);
        self.read_or_default(FAVORITES_FILE)
    }

    /// Adding a path that is already a favorite changes nothing.
    pub fn add_favorite(&self, file_path: &str) -> Result<(), PersistError> {
        let _guard = lock!(self.favorites, write);
        let mut favorites: Vec<String> = self.read_or_default(FAVORITES_FILE)?;
        if favorites.iter().any(|f| f == file_path) {
            return Ok(());
        }
        favorites.push(file_path.to_string());
        fsutil::write_json(&self.path(FAVORITES_FILE), &favorites, true)
    }

    /// Removing a path that is not a favorite changes nothing.
    pub fn remove_favorite(&self, file_path: &str) -> Result<(), PersistError> {
        let _guard = lock!(self.favorites, write);
        let mut favorites: Vec<String> = self.read_or_default(FAVORITES_FILE)?;
        let before = favorites.len();
        favorites.retain(|f| f != file_path);
        if favorites.len() == before {
            return Ok(());
        }
        fsutil::write_json(&self.path(FAVORITES_FILE), &favorites, true)
    }

    pub fn is_favorite(&self, file_path: &str) -> Result<bool, PersistError> {
        Ok(self.get_favorites()?.iter().any(|f| f == file_path))
    }

    /// Current settings. Never fails: problems are logged and whatever could
    /// be decoded is returned on top of the defaults.
    pub fn get_settings(&self) -> Settings {
        let _guard = lock!(self.settings, read);
        let path = self.path(SETTINGS_FILE);
        let raw = match fsutil::read_bytes(&path) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Settings::default(),
            Err(e) => {
                warn!("{e}; using default settings");
                return Settings::default();
            }
        };

        let (settings, dropped) = Settings::decode_lenient(&raw);
        for problem in dropped {
            warn!("ignoring bad entry in {}: {problem}", path.display());
        }
        settings
    }

    /// Replace the settings document wholesale.
    pub fn save_settings(&self, settings: &Settings) -> Result<(), PersistError> {
        let _guard = lock!(self.settings, write);
        fsutil::write_json(&self.path(SETTINGS_FILE), settings, true)
    }

    /// Read-modify-write of the settings document under one lock.
    pub fn update_settings(&self, f: impl FnOnce(&mut Settings)) -> Result<(), PersistError> {
        let _guard = lock!(self.settings, write);
        let path = self.path(SETTINGS_FILE);
        let mut settings = match fsutil::read_bytes(&path)? {
            Some(raw) => Settings::decode_lenient(&raw).0,
            None => Settings::default(),
        };
        f(&mut settings);
        fsutil::write_json(&path, &settings, true)
    }

    pub fn get_queue(&self) -> Result<QueueState, PersistError> {
        let _guard = lock!(self.queue, read);
        self.read_or_default(QUEUE_FILE)
    }

    pub fn save_queue(&self, queue: &QueueState) -> Result<(), PersistError> {
        let _guard = lock!(self.queue, write);
        fsutil::write_json(&self.path(QUEUE_FILE), queue, true)
    }

    pub fn get_play_stats(&self) -> Result<PlayStats, PersistError> {
        let _guard = lock!(self.stats, read);
        self.read_or_default(STATS_FILE)
    }

    /// Bump the play counter for `file_path` and return the new count.
    pub fn record_play(&self, file_path: &str) -> Result<u64, PersistError> {
        let _guard = lock!(self.stats, write);
        let mut stats: PlayStats = self.read_or_default(STATS_FILE)?;
        let count = stats.entry(file_path.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;
        fsutil::write_json(&self.path(STATS_FILE), &stats, true)?;
        Ok(count)
    }
}
