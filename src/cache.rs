//! Scan results cached per library directory.
//!
//! Every directory has a durable JSON file named after a hash of its absolute
//! path plus a hot in-memory copy. [`Cache::save`] updates both; readers fall
//! back to disk on a hot miss, so a restarted daemon picks up where it left off.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::fsutil::{self, PersistError};
use crate::library::{AudioRecord, ScanResult};

/// Persisted form of a [`ScanResult`].
///
/// `scan_time` is stamped before the file is written and is the only
/// reference used for staleness checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLibrary {
    pub dir: PathBuf,
    pub scan_time: DateTime<Utc>,
    pub file_count: usize,
    pub files: Vec<AudioRecord>,
    pub artists: BTreeMap<String, usize>,
    pub albums: BTreeMap<String, usize>,
    pub genres: BTreeMap<String, usize>,
    pub composers: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CachedLibrary {
    /// Stamp a finished scan of `dir` with the current time.
    pub fn from_scan(dir: &Path, result: ScanResult) -> Self {
        Self {
            dir: dir.to_path_buf(),
            scan_time: Utc::now(),
            file_count: result.audio_files,
            files: result.files,
            artists: result.artists,
            albums: result.albums,
            genres: result.genres,
            composers: result.composers,
            errors: result.errors,
        }
    }
}

/// Absolute form of `dir` used for hashing and as the in-memory key.
pub fn library_key(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// First 8 bytes of SHA-256 over the absolute path, hex encoded.
pub fn hash_dir(dir: &Path) -> String {
    let key = library_key(dir);
    let digest = Sha256::digest(key.as_os_str().as_encoded_bytes());
    hex::encode(&digest[..8])
}

#[derive(Debug)]
pub struct Cache {
    dir: PathBuf,
    hot: RwLock<HashMap<PathBuf, Arc<CachedLibrary>>>,
}

impl Cache {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fsutil::ensure_dir(&dir)?;
        Ok(Self {
            dir,
            hot: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the durable file for `dir`.
    pub fn cache_file(&self, dir: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", hash_dir(dir)))
    }

    /// Cached library for `dir`, hot copy first, then disk.
    ///
    /// A missing or unreadable file is reported as `None`.
    pub fn load(&self, dir: &Path) -> Option<Arc<CachedLibrary>> {
        let key = library_key(dir);
        if let Some(lib) = self.hot.read().ok()?.get(&key) {
            return Some(lib.clone());
        }

        let path = self.cache_file(dir);
        let lib: CachedLibrary = match fsutil::read_json(&path) {
            Ok(Some(lib)) => lib,
            Ok(None) => return None,
            Err(e) => {
                warn!("ignoring unreadable cache file: {e}");
                return None;
            }
        };
        if library_key(&lib.dir) != key {
            warn!(
                "cache file {} belongs to {}, not {}",
                path.display(),
                lib.dir.display(),
                key.display()
            );
            return None;
        }

        debug!("loaded cached library for {} from disk", key.display());
        let lib = Arc::new(lib);
        if let Ok(mut hot) = self.hot.write() {
            hot.insert(key, lib.clone());
        }
        Some(lib)
    }

    /// Replace the cached library for `lib.dir` in memory and on disk.
    pub fn save(&self, lib: CachedLibrary) -> Result<Arc<CachedLibrary>, PersistError> {
        let key = library_key(&lib.dir);
        let path = self.cache_file(&lib.dir);
        let lib = Arc::new(lib);

        if let Ok(mut hot) = self.hot.write() {
            hot.insert(key, lib.clone());
        }
        fsutil::write_json(&path, lib.as_ref(), false)?;
        debug!("saved cache {}", path.display());
        Ok(lib)
    }

    /// Forget `dir` both in memory and on disk.
    pub fn invalidate(&self, dir: &Path) -> Result<(), PersistError> {
        if let Ok(mut hot) = self.hot.write() {
            hot.remove(&library_key(dir));
        }
        fsutil::remove_if_exists(&self.cache_file(dir))
    }

    /// Whether `dir` needs a rescan.
    ///
    /// Only the directory's own mtime is compared against the scan time, so a
    /// change deep in the tree that does not touch the top-level directory
    /// goes unnoticed on some filesystems.
    pub fn is_stale(&self, dir: &Path) -> bool {
        let Some(lib) = self.load(dir) else {
            return true;
        };
        let Ok(modified) = fs::metadata(dir).and_then(|m| m.modified()) else {
            return true;
        };
        DateTime::<Utc>::from(modified) > lib.scan_time
    }
}
