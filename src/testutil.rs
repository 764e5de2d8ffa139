//! Helpers shared by unit tests that poke at process-wide state.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::Duration;

use crate::library::{
    AudioRecord, CoverArt, ExtractError, Extractor, UNKNOWN_ALBUM, UNKNOWN_ARTIST,
    UNKNOWN_COMPOSER, UNKNOWN_GENRE,
};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serialises tests that read or write environment variables.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct EnvGuard {
    key: &'static str,
    old: Option<OsString>,
}

impl EnvGuard {
    pub fn set(key: &'static str, val: &str) -> Self {
        let old = std::env::var_os(key);
        unsafe {
            std::env::set_var(key, val);
        }
        Self { key, old }
    }

    pub fn remove(key: &'static str) -> Self {
        let old = std::env::var_os(key);
        unsafe {
            std::env::remove_var(key);
        }
        Self { key, old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match self.old.take() {
            Some(v) => unsafe {
                std::env::set_var(self.key, v);
            },
            None => unsafe {
                std::env::remove_var(self.key);
            },
        }
    }
}

/// Deterministic [`Extractor`] for tests.
///
/// A file whose content starts with `CORRUPT` fails; otherwise each
/// `key=value` line fills the matching field of the record.
#[derive(Debug, Default)]
pub struct FakeExtractor {
    pub delay: Duration,
}

impl FakeExtractor {
    pub fn slow(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Extractor for FakeExtractor {
    fn extract(&self, path: &Path) -> Result<AudioRecord, ExtractError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let content = fs::read_to_string(path).map_err(ExtractError::Open)?;
        if content.starts_with("CORRUPT") {
            return Err(ExtractError::Metadata("truncated file".to_string()));
        }

        let mut record = AudioRecord {
            file_path: path.to_path_buf(),
            file_name: path.file_name().unwrap().to_string_lossy().into_owned(),
            title: path.file_stem().unwrap().to_string_lossy().into_owned(),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            genre: UNKNOWN_GENRE.to_string(),
            composer: UNKNOWN_COMPOSER.to_string(),
            ..AudioRecord::default()
        };
        for line in content.lines() {
            if let Some((k, v)) = line.split_once('=') {
                let v = v.to_string();
                match k {
                    "title" => record.title = v,
                    "artist" => record.artist = v,
                    "album" => record.album = v,
                    "genre" => record.genre = v,
                    "composer" => record.composer = v,
                    "panic" => panic!("fake extractor asked to panic"),
                    _ => {}
                }
            }
        }
        Ok(record)
    }

    fn cover_art(&self, path: &Path) -> Result<Option<CoverArt>, ExtractError> {
        let content = fs::read_to_string(path).map_err(ExtractError::Open)?;
        Ok(content
            .lines()
            .find_map(|l| l.strip_prefix("cover="))
            .map(|data| CoverArt {
                data: data.to_string(),
                mime: "image/jpeg".to_string(),
            }))
    }
}
