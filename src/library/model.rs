use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown Genre";
pub const UNKNOWN_COMPOSER: &str = "Unknown Composer";

/// Metadata of a single audio file as produced by an [`Extractor`](super::Extractor).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioRecord {
    pub file_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    /// Lowercase extension without the dot.
    pub file_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub composer: String,
    pub genre: String,
    pub year: u32,
    pub track: u32,
    pub total_tracks: u32,
    pub disc: u32,
    pub total_discs: u32,
    pub duration_ms: u64,
    /// Kilobits per second.
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub comment: String,
    pub lyrics: String,
    pub bpm: u32,
    /// Base64 encoded picture, only when the extractor embeds cover art.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_art_mime: Option<String>,
    /// Non-fatal problem hit while reading the file (e.g. unsupported tag format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cover art of one file, already base64 encoded for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub data: String,
    pub mime: String,
}

/// Aggregate of one scan. Built once by the orchestrator and never mutated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanResult {
    /// Audio files found by the walk.
    pub total_files: usize,
    /// Files whose metadata was extracted successfully.
    pub audio_files: usize,
    pub artists: BTreeMap<String, usize>,
    pub albums: BTreeMap<String, usize>,
    pub genres: BTreeMap<String, usize>,
    pub composers: BTreeMap<String, usize>,
    pub files: Vec<AudioRecord>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    Walking,
    Extracting,
    Done,
}

/// Best-effort progress notification. Consumers may miss any of these.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub current: usize,
    /// `None` while the walk has not finished counting.
    pub total: Option<usize>,
    pub message: String,
}
