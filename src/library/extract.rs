use std::fs;
use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use lofty::error::ErrorKind;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::tag::{ItemKey, Tag};
use tracing::debug;

use super::formats::{extension_of, technical_defaults};
use super::model::{
    AudioRecord, CoverArt, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_COMPOSER, UNKNOWN_GENRE,
};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to open file: {0}")]
    Open(#[source] io::Error),
    #[error("failed to read metadata: {0}")]
    Metadata(String),
}

/// Turns one file into an [`AudioRecord`].
///
/// Implementations are shared across scan workers, so they must be `Send + Sync`.
/// An `Err` is reserved for files that cannot be read at all; the scanner records
/// it and moves on.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<AudioRecord, ExtractError>;

    /// Cover art of a single file, `Ok(None)` when the file has none.
    fn cover_art(&self, path: &Path) -> Result<Option<CoverArt>, ExtractError>;
}

/// [`Extractor`] backed by the `lofty` tag reader.
#[derive(Debug, Clone, Default)]
pub struct LoftyExtractor {
    embed_cover_art: bool,
}

impl LoftyExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep base64 cover art inside each record.
    pub fn embed_cover_art(mut self, embed: bool) -> Self {
        self.embed_cover_art = embed;
        self
    }

    fn read(&self, path: &Path) -> Result<Option<TaggedFile>, ExtractError> {
        match lofty::read_from_path(path) {
            Ok(tagged) => Ok(Some(tagged)),
            Err(e) => match e.kind() {
                ErrorKind::UnknownFormat => {
                    debug!("unrecognised format for {}: {e}", path.display());
                    Ok(None)
                }
                ErrorKind::Io(io_err) => Err(ExtractError::Open(io::Error::new(
                    io_err.kind(),
                    e.to_string(),
                ))),
                _ => Err(ExtractError::Metadata(e.to_string())),
            },
        }
    }
}

impl Extractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> Result<AudioRecord, ExtractError> {
        let meta = fs::metadata(path).map_err(ExtractError::Open)?;
        let mut record = base_record(path, &meta);

        match self.read(path)? {
            Some(tagged) => {
                if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
                    populate_tags(&mut record, tag);
                }
                populate_properties(&mut record, &tagged);
                if self.embed_cover_art {
                    if let Some(cover) = find_cover(&tagged) {
                        record.cover_art = Some(cover.data);
                        record.cover_art_mime = Some(cover.mime);
                    }
                }
            }
            None => {
                record.error = Some("unsupported tag format".to_string());
                apply_technical_defaults(&mut record);
            }
        }

        Ok(record)
    }

    fn cover_art(&self, path: &Path) -> Result<Option<CoverArt>, ExtractError> {
        fs::File::open(path).map_err(ExtractError::Open)?;
        Ok(self.read(path)?.as_ref().and_then(find_cover))
    }
}

fn base_record(path: &Path, meta: &fs::Metadata) -> AudioRecord {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .to_string();

    AudioRecord {
        file_path: path.to_path_buf(),
        file_name,
        file_size: meta.len(),
        file_type: extension_of(path).unwrap_or_default(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        title,
        artist: UNKNOWN_ARTIST.to_string(),
        album: UNKNOWN_ALBUM.to_string(),
        genre: UNKNOWN_GENRE.to_string(),
        composer: UNKNOWN_COMPOSER.to_string(),
        ..AudioRecord::default()
    }
}

fn tag_text(tag: &Tag, key: ItemKey) -> Option<String> {
    tag.get_string(&key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parses "3" or "3/12" into `(3, Some(12))`.
fn parse_position(raw: &str) -> (u32, Option<u32>) {
    let mut parts = raw.splitn(2, '/');
    let number = parts.next().map(leading_number).unwrap_or(0);
    let total = parts.next().map(leading_number).filter(|n| *n > 0);
    (number, total)
}

fn leading_number(raw: &str) -> u32 {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn populate_tags(record: &mut AudioRecord, tag: &Tag) {
    if let Some(v) = tag_text(tag, ItemKey::TrackTitle) {
        record.title = v;
    }
    if let Some(v) = tag_text(tag, ItemKey::TrackArtist) {
        record.artist = v;
    }
    if let Some(v) = tag_text(tag, ItemKey::AlbumTitle) {
        record.album = v;
    }
    if let Some(v) = tag_text(tag, ItemKey::AlbumArtist) {
        record.album_artist = v;
    }
    if let Some(v) = tag_text(tag, ItemKey::Composer) {
        record.composer = v;
    }
    if let Some(v) = tag_text(tag, ItemKey::Genre) {
        record.genre = v;
    }
    let year = tag_text(tag, ItemKey::Year).or_else(|| tag_text(tag, ItemKey::RecordingDate));
    if let Some(v) = year {
        record.year = leading_number(&v);
    }
    if let Some(v) = tag_text(tag, ItemKey::TrackNumber) {
        let (n, total) = parse_position(&v);
        record.track = n;
        record.total_tracks = total.unwrap_or(0);
    }
    if let Some(v) = tag_text(tag, ItemKey::TrackTotal) {
        record.total_tracks = leading_number(&v);
    }
    if let Some(v) = tag_text(tag, ItemKey::DiscNumber) {
        let (n, total) = parse_position(&v);
        record.disc = n;
        record.total_discs = total.unwrap_or(0);
    }
    if let Some(v) = tag_text(tag, ItemKey::DiscTotal) {
        record.total_discs = leading_number(&v);
    }
    if let Some(v) = tag_text(tag, ItemKey::Comment) {
        record.comment = v;
    }
    if let Some(v) = tag_text(tag, ItemKey::Lyrics) {
        record.lyrics = v;
    }
    if let Some(v) = tag_text(tag, ItemKey::Bpm).or_else(|| tag_text(tag, ItemKey::IntegerBpm)) {
        record.bpm = leading_number(&v);
    }
}

fn populate_properties(record: &mut AudioRecord, tagged: &TaggedFile) {
    let props = tagged.properties();
    let (bitrate, sample_rate, channels) = technical_defaults(&record.file_type);

    record.bitrate = props
        .audio_bitrate()
        .or_else(|| props.overall_bitrate())
        .filter(|b| *b > 0)
        .unwrap_or(bitrate);
    record.sample_rate = props.sample_rate().filter(|r| *r > 0).unwrap_or(sample_rate);
    record.channels = props.channels().filter(|c| *c > 0).unwrap_or(channels);

    let duration = props.duration();
    record.duration_ms = if duration.is_zero() {
        estimate_duration_ms(record.file_size, record.bitrate)
    } else {
        duration.as_millis() as u64
    };
}

fn apply_technical_defaults(record: &mut AudioRecord) {
    let (bitrate, sample_rate, channels) = technical_defaults(&record.file_type);
    record.bitrate = bitrate;
    record.sample_rate = sample_rate;
    record.channels = channels;
    record.duration_ms = estimate_duration_ms(record.file_size, bitrate);
}

/// Duration guess from size and a constant bitrate (kbps).
pub(crate) fn estimate_duration_ms(file_size: u64, bitrate_kbps: u32) -> u64 {
    if bitrate_kbps == 0 {
        return 0;
    }
    // bits / (kbit/s) == milliseconds
    file_size.saturating_mul(8) / u64::from(bitrate_kbps)
}

fn find_cover(tagged: &TaggedFile) -> Option<CoverArt> {
    let pictures: Vec<&Picture> = tagged.tags().iter().flat_map(|t| t.pictures()).collect();
    let picture = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())?;

    let data = picture.data();
    if data.is_empty() {
        return None;
    }
    let mime = picture
        .mime_type()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| sniff_image_mime(data).to_string());

    Some(CoverArt {
        data: BASE64.encode(data),
        mime,
    })
}

pub(crate) fn sniff_image_mime(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', ..] => "image/gif",
        [b'B', b'M', ..] => "image/bmp",
        _ => "application/octet-stream",
    }
}
