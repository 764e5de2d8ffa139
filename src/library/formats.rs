use std::path::Path;

/// Extensions the walker treats as audio, lowercase and without the dot.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "m4a", "aac", "wma", "opus", "alac", "aiff", "dsf",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FormatInfo {
    pub extension: &'static str,
    pub description: &'static str,
    pub lossless: bool,
}

const fn format(extension: &'static str, description: &'static str, lossless: bool) -> FormatInfo {
    FormatInfo {
        extension,
        description,
        lossless,
    }
}

const FORMATS: &[FormatInfo] = &[
    format("mp3", "MPEG Audio Layer III", false),
    format("flac", "Free Lossless Audio Codec", true),
    format("wav", "Waveform Audio File Format", true),
    format("ogg", "Ogg Vorbis", false),
    format("m4a", "MPEG-4 Audio", false),
    format("aac", "Advanced Audio Coding", false),
    format("wma", "Windows Media Audio", false),
    format("opus", "Opus Audio", false),
    format("alac", "Apple Lossless Audio Codec", true),
    format("aiff", "Audio Interchange File Format", true),
    format("dsf", "DSD Stream File", true),
];

/// Lowercased extension of `path`, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_audio_file(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn format_info(extension: &str) -> Option<&'static FormatInfo> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    FORMATS.iter().find(|f| f.extension == ext)
}

pub fn supported_formats() -> &'static [FormatInfo] {
    FORMATS
}

/// Technical defaults used when the tag library reports nothing:
/// (bitrate kbps, sample rate Hz, channels).
pub(crate) fn technical_defaults(extension: &str) -> (u32, u32, u8) {
    match extension {
        "flac" | "wav" | "aiff" => (1411, 44100, 2),
        "mp3" => (320, 44100, 2),
        "m4a" | "aac" => (256, 44100, 2),
        _ => (128, 44100, 2),
    }
}
