//! Library scanning: walk a directory tree, extract per-file metadata and
//! aggregate it into a [`ScanResult`].
//!
//! The tag reader sits behind the [`Extractor`] trait so the scanner can be
//! driven by anything that turns a path into an [`AudioRecord`].

mod extract;
mod formats;
mod model;
mod scan;
mod walk;

pub use extract::{ExtractError, Extractor, LoftyExtractor};
pub use formats::{AUDIO_EXTENSIONS, FormatInfo, format_info, is_audio_file, supported_formats};
pub use model::*;
pub use scan::Scanner;
pub use walk::{ScanError, Walker};
