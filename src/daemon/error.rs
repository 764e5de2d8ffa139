use std::io;
use std::path::PathBuf;

use crate::fsutil::PersistError;
use crate::library::{ExtractError, ScanError};

/// Everything a request (or daemon startup) can fail with.
///
/// The `Display` text is what clients see in the `error` field.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to bind {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to start the accept thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("invalid request: {0}")]
    ProtocolDecode(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("scan already in progress for {0}")]
    ScanInProgress(String),
    #[error("scan failed: {0}")]
    ScanFailed(#[from] ScanError),
    #[error(transparent)]
    Persistence(#[from] PersistError),
    #[error("invalid {what} JSON: {cause}")]
    InvalidPayload { what: &'static str, cause: String },
    #[error("failed to extract cover art: {0}")]
    CoverArt(#[source] ExtractError),
}

impl From<crate::protocol::UnknownAction> for DaemonError {
    fn from(e: crate::protocol::UnknownAction) -> Self {
        DaemonError::UnknownAction(e.0)
    }
}
