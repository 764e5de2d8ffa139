use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::SyncSender;

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::formats::is_audio_file;
use super::model::{ScanPhase, ScanProgress};

const WALK_PROGRESS_EVERY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("error walking {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Push a progress event without ever blocking the producer.
pub(crate) fn send_progress(tx: Option<&SyncSender<ScanProgress>>, progress: ScanProgress) {
    if let Some(tx) = tx {
        // Full or disconnected: the consumer simply misses this one.
        let _ = tx.try_send(progress);
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.') && name != "." && name != "..")
            .unwrap_or(false)
}

fn is_skippable(err: &walkdir::Error) -> bool {
    if err.loop_ancestor().is_some() {
        return true;
    }
    err.io_error()
        .map(|e| e.kind() == io::ErrorKind::PermissionDenied)
        .unwrap_or(false)
}

/// Walks a library root and returns its audio files.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    follow_links: bool,
    progress: Option<SyncSender<ScanProgress>>,
}

impl Walker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn with_progress(mut self, tx: SyncSender<ScanProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Collect every audio file under `root`, sorted by path.
    ///
    /// Hidden directories are not descended into. Permission problems on
    /// single entries are logged and skipped; anything else aborts the walk.
    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        debug!("starting directory walk: {}", root.display());

        let mut found = Vec::new();
        let mut visited = 0usize;

        let entries = WalkDir::new(root)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_dir(e));

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) if is_skippable(&err) => {
                    warn!(
                        "skipping {}: {err}",
                        err.path().unwrap_or(root).display()
                    );
                    continue;
                }
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    return Err(ScanError::Walk { path, source: err });
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            visited += 1;
            if is_audio_file(entry.path()) {
                debug!("found audio file: {}", entry.path().display());
                found.push(entry.into_path());
            }

            if visited % WALK_PROGRESS_EVERY == 0 {
                send_progress(
                    self.progress.as_ref(),
                    ScanProgress {
                        phase: ScanPhase::Walking,
                        current: visited,
                        total: None,
                        message: format!("Scanned {visited} files, {} audio", found.len()),
                    },
                );
            }
        }

        found.sort();
        debug!(
            "directory walk completed: {} audio files out of {visited}",
            found.len()
        );
        send_progress(
            self.progress.as_ref(),
            ScanProgress {
                phase: ScanPhase::Walking,
                current: visited,
                total: Some(visited),
                message: "Walk completed".to_string(),
            },
        );
        Ok(found)
    }
}
