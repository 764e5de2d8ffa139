use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::thread;
use std::time::Instant;

use tracing::{debug, info};

use super::extract::{ExtractError, Extractor};
use super::model::{
    AudioRecord, ScanPhase, ScanProgress, ScanResult, UNKNOWN_ALBUM, UNKNOWN_ARTIST,
    UNKNOWN_COMPOSER, UNKNOWN_GENRE,
};
use super::walk::{ScanError, Walker, send_progress};

/// Runs a full library scan: walk, extract on a bounded pool, aggregate.
#[derive(Clone)]
pub struct Scanner {
    extractor: Arc<dyn Extractor>,
    workers: usize,
    progress_every: usize,
    follow_links: bool,
    progress: Option<SyncSender<ScanProgress>>,
}

impl Scanner {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            workers: 4,
            progress_every: 10,
            follow_links: false,
            progress: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Progress events go to `tx` with `try_send`; a full channel drops them.
    pub fn with_progress(mut self, tx: SyncSender<ScanProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    fn progress(&self, phase: ScanPhase, current: usize, total: usize, message: String) {
        send_progress(
            self.progress.as_ref(),
            ScanProgress {
                phase,
                current,
                total: Some(total),
                message,
            },
        );
    }

    /// Scan `root` and aggregate every audio file found below it.
    ///
    /// Only a failed walk is an error. Files the extractor rejects end up in
    /// `ScanResult::errors` and are left out of the counts.
    pub fn scan_library(&self, root: &Path) -> Result<ScanResult, ScanError> {
        let started = Instant::now();

        let mut walker = Walker::new().follow_links(self.follow_links);
        if let Some(tx) = &self.progress {
            walker = walker.with_progress(tx.clone());
        }
        let paths = walker.walk(root)?;
        let total = paths.len();

        self.progress(
            ScanPhase::Extracting,
            0,
            total,
            "Extracting metadata...".to_string(),
        );

        let workers = self.workers.min(total).max(1);
        debug!("extracting {total} files on {workers} workers");

        let mut aggregate = Aggregate::default();
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, Result<AudioRecord, ExtractError>)>();
        let extractor: &dyn Extractor = self.extractor.as_ref();

        thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let paths = &paths;
                s.spawn(move || {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(path) = paths.get(i) else {
                            break;
                        };
                        if tx.send((i, extract_guarded(extractor, path))).is_err() {
                            break;
                        }
                    }
                });
            }
            // Workers hold the remaining senders; the loop ends once all of them exit.
            drop(tx);

            for (done, (i, outcome)) in rx.iter().enumerate() {
                aggregate.push(&paths[i], outcome);
                let done = done + 1;
                if done % self.progress_every == 0 || done == total {
                    self.progress(
                        ScanPhase::Extracting,
                        done,
                        total,
                        format!("Processed {done}/{total} files"),
                    );
                }
            }
        });

        let result = aggregate.finish(total, started.elapsed().as_millis() as u64);
        info!(
            "scanned {}: {} audio files, {} errors in {}ms",
            root.display(),
            result.audio_files,
            result.errors.len(),
            result.duration_ms
        );
        self.progress(
            ScanPhase::Done,
            total,
            total,
            format!(
                "Scan completed: {} audio files found in {}ms",
                result.audio_files, result.duration_ms
            ),
        );
        Ok(result)
    }
}

/// A panicking extractor costs one file, not the whole scan.
fn extract_guarded(extractor: &dyn Extractor, path: &Path) -> Result<AudioRecord, ExtractError> {
    match panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(path))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ExtractError::Metadata(format!("extractor panicked: {msg}")))
        }
    }
}

fn bump(counts: &mut BTreeMap<String, usize>, value: &str, sentinel: &str) {
    if value.is_empty() || value == sentinel {
        return;
    }
    *counts.entry(value.to_string()).or_insert(0) += 1;
}

/// Owned by the collecting thread only; workers never touch it.
#[derive(Default)]
struct Aggregate {
    result: ScanResult,
}

impl Aggregate {
    fn push(&mut self, path: &Path, outcome: Result<AudioRecord, ExtractError>) {
        match outcome {
            Ok(record) => {
                let r = &mut self.result;
                bump(&mut r.artists, &record.artist, UNKNOWN_ARTIST);
                bump(&mut r.albums, &record.album, UNKNOWN_ALBUM);
                bump(&mut r.genres, &record.genre, UNKNOWN_GENRE);
                bump(&mut r.composers, &record.composer, UNKNOWN_COMPOSER);
                r.files.push(record);
            }
            Err(err) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.result
                    .errors
                    .push(format!("Failed to extract metadata from {name}: {err}"));
            }
        }
    }

    fn finish(mut self, total: usize, duration_ms: u64) -> ScanResult {
        self.result.files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        self.result.errors.sort();
        self.result.total_files = total;
        self.result.audio_files = self.result.files.len();
        self.result.duration_ms = duration_ms;
        self.result
    }
}
