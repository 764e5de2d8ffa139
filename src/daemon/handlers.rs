use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{Daemon, DaemonError};
use crate::cache::{CachedLibrary, library_key};
use crate::protocol::{Action, Request, Response};
use crate::store::{QueueState, Settings};

type Handled = Result<Response, DaemonError>;

impl Daemon {
    /// Answer one request. Failures become `{ok: false, error}` responses.
    pub fn handle(&self, req: &Request) -> Response {
        match self.dispatch(req) {
            Ok(resp) => resp,
            Err(e) => {
                debug!("{} failed: {e}", req.action);
                Response::err(e.to_string())
            }
        }
    }

    fn dispatch(&self, req: &Request) -> Handled {
        let action: Action = req.action.parse()?;
        match action {
            Action::Ping => Ok(Response::ok()),
            Action::Library => self.library(require_dir(req)?),
            Action::Scan => self.scan_and_cache(&require_dir(req)?).map(library_response),
            Action::CoverArt => self.cover_art(require_file(req)?),
            Action::GetFavorites => Ok(Response {
                favorites: Some(self.store.get_favorites()?),
                ..Response::ok()
            }),
            Action::AddFavorite => {
                self.store.add_favorite(require_file(req)?)?;
                Ok(Response::ok())
            }
            Action::RemoveFavorite => {
                self.store.remove_favorite(require_file(req)?)?;
                Ok(Response::ok())
            }
            Action::IsFavorite => Ok(Response {
                is_fav: Some(self.store.is_favorite(require_file(req)?)?),
                ..Response::ok()
            }),
            Action::GetSettings => Ok(Response {
                settings: Some(self.store.get_settings().with_defaults()),
                ..Response::ok()
            }),
            Action::SaveSettings => {
                let settings: Settings =
                    req.payload().map_err(|cause| DaemonError::InvalidPayload {
                        what: "settings",
                        cause,
                    })?;
                self.store.save_settings(&settings)?;
                Ok(Response::ok())
            }
            Action::GetStats => Ok(Response {
                stats: Some(self.store.get_play_stats()?),
                ..Response::ok()
            }),
            Action::RecordPlay => {
                self.store.record_play(require_file(req)?)?;
                Ok(Response::ok())
            }
            Action::GetQueue => Ok(Response {
                queue: Some(self.store.get_queue()?),
                ..Response::ok()
            }),
            Action::SaveQueue => {
                let queue: QueueState =
                    req.payload().map_err(|cause| DaemonError::InvalidPayload {
                        what: "queue",
                        cause,
                    })?;
                self.store.save_queue(&queue)?;
                Ok(Response::ok())
            }
        }
    }

    /// Cached library for `dir`, scanning it first when nothing is cached.
    fn library(&self, dir: PathBuf) -> Handled {
        if let Some(lib) = self.cache.load(&dir) {
            return Ok(library_response(lib));
        }
        self.scan_and_cache(&dir).map(library_response)
    }

    /// Drop whatever is cached for `dir`, scan it and cache the result.
    /// Rejected while another scan of the same directory runs.
    pub fn scan_and_cache(&self, dir: &Path) -> Result<Arc<CachedLibrary>, DaemonError> {
        let _guard = self.begin_scan(dir)?;
        if let Err(e) = self.cache.invalidate(dir) {
            warn!("could not drop old cache for {}: {e}", dir.display());
        }
        info!("scanning {}", dir.display());

        let result = self.scanner().scan_library(dir)?;
        let lib = CachedLibrary::from_scan(dir, result);
        let lib = match self.cache.save(lib.clone()) {
            Ok(saved) => saved,
            Err(e) => {
                error!("failed to save cache for {}: {e}", dir.display());
                Arc::new(lib)
            }
        };

        let last_dir = dir.to_string_lossy().into_owned();
        if let Err(e) = self.store.update_settings(|s| s.last_dir = Some(last_dir)) {
            warn!("could not remember last directory: {e}");
        }
        Ok(lib)
    }

    fn cover_art(&self, file_path: &str) -> Handled {
        let art = self
            .extractor
            .cover_art(Path::new(file_path))
            .map_err(DaemonError::CoverArt)?;
        let mut resp = Response::ok();
        if let Some(art) = art {
            resp.cover_art = Some(art.data);
            resp.cover_mime = Some(art.mime);
        }
        Ok(resp)
    }
}

fn library_response(lib: Arc<CachedLibrary>) -> Response {
    Response {
        library: Some(lib),
        ..Response::ok()
    }
}

fn require_dir(req: &Request) -> Result<PathBuf, DaemonError> {
    match req.dir.as_deref() {
        Some(dir) if !dir.is_empty() => Ok(library_key(Path::new(dir))),
        _ => Err(DaemonError::MissingField("dir")),
    }
}

fn require_file(req: &Request) -> Result<&str, DaemonError> {
    match req.file_path.as_deref() {
        Some(p) if !p.is_empty() => Ok(p),
        _ => Err(DaemonError::MissingField("file_path")),
    }
}
