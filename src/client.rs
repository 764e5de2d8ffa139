//! Blocking client for the daemon socket.

use std::io::{self, BufReader};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use crate::cache::CachedLibrary;
use crate::config::Config;
use crate::library::CoverArt;
use crate::protocol::{
    Action, DEFAULT_MAX_LINE_BYTES, FrameError, Request, Response, read_frame, write_frame,
};
use crate::store::{PlayStats, QueueState, Settings};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon not running at {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The daemon hung up, or an earlier exchange failed midway and the
    /// connection was dropped.
    #[error("connection to the daemon is closed")]
    Closed,
    #[error("response to {0} carried no payload")]
    MissingPayload(Action),
    /// Failure reported by the daemon itself.
    #[error("{0}")]
    Server(String),
}

struct Conn {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    line: Vec<u8>,
}

/// One connection to the daemon. Calls from several threads are serialized;
/// each holds the connection for a full request/response exchange.
///
/// Once an exchange fails partway the connection is discarded, and every
/// later call returns [`ClientError::Closed`].
pub struct Client {
    conn: Mutex<Option<Conn>>,
    max_line: usize,
}

impl Client {
    pub fn connect(path: impl AsRef<Path>, timeout: Duration) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let writer = connect_with_timeout(path, timeout).map_err(|source| {
            ClientError::Unavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Self {
            conn: Mutex::new(Some(Conn {
                reader,
                writer,
                line: Vec::new(),
            })),
            max_line: DEFAULT_MAX_LINE_BYTES,
        })
    }

    /// Connect using the socket path, timeout and line limit from `config`.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let mut client = Self::connect(config.socket_path(), config.connect_timeout())?;
        client.max_line = config.daemon.max_line_bytes;
        Ok(client)
    }

    /// Send `req` and wait for its response. A response with `ok: false`
    /// becomes [`ClientError::Server`].
    pub fn call(&self, req: &Request) -> Result<Response, ClientError> {
        let mut guard = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let conn = guard.as_mut().ok_or(ClientError::Closed)?;

        let resp = match exchange(conn, req, self.max_line) {
            Ok(resp) => resp,
            Err(e) => {
                // Part of a response may still be buffered; never read it as the
                // answer to the next request.
                *guard = None;
                return Err(e);
            }
        };
        if !resp.ok {
            return Err(ClientError::Server(
                resp.error.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        Ok(resp)
    }

    pub fn ping(&self) -> Result<(), ClientError> {
        self.call(&Request::new(Action::Ping)).map(drop)
    }

    /// Library of `dir`, served from cache when possible.
    pub fn get_library(&self, dir: &Path) -> Result<Arc<CachedLibrary>, ClientError> {
        self.library_call(Action::Library, dir)
    }

    /// Force a fresh scan of `dir`.
    pub fn scan(&self, dir: &Path) -> Result<Arc<CachedLibrary>, ClientError> {
        self.library_call(Action::Scan, dir)
    }

    fn library_call(&self, action: Action, dir: &Path) -> Result<Arc<CachedLibrary>, ClientError> {
        let dir = std::path::absolute(dir)?;
        let req = Request::new(action).with_dir(dir.to_string_lossy());
        self.call(&req)?
            .library
            .ok_or(ClientError::MissingPayload(action))
    }

    pub fn get_cover_art(&self, file_path: &str) -> Result<Option<CoverArt>, ClientError> {
        let resp = self.call(&Request::new(Action::CoverArt).with_file_path(file_path))?;
        Ok(match (resp.cover_art, resp.cover_mime) {
            (Some(data), Some(mime)) => Some(CoverArt { data, mime }),
            _ => None,
        })
    }

    pub fn get_favorites(&self) -> Result<Vec<String>, ClientError> {
        Ok(self
            .call(&Request::new(Action::GetFavorites))?
            .favorites
            .unwrap_or_default())
    }

    pub fn add_favorite(&self, file_path: &str) -> Result<(), ClientError> {
        self.call(&Request::new(Action::AddFavorite).with_file_path(file_path))
            .map(drop)
    }

    pub fn remove_favorite(&self, file_path: &str) -> Result<(), ClientError> {
        self.call(&Request::new(Action::RemoveFavorite).with_file_path(file_path))
            .map(drop)
    }

    pub fn is_favorite(&self, file_path: &str) -> Result<bool, ClientError> {
        let resp = self.call(&Request::new(Action::IsFavorite).with_file_path(file_path))?;
        Ok(resp.is_fav.unwrap_or(false))
    }

    pub fn get_settings(&self) -> Result<Settings, ClientError> {
        Ok(self
            .call(&Request::new(Action::GetSettings))?
            .settings
            .unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), ClientError> {
        let value = serde_json::to_value(settings)?;
        self.call(&Request::new(Action::SaveSettings).with_value(value))
            .map(drop)
    }

    pub fn get_stats(&self) -> Result<PlayStats, ClientError> {
        Ok(self
            .call(&Request::new(Action::GetStats))?
            .stats
            .unwrap_or_default())
    }

    pub fn record_play(&self, file_path: &str) -> Result<(), ClientError> {
        self.call(&Request::new(Action::RecordPlay).with_file_path(file_path))
            .map(drop)
    }

    pub fn get_queue(&self) -> Result<QueueState, ClientError> {
        Ok(self
            .call(&Request::new(Action::GetQueue))?
            .queue
            .unwrap_or_default())
    }

    pub fn save_queue(&self, queue: &QueueState) -> Result<(), ClientError> {
        let value = serde_json::to_value(queue)?;
        self.call(&Request::new(Action::SaveQueue).with_value(value))
            .map(drop)
    }
}

fn exchange(conn: &mut Conn, req: &Request, max_line: usize) -> Result<Response, ClientError> {
    write_frame(&mut conn.writer, req)?;
    loop {
        if !read_frame(&mut conn.reader, max_line, &mut conn.line)? {
            return Err(ClientError::Closed);
        }
        if !conn.line.is_empty() {
            break;
        }
    }
    Ok(serde_json::from_slice(&conn.line)?)
}

/// Whether something accepts connections on `path`. Nothing is sent.
pub fn is_running(path: impl AsRef<Path>, timeout: Duration) -> bool {
    connect_with_timeout(path.as_ref(), timeout).is_ok()
}

/// `UnixStream::connect` has no timeout of its own; run it on a helper
/// thread and give up waiting after `timeout`.
fn connect_with_timeout(path: &Path, timeout: Duration) -> io::Result<UnixStream> {
    let (tx, rx) = mpsc::channel();
    let target = path.to_path_buf();
    thread::Builder::new()
        .name("prestod-connect".to_string())
        .spawn(move || {
            let _ = tx.send(UnixStream::connect(target));
        })?;
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no answer within {} ms", timeout.as_millis()),
        )),
    }
}
