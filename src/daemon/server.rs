use std::ffi::c_int;
use std::fs;
use std::io::{self, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use signal_hook::iterator::Signals;
use tracing::{debug, info, warn};

use super::{Daemon, DaemonError};
use crate::client;
use crate::paths;
use crate::protocol::{Request, Response, read_frame, write_frame};

/// Running accept loop. Dropping the handle stops it.
pub struct DaemonHandle {
    socket_path: PathBuf,
    shutdown: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Bind the socket and start accepting connections on a background thread.
    ///
    /// A socket file left behind by an earlier run is removed first; one that
    /// a live daemon still answers on is left alone and startup fails. The
    /// socket is only accessible to the owning user.
    pub fn start(self: Arc<Self>) -> Result<DaemonHandle, DaemonError> {
        let socket_path = self.config.socket_path();
        let listener = bind(&socket_path, self.config.probe_timeout()).map_err(|source| {
            DaemonError::Bind {
                path: socket_path.clone(),
                source,
            }
        })?;
        info!("listening on {}", socket_path.display());

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let accept = thread::Builder::new()
            .name("prestod-accept".to_string())
            .spawn(move || accept_loop(self, listener, flag))
            .map_err(DaemonError::Spawn)?;

        Ok(DaemonHandle {
            socket_path,
            shutdown,
            accept: Some(accept),
        })
    }

    /// Serve requests from one client until it disconnects.
    fn serve_connection(&self, stream: UnixStream) {
        let mut writer = match stream.try_clone() {
            Ok(w) => w,
            Err(e) => {
                warn!("cannot clone connection: {e}");
                return;
            }
        };
        let max = self.config.daemon.max_line_bytes;
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();

        loop {
            match read_frame(&mut reader, max, &mut line) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!("dropping connection: {e}");
                    break;
                }
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let resp = match serde_json::from_slice::<Request>(&line) {
                Ok(req) => self.handle(&req),
                Err(e) => Response::err(DaemonError::ProtocolDecode(e.to_string()).to_string()),
            };
            if let Err(e) = write_frame(&mut writer, &resp) {
                debug!("client went away: {e}");
                break;
            }
        }
    }
}

fn bind(path: &Path, probe: Duration) -> io::Result<UnixListener> {
    // An existing parent keeps its permissions; it may be shared, like /tmp.
    if let Some(parent) = path.parent().filter(|p| !p.exists()) {
        paths::create_private_dir(parent)?;
    }
    if client::is_running(path, probe) {
        return Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            "another daemon is already listening there",
        ));
    }
    match fs::remove_file(path) {
        Ok(()) => debug!("removed stale socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let listener = UnixListener::bind(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    Ok(listener)
}

fn accept_loop(daemon: Arc<Daemon>, listener: UnixListener, shutdown: Arc<AtomicBool>) {
    for conn in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match conn {
            Ok(stream) => {
                let daemon = daemon.clone();
                let spawned = thread::Builder::new()
                    .name("prestod-conn".to_string())
                    .spawn(move || daemon.serve_connection(stream));
                if let Err(e) = spawned {
                    warn!("cannot spawn connection thread: {e}");
                }
            }
            Err(e) => {
                warn!("accept failed: {e}");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
    debug!("accept loop finished");
}

impl DaemonHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting, wait for the accept loop and remove the socket file.
    ///
    /// Connections already being served run until their client hangs up.
    pub fn stop(&mut self) {
        let Some(accept) = self.accept.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::SeqCst);
        // The accept loop only notices the flag once a connection arrives.
        match UnixStream::connect(&self.socket_path) {
            Ok(_) => {
                let _ = accept.join();
            }
            Err(e) => warn!("could not wake the accept loop: {e}"),
        }
        if let Err(e) = fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("could not remove {}: {e}", self.socket_path.display());
            }
        }
        info!("daemon stopped");
    }

    /// Serve until one of the signals registered in `signals` arrives, then
    /// stop. Returns the signal, or `None` if the iterator closed first.
    pub fn stop_on_signal(mut self, signals: &mut Signals) -> Option<c_int> {
        let received = signals.forever().next();
        match received {
            Some(signal) => info!("received signal {signal}, shutting down"),
            None => warn!("signal delivery closed, shutting down"),
        }
        self.stop();
        received
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
