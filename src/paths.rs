//! XDG-style locations used by the service.
//!
//! Every directory resolves `$XDG_*` first and falls back to the usual
//! dot-directories under `$HOME`. Only [`runtime_dir`] and
//! [`create_private_dir`] touch the filesystem; directories they create are
//! owner-only (0700).

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

const APP: &str = "prestod";

fn xdg_or_home(var: &str, fallback: &[&str]) -> PathBuf {
    if let Some(p) = env::var_os(var).filter(|v| !v.is_empty()) {
        return PathBuf::from(p).join(APP);
    }
    let mut base = env::var_os("HOME").map(PathBuf::from).unwrap_or_else(env::temp_dir);
    for part in fallback {
        base.push(part);
    }
    base.join(APP)
}

/// `$XDG_DATA_HOME/prestod` or `~/.local/share/prestod`.
pub fn data_dir() -> PathBuf {
    xdg_or_home("XDG_DATA_HOME", &[".local", "share"])
}

/// `$XDG_CACHE_HOME/prestod` or `~/.cache/prestod`.
pub fn cache_dir() -> PathBuf {
    xdg_or_home("XDG_CACHE_HOME", &[".cache"])
}

/// `$XDG_STATE_HOME/prestod` or `~/.local/state/prestod`.
pub fn state_dir() -> PathBuf {
    xdg_or_home("XDG_STATE_HOME", &[".local", "state"])
}

/// `$XDG_CONFIG_HOME/prestod` or `~/.config/prestod`.
pub fn config_dir() -> PathBuf {
    xdg_or_home("XDG_CONFIG_HOME", &[".config"])
}

/// Directory holding the socket and pid file, without creating it.
pub fn runtime_dir_path() -> PathBuf {
    match env::var_os("XDG_RUNTIME_DIR").filter(|v| !v.is_empty()) {
        Some(base) => PathBuf::from(base).join(APP),
        None => env::temp_dir().join(format!("{APP}-{}", current_uid())),
    }
}

/// Like [`runtime_dir_path`] but makes sure the directory exists (mode 0700).
pub fn runtime_dir() -> io::Result<PathBuf> {
    let dir = runtime_dir_path();
    create_private_dir(&dir)?;
    Ok(dir)
}

pub fn socket_path() -> PathBuf {
    runtime_dir_path().join(format!("{APP}.sock"))
}

pub fn pid_path() -> PathBuf {
    runtime_dir_path().join(format!("{APP}.pid"))
}

pub fn log_path() -> PathBuf {
    state_dir().join(format!("{APP}.log"))
}

pub fn create_private_dir(dir: &std::path::Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn current_uid() -> u32 {
    // getuid never fails.
    unsafe { libc::getuid() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{EnvGuard, env_lock};

    #[test]
    fn data_dir_prefers_xdg_data_home() {
        let _lock = env_lock();
        let _g = EnvGuard::set("XDG_DATA_HOME", "/tmp/xdg-data");
        assert_eq!(data_dir(), PathBuf::from("/tmp/xdg-data/prestod"));
    }

    #[test]
    fn cache_dir_falls_back_to_home_dot_cache() {
        let _lock = env_lock();
        let _g1 = EnvGuard::remove("XDG_CACHE_HOME");
        let _g2 = EnvGuard::set("HOME", "/tmp/home-dir");
        assert_eq!(cache_dir(), PathBuf::from("/tmp/home-dir/.cache/prestod"));
    }

    #[test]
    fn socket_lives_under_runtime_dir() {
        let _lock = env_lock();
        let _g = EnvGuard::set("XDG_RUNTIME_DIR", "/tmp/xdg-run");
        assert_eq!(socket_path(), PathBuf::from("/tmp/xdg-run/prestod/prestod.sock"));
        assert_eq!(pid_path(), PathBuf::from("/tmp/xdg-run/prestod/prestod.pid"));
    }

    #[test]
    fn runtime_dir_without_xdg_is_keyed_by_real_uid() {
        use std::os::unix::fs::MetadataExt;

        let _lock = env_lock();
        let _g1 = EnvGuard::remove("XDG_RUNTIME_DIR");
        let _g2 = EnvGuard::remove("HOME");
        let owned = tempfile::NamedTempFile::new().unwrap();
        let uid = owned.as_file().metadata().unwrap().uid();
        assert_eq!(runtime_dir_path(), env::temp_dir().join(format!("prestod-{uid}")));
    }

    #[test]
    fn empty_xdg_var_is_ignored() {
        let _lock = env_lock();
        let _g1 = EnvGuard::set("XDG_STATE_HOME", "");
        let _g2 = EnvGuard::set("HOME", "/tmp/home-dir");
        assert_eq!(
            log_path(),
            PathBuf::from("/tmp/home-dir/.local/state/prestod/prestod.log")
        );
    }
}
