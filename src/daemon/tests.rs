use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::{TempDir, tempdir};

use super::*;
use crate::cache::library_key;
use crate::client::{
    Client, ClientError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PROBE_TIMEOUT, is_running,
};
use crate::store::{QueueState, RepeatMode, Settings};
use crate::testutil::FakeExtractor;

// Field order matters: the server must stop before its temp dir goes away.
struct Running {
    handle: DaemonHandle,
    daemon: Arc<Daemon>,
    root: TempDir,
}

impl Running {
    fn client(&self) -> Client {
        Client::connect(self.handle.socket_path(), DEFAULT_CONNECT_TIMEOUT).unwrap()
    }

    /// Send raw lines and read back `responses` lines verbatim.
    fn raw(&self, input: &str, responses: usize) -> Vec<String> {
        let mut stream = UnixStream::connect(self.handle.socket_path()).unwrap();
        stream.write_all(input.as_bytes()).unwrap();
        let mut reader = BufReader::new(stream);
        (0..responses)
            .map(|_| {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                line.trim_end().to_string()
            })
            .collect()
    }

    fn music_dir(&self) -> std::path::PathBuf {
        let dir = self.root.path().join("music");
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.daemon.socket_path = Some(root.join("run").join("prestod.sock"));
    config.paths.cache_dir = Some(root.join("cache"));
    config.paths.data_dir = Some(root.join("data"));
    config.scan.workers = 2;
    config
}

fn start_with(extractor: FakeExtractor, tweak: impl FnOnce(&mut Config)) -> Running {
    let root = tempdir().unwrap();
    let mut config = test_config(root.path());
    tweak(&mut config);
    let daemon = Arc::new(Daemon::with_extractor(config, Arc::new(extractor)).unwrap());
    let handle = daemon.clone().start().unwrap();
    Running {
        handle,
        daemon,
        root,
    }
}

fn start() -> Running {
    start_with(FakeExtractor::default(), |_| {})
}

fn server_error<T: std::fmt::Debug>(result: Result<T, ClientError>) -> String {
    match result {
        Err(ClientError::Server(msg)) => msg,
        other => panic!("expected a server error, got {other:?}"),
    }
}

#[test]
fn ping_and_unknown_action_have_exact_wire_form() {
    let d = start();
    let lines = d.raw("{\"action\":\"ping\"}\n{\"action\":\"bogus\"}\n", 2);
    assert_eq!(lines[0], r#"{"ok":true}"#);
    assert_eq!(lines[1], r#"{"ok":false,"error":"unknown action: bogus"}"#);
}

#[test]
fn bad_json_is_answered_and_connection_stays_open() {
    let d = start();
    let lines = d.raw("not json\n\n   \n{\"action\":\"ping\"}\n", 2);
    assert!(lines[0].starts_with(r#"{"ok":false,"error":"invalid request: "#));
    assert_eq!(lines[1], r#"{"ok":true}"#);
}

#[test]
fn oversized_line_closes_the_connection() {
    let d = start_with(FakeExtractor::default(), |c| c.daemon.max_line_bytes = 1024);
    let mut stream = UnixStream::connect(d.handle.socket_path()).unwrap();
    stream.write_all(&vec![b'x'; 4096]).unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line);
    assert!(matches!(read, Ok(0) | Err(_)), "got {read:?} / {line:?}");

    // The server itself is fine.
    d.client().ping().unwrap();
}

#[test]
fn missing_fields_are_reported() {
    let d = start();
    let lines = d.raw(
        "{\"action\":\"library\"}\n{\"action\":\"scan\",\"dir\":\"\"}\n{\"action\":\"add-favorite\"}\n",
        3,
    );
    assert_eq!(lines[0], r#"{"ok":false,"error":"dir is required"}"#);
    assert_eq!(lines[1], r#"{"ok":false,"error":"dir is required"}"#);
    assert_eq!(lines[2], r#"{"ok":false,"error":"file_path is required"}"#);
}

#[test]
fn library_scans_once_then_serves_from_cache() {
    let d = start();
    let music = d.music_dir();
    fs::write(music.join("a.mp3"), "artist=Alpha\nalbum=One").unwrap();
    fs::write(music.join("b.flac"), "artist=Beta\nalbum=One\ngenre=Jazz").unwrap();
    fs::write(music.join("c.ogg"), "CORRUPT").unwrap();

    let client = d.client();
    let lib = client.get_library(&music).unwrap();
    assert_eq!(lib.file_count, 2);
    assert_eq!(lib.files.len(), 2);
    assert_eq!(lib.errors.len(), 1);
    assert_eq!(lib.albums.get("One"), Some(&2));
    assert_eq!(lib.genres.get("Jazz"), Some(&1));
    assert_eq!(lib.dir, library_key(&music));

    let again = client.get_library(&music).unwrap();
    assert_eq!(again.scan_time, lib.scan_time);
    assert!(d.daemon.cache().load(&music).is_some());

    let settings = client.get_settings().unwrap();
    assert_eq!(settings.last_dir.as_deref(), Some(music.to_str().unwrap()));
}

#[test]
fn scan_replaces_the_cached_library() {
    let d = start();
    let music = d.music_dir();
    fs::write(music.join("a.mp3"), "artist=Alpha").unwrap();

    let client = d.client();
    let first = client.get_library(&music).unwrap();
    assert_eq!(first.file_count, 1);

    fs::write(music.join("b.mp3"), "artist=Beta").unwrap();
    assert_eq!(client.get_library(&music).unwrap().file_count, 1);

    let rescanned = client.scan(&music).unwrap();
    assert_eq!(rescanned.file_count, 2);
    assert_eq!(d.daemon.cache().load(&music).unwrap().file_count, 2);
}

#[test]
fn overlapping_scans_of_one_directory_are_rejected() {
    let d = start_with(FakeExtractor::slow(Duration::from_millis(150)), |_| {});
    let music = d.music_dir();
    for i in 0..4 {
        fs::write(music.join(format!("{i}.mp3")), "artist=Slow").unwrap();
    }

    let first = {
        let client = d.client();
        let music = music.clone();
        thread::spawn(move || client.scan(&music))
    };

    let key = library_key(&music);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !d.daemon.is_scanning(&key) {
        assert!(Instant::now() < deadline, "first scan never started");
        thread::sleep(Duration::from_millis(5));
    }

    let msg = server_error(d.client().scan(&music));
    assert_eq!(msg, format!("scan already in progress for {}", key.display()));

    let lib = first.join().unwrap().unwrap();
    assert_eq!(lib.file_count, 4);
    assert!(!d.daemon.is_scanning(&key));
    assert_eq!(*d.daemon.cache().load(&music).unwrap(), *lib);
}

#[test]
fn scanning_different_directories_is_allowed_concurrently() {
    let d = start_with(FakeExtractor::slow(Duration::from_millis(50)), |_| {});
    let a = d.root.path().join("a");
    let b = d.root.path().join("b");
    for dir in [&a, &b] {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("x.mp3"), "artist=X").unwrap();
    }

    let handles: Vec<_> = [a, b]
        .into_iter()
        .map(|dir| {
            let client = d.client();
            thread::spawn(move || client.scan(&dir))
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().unwrap().file_count, 1);
    }
}

#[test]
fn failed_scan_reports_and_clears_the_mark() {
    let d = start();
    let missing = d.root.path().join("nope");
    let msg = server_error(d.client().scan(&missing));
    assert!(msg.starts_with("scan failed: "), "{msg}");
    assert!(!d.daemon.is_scanning(&library_key(&missing)));
}

#[test]
fn favorites_round_trip_through_the_socket() {
    let d = start();
    let client = d.client();
    assert!(client.get_favorites().unwrap().is_empty());

    client.add_favorite("/m/a.mp3").unwrap();
    client.add_favorite("/m/a.mp3").unwrap();
    assert_eq!(client.get_favorites().unwrap(), vec!["/m/a.mp3"]);
    assert!(client.is_favorite("/m/a.mp3").unwrap());

    client.remove_favorite("/m/zzz.mp3").unwrap();
    client.remove_favorite("/m/a.mp3").unwrap();
    assert!(!client.is_favorite("/m/a.mp3").unwrap());

    let lines = d.raw(
        "{\"action\":\"get-favorites\"}\n{\"action\":\"is-favorite\",\"file_path\":\"/m/a.mp3\"}\n",
        2,
    );
    assert_eq!(lines[0], r#"{"ok":true,"favorites":[]}"#);
    assert_eq!(lines[1], r#"{"ok":true,"is_fav":false}"#);
}

#[test]
fn settings_defaults_save_and_string_payloads() {
    let d = start();
    let client = d.client();

    let lines = d.raw("{\"action\":\"get-settings\"}\n", 1);
    assert_eq!(
        lines[0],
        r#"{"ok":true,"settings":{"volume":0.0,"shuffle":false,"repeat":0,"last_port":8080}}"#
    );
    let fresh = client.get_settings().unwrap();
    assert_eq!(fresh.repeat, Some(RepeatMode::Off));
    assert_eq!(fresh.last_port, Some(8080));

    let wanted = Settings {
        volume: Some(0.4),
        repeat: Some(RepeatMode::All),
        ..Settings::default()
    };
    client.save_settings(&wanted).unwrap();
    assert_eq!(client.get_settings().unwrap(), wanted.clone().with_defaults());
    let stored = fs::read_to_string(d.daemon.store().dir().join("settings.json")).unwrap();
    assert!(!stored.contains("last_port"));

    let lines = d.raw(
        concat!(
            r#"{"action":"save-settings","value":"{\"shuffle\":true}"}"#,
            "\n",
            r#"{"action":"save-settings","value":"{broken"}"#,
            "\n",
        ),
        2,
    );
    assert_eq!(lines[0], r#"{"ok":true}"#);
    assert!(lines[1].starts_with(r#"{"ok":false,"error":"invalid settings JSON: "#));

    let now = client.get_settings().unwrap();
    assert_eq!(now.shuffle, Some(true));
    assert_eq!(now.volume, Some(0.0));
    assert_eq!(d.daemon.store().get_settings().volume, None);
}

#[test]
fn queue_and_play_stats() {
    let d = start();
    let client = d.client();
    assert_eq!(client.get_queue().unwrap(), QueueState::default());

    let q = QueueState {
        file_paths: vec!["/m/1.mp3".into(), "/m/2.mp3".into()],
        current_index: 1,
        shuffle: false,
        repeat: 2,
        ..QueueState::default()
    };
    client.save_queue(&q).unwrap();
    assert_eq!(client.get_queue().unwrap(), q);

    let lines = d.raw(
        concat!(
            r#"{"action":"save-queue","value":{"current_index":-1,"repeat":3}}"#,
            "\n",
            r#"{"action":"get-queue"}"#,
            "\n",
        ),
        2,
    );
    assert_eq!(lines[0], r#"{"ok":true}"#);
    let stopped = client.get_queue().unwrap();
    assert_eq!(stopped.current_index, -1);
    assert_eq!(stopped.repeat, 3);
    assert!(lines[1].contains(r#""current_index":-1"#));

    let lines = d.raw("{\"action\":\"save-queue\",\"value\":[1,2]}\n", 1);
    assert!(lines[0].contains("invalid queue JSON: "));

    client.record_play("/m/1.mp3").unwrap();
    client.record_play("/m/1.mp3").unwrap();
    let stats = client.get_stats().unwrap();
    assert_eq!(stats.get("/m/1.mp3"), Some(&2));

    let lines = d.raw("{\"action\":\"get-play-stats\"}\n", 1);
    assert_eq!(lines[0], r#"{"ok":true,"stats":{"/m/1.mp3":2}}"#);
}

#[test]
fn cover_art_comes_from_the_extractor() {
    let d = start();
    let music = d.music_dir();
    let with_art = music.join("art.mp3");
    let without = music.join("plain.mp3");
    fs::write(&with_art, "artist=A\ncover=QUJD").unwrap();
    fs::write(&without, "artist=A").unwrap();

    let client = d.client();
    let art = client.get_cover_art(with_art.to_str().unwrap()).unwrap().unwrap();
    assert_eq!(art.data, "QUJD");
    assert_eq!(art.mime, "image/jpeg");
    assert!(client.get_cover_art(without.to_str().unwrap()).unwrap().is_none());

    let msg = server_error(client.get_cover_art("/definitely/not/here.mp3"));
    assert!(msg.starts_with("failed to extract cover art: "), "{msg}");
}

#[test]
fn start_replaces_stale_socket_and_stop_removes_it() {
    let root = tempdir().unwrap();
    let config = test_config(root.path());
    let sock = config.socket_path();
    fs::create_dir_all(sock.parent().unwrap()).unwrap();
    fs::write(&sock, "left over").unwrap();

    let daemon = Arc::new(
        Daemon::with_extractor(config, Arc::new(FakeExtractor::default())).unwrap(),
    );
    let mut handle = daemon.start().unwrap();

    let mode = fs::metadata(&sock).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
    assert!(is_running(&sock, DEFAULT_PROBE_TIMEOUT));

    handle.stop();
    assert!(!sock.exists());
    assert!(!is_running(&sock, DEFAULT_PROBE_TIMEOUT));
}

#[test]
fn one_client_can_be_shared_between_threads() {
    let d = start();
    let client = Arc::new(d.client());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    client.record_play(&format!("/m/{i}.mp3")).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let stats = client.get_stats().unwrap();
    assert_eq!(stats.len(), 4);
    assert!(stats.values().all(|&n| n == 10));
}

#[test]
fn second_daemon_leaves_a_live_socket_alone() {
    let d = start();
    let config = d.daemon.config().clone();
    let second = Arc::new(
        Daemon::with_extractor(config, Arc::new(FakeExtractor::default())).unwrap(),
    );
    let err = match second.start() {
        Err(e) => e,
        Ok(_) => panic!("two daemons bound the same socket"),
    };
    assert!(matches!(err, DaemonError::Bind { .. }));
    assert!(err.to_string().contains("already listening"));

    d.client().ping().unwrap();
}

#[test]
fn signal_stops_the_daemon_and_removes_the_socket() {
    use signal_hook::consts::SIGUSR2;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGUSR2]).unwrap();
    let Running {
        handle,
        daemon: _daemon,
        root: _root,
    } = start();
    let sock = handle.socket_path().to_path_buf();
    assert!(is_running(&sock, DEFAULT_PROBE_TIMEOUT));

    let sender = thread::spawn(|| {
        thread::sleep(Duration::from_millis(50));
        signal_hook::low_level::raise(SIGUSR2).unwrap();
    });
    assert_eq!(handle.stop_on_signal(&mut signals), Some(SIGUSR2));
    sender.join().unwrap();

    assert!(!sock.exists());
    assert!(!is_running(&sock, DEFAULT_PROBE_TIMEOUT));
}
