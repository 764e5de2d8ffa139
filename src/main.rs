use std::fs::{self, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use prestod::cache::CachedLibrary;
use prestod::client::{self, Client};
use prestod::{Config, Daemon, logging, paths};

#[derive(Parser)]
#[command(name = "prestod", version)]
#[command(about = "Music library service for presto front-ends", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service in the foreground
    Serve,
    /// Run the service in the background
    Start,
    /// Report whether the service is up
    Status,
    /// Check that the service answers requests
    Ping,
    /// Rescan a directory and print a summary
    Scan {
        /// Music directory
        dir: PathBuf,
    },
    /// Print a summary of a directory's library, scanning only if needed
    Library {
        /// Music directory
        dir: PathBuf,
    },
    /// Print the most played files
    Stats {
        /// How many entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = Config::load_validated();
    let config = loaded.as_ref().cloned().unwrap_or_default();
    logging::init(&config.log.filter, cli.verbose);
    if let Err(e) = &loaded {
        warn!("{e}; using defaults");
    }

    match cli.command {
        Commands::Serve => serve(config)?,
        Commands::Start => start(&config, cli.verbose)?,
        Commands::Status => {
            let socket = config.socket_path();
            if client::is_running(&socket, config.probe_timeout()) {
                println!("prestod is running on {}", socket.display());
            } else {
                println!("prestod is not running");
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Ping => {
            connect(&config)?.ping()?;
            println!("pong");
        }
        Commands::Scan { dir } => {
            let lib = connect(&config)?.scan(&dir)?;
            print_summary(&lib);
        }
        Commands::Library { dir } => {
            let lib = connect(&config)?.get_library(&dir)?;
            print_summary(&lib);
        }
        Commands::Stats { limit } => {
            let stats = connect(&config)?.get_stats()?;
            let mut ranked: Vec<_> = stats.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (path, plays) in ranked.into_iter().take(limit) {
                println!("{plays:>6}  {path}");
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn connect(config: &Config) -> anyhow::Result<Client> {
    Client::from_config(config).context("is the service started? try `prestod start`")
}

/// Run until SIGINT or SIGTERM, then remove the socket and our pid file.
fn serve(config: Config) -> anyhow::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("cannot install signal handlers")?;
    let daemon = Arc::new(Daemon::new(config).context("cannot set up the service")?);
    let handle = daemon.start()?;
    info!("prestod {} ready", env!("CARGO_PKG_VERSION"));
    handle.stop_on_signal(&mut signals);
    remove_pid_file();
    Ok(())
}

/// The pid file is written by `start`; leave it alone if it names someone else.
fn remove_pid_file() {
    let path = paths::pid_path();
    let ours = fs::read_to_string(&path)
        .map(|pid| pid.trim() == std::process::id().to_string())
        .unwrap_or(false);
    if !ours {
        return;
    }
    if let Err(e) = fs::remove_file(&path) {
        warn!("could not remove {}: {e}", path.display());
    }
}

/// Re-run this executable as `serve` in its own process group, output going
/// to the log file.
fn start(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let socket = config.socket_path();
    if client::is_running(&socket, config.probe_timeout()) {
        println!("prestod is already running on {}", socket.display());
        return Ok(());
    }

    let log_path = paths::log_path();
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("cannot open {}", log_path.display()))?;

    let exe = std::env::current_exe().context("cannot locate the prestod executable")?;
    let mut cmd = Command::new(exe);
    cmd.arg("serve");
    if verbose {
        cmd.arg("--verbose");
    }
    let child = cmd
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log)
        .process_group(0)
        .spawn()
        .context("cannot spawn the service")?;

    paths::runtime_dir().context("cannot create the runtime directory")?;
    let pid_path = paths::pid_path();
    fs::write(&pid_path, format!("{}\n", child.id()))
        .with_context(|| format!("cannot write {}", pid_path.display()))?;

    if !wait_until_up(&socket, config.connect_timeout()) {
        bail!(
            "service did not come up within {} ms, see {}",
            config.connect_timeout().as_millis(),
            log_path.display()
        );
    }
    println!("prestod started (pid {}), logging to {}", child.id(), log_path.display());
    Ok(())
}

fn wait_until_up(socket: &Path, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if client::is_running(socket, Duration::from_millis(100)) {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

fn print_summary(lib: &CachedLibrary) {
    println!("{}", lib.dir.display());
    println!("  scanned {}", lib.scan_time.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "  {} tracks, {} artists, {} albums, {} genres, {} composers",
        lib.file_count,
        lib.artists.len(),
        lib.albums.len(),
        lib.genres.len(),
        lib.composers.len()
    );
    if !lib.errors.is_empty() {
        println!("  {} files could not be read:", lib.errors.len());
        for e in &lib.errors {
            println!("    {e}");
        }
    }
}
