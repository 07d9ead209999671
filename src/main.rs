//! Rex-Proxy command line.
//!
//! # Architecture Overview
//!
//! ```text
//!   rex-proxy start ──spawn──▶ rex-proxy run (master) ──spawn × N──▶ rex-proxy worker --id N
//!        ▲                          │   ▲                                   │
//!        │  first IPC line          │   │  NDJSON on worker stdout          │ binds every instance
//!        └──────────────────────────┘   └───────────────────────────────────┘ (SO_REUSEPORT)
//!
//!   Request inside a worker:
//!     listener → axum → Cache → Static → Route → Upstream → Fallback → client
//! ```
//!
//! Logs go to stderr in every process; stdout carries IPC only.

use std::path::{Path, PathBuf};
use std::process::{ExitCode, Stdio};

use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use rex_proxy::config::load_config;
use rex_proxy::ipc::{ErrorInfo, InfoName, IpcMessage, IpcReader, IpcSender};
use rex_proxy::lifecycle::classify::startup_failed_message;
use rex_proxy::lifecycle::{pidfile, signals, worker, Supervisor, SupervisorOptions};
use rex_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "rex-proxy", version)]
#[command(about = "Multi-process HTTP/HTTPS reverse proxy", long_about = None)]
struct Cli {
    /// Where the master records its PID
    #[arg(long, global = true)]
    pid_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the master in the foreground
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Start the master in the background and wait until it is ready
    Start {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Stop a running master
    Stop {
        /// Signal this PID instead of the one in the pid file
        #[arg(long)]
        pid: Option<u32>,
    },
    /// Validate a configuration file
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Worker process entry point
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        id: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let pid_file = cli.pid_file.unwrap_or_else(pidfile::default_path);

    let code = match cli.command {
        Commands::Run { config } => run_master(&config, pid_file).await,
        Commands::Start { config } => start(&config, &pid_file).await,
        Commands::Stop { pid } => stop(pid, &pid_file),
        Commands::Check { config } => check(&config),
        Commands::Worker { id } => run_worker(id).await,
    };
    ExitCode::from(code)
}

async fn run_master(config_path: &Path, pid_file: PathBuf) -> u8 {
    let parent = IpcSender::stdout();
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(error) => {
            logging::init("info");
            tracing::error!(path = %config_path.display(), error = %error, "Failed to load configuration");
            let notice = ErrorInfo::new("ERR_CONFIG").with_message(startup_failed_message(&error.to_string()));
            let _ = parent.send(&IpcMessage::error(notice));
            return 1;
        }
    };
    logging::init(&config.observability.log_level);

    let program = match std::env::current_exe() {
        Ok(program) => program,
        Err(error) => {
            tracing::error!(error = %error, "Cannot locate own executable");
            return 1;
        }
    };

    let options = SupervisorOptions {
        program,
        config,
        pid_file: Some(pid_file),
        parent,
    };
    let result = match Supervisor::new(options) {
        Ok(supervisor) => supervisor.run().await,
        Err(error) => Err(error),
    };
    match result {
        Ok(code) => u8::try_from(code).unwrap_or(1),
        Err(error) => {
            tracing::error!(error = %error, "Master failed");
            1
        }
    }
}

async fn start(config_path: &Path, pid_file: &Path) -> u8 {
    logging::init("info");
    let program = match std::env::current_exe() {
        Ok(program) => program,
        Err(error) => {
            eprintln!("Cannot locate own executable: {}", error);
            return 1;
        }
    };

    let mut command = tokio::process::Command::new(program);
    command
        .arg("--pid-file")
        .arg(pid_file)
        .arg("run")
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            eprintln!("Failed to start Rex-Proxy: {}", error);
            return 1;
        }
    };

    let Some(stdout) = child.stdout.take() else {
        eprintln!("Failed to start Rex-Proxy: no output channel");
        return 1;
    };
    let mut reader = IpcReader::new(BufReader::new(stdout));

    match reader.next_message().await {
        Ok(Some(IpcMessage::Info { name: InfoName::Ready, .. })) => {
            println!("Rex-Proxy started (pid {})", child.id().unwrap_or_default());
            0
        }
        Ok(Some(IpcMessage::Error { data })) => {
            eprintln!("{}", data.message.unwrap_or(data.code));
            1
        }
        Ok(Some(other)) => {
            eprintln!("Unexpected startup message: {:?}", other);
            1
        }
        Ok(None) => {
            eprintln!("Rex-Proxy exited before it was ready");
            1
        }
        Err(error) => {
            eprintln!("Failed to read startup status: {}", error);
            1
        }
    }
}

fn stop(pid: Option<u32>, pid_file: &Path) -> u8 {
    let recorded = match pid {
        Some(pid) => Some(pid),
        None => match pidfile::read(pid_file) {
            Ok(pid) => pid,
            Err(error) => {
                eprintln!("Cannot read {}: {}", pid_file.display(), error);
                return 1;
            }
        },
    };

    let Some(pid) = recorded else {
        println!("Rex-Proxy is not running");
        return 0;
    };

    let code = match signals::send_sigterm(pid) {
        Ok(()) => {
            println!("Rex-Proxy stopped (pid {})", pid);
            0
        }
        Err(error) if error.raw_os_error() == Some(libc::ESRCH) => {
            println!("Invalid process id {}", pid);
            1
        }
        Err(error) => {
            eprintln!("Failed to stop pid {}: {}", pid, error);
            1
        }
    };
    if let Err(error) = pidfile::clear(pid_file) {
        eprintln!("Cannot clear {}: {}", pid_file.display(), error);
    }
    code
}

fn check(config_path: &Path) -> u8 {
    match load_config(config_path) {
        Ok(config) => {
            println!(
                "Configuration OK: {} instance(s), {} upstream(s), {} worker(s)",
                config.server.instances.len(),
                config.upstream.len(),
                config.workers.resolve()
            );
            0
        }
        Err(error) => {
            eprintln!("Configuration invalid: {}", error);
            1
        }
    }
}

async fn run_worker(id: u32) -> u8 {
    let ipc = IpcSender::stdout();
    worker::install_panic_hook(ipc.clone());

    let config = match worker::read_config(tokio::io::stdin()).await {
        Ok(config) => config,
        Err(error) => {
            logging::init("info");
            tracing::error!(worker = id, error = %error, "Worker could not read its configuration");
            let _ = ipc.send(&IpcMessage::error(error.to_error_info()));
            return 1;
        }
    };
    logging::init(&config.observability.log_level);
    tracing::info!(worker = id, pid = std::process::id(), "Worker process started");

    u8::try_from(worker::run(id, config, ipc).await).unwrap_or(1)
}
