//! autobaud CLI - find which serial device answers and at what baud rate.
//!
//! ## Features
//!
//! - List serial ports, filtered by manufacturer
//! - Brute-force baud rate search with a one-shot handshake
//! - JSON output for scripts
//! - Shell completion generation
//! - Environment variable and config file support
//! - Optional log file alongside stderr output

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use env_logger::Env;
use log::{debug, warn};
use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use commands::connect::ConnectOptions;
use config::{Config, ProbeOverrides};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if spinners should be drawn (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors that map to a specific process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid arguments or configuration (exit 2).
    #[error("{0}")]
    Usage(String),
    /// The search finished without a connection (exit 3).
    #[error("No device answered the handshake")]
    NotFound,
    /// The user interrupted the operation (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::NotFound => 3,
            Self::Cancelled(_) => 130,
        }
    }
}

/// autobaud - find the port and baud rate of attached serial devices.
///
/// Environment variables:
///   AUTOBAUD_MANUFACTURERS  - Comma-separated manufacturer allow-list
///   AUTOBAUD_BAUD           - Comma-separated baud rates to try
///   AUTOBAUD_TIMEOUT_MS     - Per-attempt read timeout in milliseconds
///   AUTOBAUD_LOG_FILE       - Also append log output to this file
#[derive(Parser)]
#[command(name = "autobaud")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Manufacturer allowed for probing (repeatable; default: wch.cn).
    #[arg(
        short,
        long = "manufacturer",
        global = true,
        value_delimiter = ',',
        env = "AUTOBAUD_MANUFACTURERS"
    )]
    manufacturers: Vec<String>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Also append log output to this file.
    #[arg(long, global = true, value_name = "PATH", env = "AUTOBAUD_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List serial ports from allowed manufacturers.
    ListPorts {
        /// Include ports from every manufacturer.
        #[arg(long)]
        all: bool,

        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Find the first device and baud rate that answer the handshake.
    Connect {
        /// Probe only this port (repeatable; bypasses the manufacturer filter).
        #[arg(short, long = "port")]
        ports: Vec<String>,

        /// Baud rate to try (repeatable or comma-separated).
        #[arg(
            short,
            long = "baud",
            value_delimiter = ',',
            env = "AUTOBAUD_BAUD",
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        bauds: Vec<u32>,

        /// Per-attempt read timeout in milliseconds.
        #[arg(
            long,
            env = "AUTOBAUD_TIMEOUT_MS",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        timeout_ms: Option<u64>,

        /// Handshake command (escapes: \n \r \t \\).
        #[arg(long = "command", value_name = "TEXT")]
        handshake: Option<String>,

        /// Search devices concurrently.
        #[arg(long)]
        parallel: bool,

        /// Output the outcome as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(log_level));
    builder
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        });

    let log_file_error = match cli.log_file.as_deref().map(open_log_file).transpose() {
        Ok(Some(file)) => {
            // File logs always carry timestamps
            builder
                .format_timestamp_millis()
                .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
            None
        },
        Ok(None) => None,
        Err(e) => Some(e),
    };
    builder.init();

    if let (Some(path), Some(e)) = (&cli.log_file, log_file_error) {
        warn!("Could not open log file {}: {e}", path.display());
    }

    debug!(
        "autobaud v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    autobaud::set_interrupt_checker(was_interrupted);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<CliError>()
                .map_or(1, CliError::exit_code);
            if !matches!(err.downcast_ref::<CliError>(), Some(CliError::NotFound)) {
                eprintln!("{} {err:#}", console::style("Error:").red().bold());
            }
            ExitCode::from(code)
        },
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Log sink that copies every record to stderr and to a file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { all, json } => {
            let allowed = config.allowed_manufacturers(&cli.manufacturers);
            commands::list_ports::cmd_list_ports(&allowed, *all, *json)
        },
        Commands::Connect {
            ports,
            bauds,
            timeout_ms,
            handshake,
            parallel,
            json,
        } => {
            let options = ConnectOptions {
                ports: ports.clone(),
                overrides: ProbeOverrides {
                    baud_rates: bauds.clone(),
                    timeout_ms: *timeout_ms,
                    command: handshake.clone(),
                },
                parallel: *parallel,
                json: *json,
            };
            commands::connect::cmd_connect(cli, &config, &options)
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}
