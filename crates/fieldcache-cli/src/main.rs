//! fieldcache - keeps 121 program data and the web application usable offline.
//!
//! Commands log in to a 121 server, sync a program's registrations into the
//! local record store, and run requests through the offline interceptor.

mod app;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, ConfigChanges};

#[derive(Debug, Parser)]
#[command(name = "fieldcache", version, about = "Offline support for 121 programs")]
struct Cli {
    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "FIELDCACHE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show or change the configuration
    Config {
        /// Base URL of the 121 server
        #[arg(long)]
        url121: Option<String>,
        /// Verify TLS certificates of the 121 server
        #[arg(long)]
        verify_tls: Option<bool>,
        /// URL of the web application whose requests are intercepted
        #[arg(long)]
        app_url: Option<String>,
        /// Verify TLS certificates of the web application
        #[arg(long)]
        app_verify_tls: Option<bool>,
        /// Static asset path to precache on install (repeatable)
        #[arg(long = "precache")]
        precache: Vec<String>,
    },
    /// Log in to the 121 server
    Login {
        #[arg(long, env = "FIELDCACHE_USERNAME")]
        username: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Forget the session and any remembered password
    Logout,
    /// List accessible programs
    Programs,
    /// Select the program to sync
    Select { program_id: i64 },
    /// Sync a program's records into the local store
    Sync {
        #[arg(long)]
        program: Option<i64>,
    },
    /// Print the locally stored records of a program
    Records {
        #[arg(long)]
        program: Option<i64>,
    },
    /// Precache the shell page and static assets, dropping old caches
    Install,
    /// Run one request through the offline interceptor
    Fetch {
        /// Absolute URL or path relative to the app URL
        url: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Behave as if the network were down
        #[arg(long)]
        offline: bool,
    },
    /// Show configuration, session and stored programs
    Status,
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fieldcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref());
    info!(command = ?cli.command, "fieldcache starting");

    match cli.command {
        Command::Config {
            url121,
            verify_tls,
            app_url,
            app_verify_tls,
            precache,
        } => App::configure(ConfigChanges {
            url121,
            verify_tls,
            app_url,
            app_verify_tls,
            precache,
        }),
        Command::Login { username, remember } => App::new()?.login(username, remember).await,
        Command::Logout => App::new()?.logout(),
        Command::Programs => App::new()?.programs().await,
        Command::Select { program_id } => App::new()?.select(program_id),
        Command::Sync { program } => App::new()?.sync(program).await,
        Command::Records { program } => App::new()?.records(program),
        Command::Install => App::new()?.install().await,
        Command::Fetch {
            url,
            navigate,
            method,
            offline,
        } => App::new()?.fetch(&url, navigate, &method, offline).await,
        Command::Status => App::new()?.status(),
    }
}
