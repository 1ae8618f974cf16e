//! Workwise CLI - command-line front end for the Workwise facility dashboard.
//!
//! Logs in against the backend, keeps the session tokens on disk, and runs
//! CRUD commands for departments, machines and related resources.

mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, warn};
use workwise_core::Config;

use cli::Cli;
use commands::App;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({:#}), using defaults", e);
            Config::default()
        }
    };

    let log_dir = config.cache_dir().ok().map(|dir| dir.join("logs"));
    let log_guard = logging::init_tracing(log_dir.as_deref());
    debug!(command = ?cli.command, "Workwise CLI starting");

    let mut app = App::new(config, cli.api_url)?;
    if let Err(e) = commands::run(&mut app, cli.command).await {
        warn!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        // exit() skips destructors; flush the log file first.
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}
