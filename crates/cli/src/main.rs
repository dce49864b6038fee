//! ShadowBot CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Connect, start the worker and the operator console
//! - `init`    — Write a default config file
//! - `status`  — Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shadowbot_core::Behavior;

mod commands;

#[derive(Parser)]
#[command(
    name = "shadowbot",
    about = "ShadowBot — Shadowlamb automation over IRC",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file to use instead of ~/.shadowbot/config.toml
    #[arg(short, long, global = true, env = "SHADOWBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and start the bot
    Run {
        /// Behavior to start right away (getbacon, explore, escort)
        #[arg(short, long)]
        behavior: Option<Behavior>,

        /// Print worker events as JSON
        #[arg(long)]
        json_events: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            behavior,
            json_events,
        } => commands::run::run(config_path, behavior, json_events).await?,
        Commands::Init { force } => commands::init::run(config_path, force).await?,
        Commands::Status => commands::status::run(config_path).await?,
    }

    Ok(())
}
