//! WhereIsIt CLI - Command-line client for the lost-and-found service
//!
//! Provides commands for:
//! - Registering, signing in and signing out
//! - Browsing lost and found items
//! - Posting, editing and deleting your own items
//! - Claiming an item
//! - Viewing the profile, its counters and recovery records
//! - Inspecting the configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use whereisit_core::config::Config;

mod app;
mod commands;
mod output;

use commands::{
    auth::AuthCommand, claim::ClaimCommand, completions::CompletionsCommand,
    config::ConfigCommand, items::ItemsCommand, profile::ProfileCommand,
    profile::RecoveriesCommand,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "whereisit", version, about = "Lost and found, from the terminal")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Account commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Browse, post and edit items
    #[command(subcommand)]
    Items(ItemsCommand),
    /// Claim an item as yours, or as found by you
    Claim(ClaimCommand),
    /// Show your profile and counters
    Profile(ProfileCommand),
    /// List recovery records
    Recoveries(RecoveriesCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Loads the file named by `--config`, or the default file if present
fn load_config(path: Option<&PathBuf>) -> Result<(Config, PathBuf)> {
    let (config, path) = match path {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            (config, path.clone())
        }
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path), path)
        }
    };
    Ok((config.with_env_overrides(), path))
}

fn init_tracing(verbose: u8, config: &Config) {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    if let Err(e) = run(cli, format).await {
        get_formatter(format == OutputFormat::Json).error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, format: OutputFormat) -> Result<()> {
    let (config, config_path) = load_config(cli.config.as_ref())?;
    init_tracing(cli.verbose, &config);

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config, &config_path, format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
        command => {
            let app = app::App::start(&config).await?;
            let result = match command {
                Commands::Auth(cmd) => cmd.execute(&app, format).await,
                Commands::Items(cmd) => cmd.execute(&app, format).await,
                Commands::Claim(cmd) => cmd.execute(&app, format).await,
                Commands::Profile(cmd) => cmd.execute(&app, format).await,
                Commands::Recoveries(cmd) => cmd.execute(&app, format).await,
                Commands::Config(_) | Commands::Completions(_) => Ok(()),
            };
            app.shutdown().await;
            result
        }
    }
}
