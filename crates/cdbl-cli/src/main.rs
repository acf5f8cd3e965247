//! # cdbl
//!
//! Command-line front-end for the CDBL engine: single asset swaps, FastFlag
//! management with tracked, reversible changes, and the named fixes.

mod fix;
mod output;
mod status;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use cdbl_config::logging::{init_logging, LogLevel};
use cdbl_config::{log_cli_debug, Config};
use cdbl_engine::Engine;
use cdbl_flags::FlagSet;
use clap::{ArgAction, Parser, Subcommand};

use crate::fix::FixCommand;
use crate::output::emit;

#[derive(Parser)]
#[command(name = "cdbl")]
#[command(version, about = "Client asset cache swaps and FastFlag tracking", long_about = None)]
struct Cli {
    /// Config file layered over the global and project configs
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Client cache directory (overrides config and CDBL_CACHE_ROOT)
    #[arg(long, global = true, value_name = "DIR")]
    cache_root: Option<PathBuf>,

    /// Replacement assets directory (overrides config and CDBL_ASSETS_ROOT)
    #[arg(long, global = true, value_name = "DIR")]
    assets_root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace a cached asset with a prepared one, backing up the original
    Swap {
        /// Hash of the asset in the client cache
        original: String,
        /// Hash of the replacement in the assets directory
        replacement: String,
    },

    /// Swap if the target is cached, otherwise copy the replacement in
    Place {
        target: String,
        replacement: String,
    },

    /// Restore a cached asset from its backup
    RestoreAsset {
        hash: String,
    },

    /// Manage FastFlags in the client settings file
    Flags {
        #[command(subcommand)]
        command: FlagsCommand,
    },

    /// Apply, remove or inspect a named fix
    Fix {
        #[command(subcommand)]
        command: FixCommand,
    },

    /// Check cache, assets, settings and ledger health
    Status,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum FlagsCommand {
    /// Set flags, tracking them so they can be removed later
    Apply {
        #[arg(required = true, value_name = "NAME=VALUE", value_parser = parse_flag)]
        flags: Vec<(String, String)>,
    },

    /// Remove tracked flags by name, or every tracked flag
    Remove {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        names: Vec<String>,
        #[arg(long)]
        all: bool,
    },

    /// Put back the settings snapshot taken before the first change
    Restore,

    /// List flags applied by cdbl
    List {
        /// Show the whole live settings file instead
        #[arg(long)]
        live: bool,
    },

    /// Clear the read-only bit on the settings file
    Unlock,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Show config file locations
    Path,
}

fn parse_flag(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(match cli.verbose {
        0 => LogLevel::Warn,
        1 => LogLevel::Info,
        _ => LogLevel::Debug,
    });

    let config = load_config(&cli)?;
    log_cli_debug!("Config loaded", cache_root = %config.resolve_cache_root().display());

    let engine = Engine::new(config).context("Failed to initialise engine")?;
    dispatch(&engine, cli.command, cli.json, cli.config.as_deref())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_with(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(root) = &cli.cache_root {
        config.paths.cache_root = Some(root.clone());
    }
    if let Some(root) = &cli.assets_root {
        config.paths.assets_root = root.clone();
    }
    Ok(config)
}

fn dispatch(
    engine: &Engine,
    command: Commands,
    json: bool,
    explicit_config: Option<&Path>,
) -> Result<ExitCode> {
    let preview = engine.config().swap.error_preview;
    match command {
        Commands::Swap {
            original,
            replacement,
        } => emit(&engine.swap_asset(&original, &replacement), json, preview),
        Commands::Place {
            target,
            replacement,
        } => emit(&engine.place_asset(&target, &replacement), json, preview),
        Commands::RestoreAsset { hash } => emit(&engine.restore_asset(&hash), json, preview),
        Commands::Flags { command } => cmd_flags(engine, command, json, preview),
        Commands::Fix { command } => fix::run(engine, command, json),
        Commands::Status => status::cmd_status(engine, json),
        Commands::Config { command } => cmd_config(command, engine.config(), explicit_config),
    }
}

fn cmd_flags(engine: &Engine, command: FlagsCommand, json: bool, preview: usize) -> Result<ExitCode> {
    match command {
        FlagsCommand::Apply { flags } => {
            let flags: FlagSet = flags.into_iter().collect();
            emit(&engine.apply_fastflags(&flags), json, preview)
        }
        FlagsCommand::Remove { names, all } => {
            let names = if all { None } else { Some(names.as_slice()) };
            emit(&engine.remove_fastflags(names), json, preview)
        }
        FlagsCommand::Restore => emit(&engine.restore_original_settings(), json, preview),
        FlagsCommand::List { live: false } => emit(&engine.applied_fastflags(), json, preview),
        FlagsCommand::List { live: true } => emit(&engine.current_settings(), json, preview),
        FlagsCommand::Unlock => emit(&engine.unlock_settings(), json, preview),
    }
}

fn cmd_config(command: ConfigCommand, config: &Config, explicit: Option<&Path>) -> Result<ExitCode> {
    match command {
        ConfigCommand::Show => {
            let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{text}");
        }
        ConfigCommand::Path => {
            let marker = |p: &Path| if p.exists() { "" } else { " (not found)" };
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}{}", path.display(), marker(&path)),
                None => println!("Global:  (no home directory)"),
            }
            let project = Config::project_config_path();
            println!("Project: {}{}", project.display(), marker(&project));
            if let Some(path) = explicit {
                println!("Explicit: {}{}", path.display(), marker(path));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
