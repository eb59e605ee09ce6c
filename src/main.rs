//! Tab Islands - CLI entry point
//!
//! Inspects the state a browser profile persisted (groups, LRU order,
//! expanded groups) and manages the configuration file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tab_islands::config::{default, loader::ConfigLoader, schema::Config, xdg};
use tab_islands::persistence::{JsonFileStorage, Storage, EXPANSION_BLOB_KEY, LRU_BLOB_KEY};
use tab_islands::{expansion, logging, lru, Group};

/// Tab group and session navigation engine
#[derive(Parser)]
#[command(name = "islands")]
#[command(version, about = "Inspect tab-islands state and manage its configuration")]
struct Cli {
    /// Configuration file (defaults to the XDG location); also the target
    /// of `config init` and `config path`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the islands CLI
#[derive(Subcommand)]
enum Commands {
    /// List persisted groups (read-only)
    Groups {
        /// Data directory (overrides storage.data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the LRU navigation order, most recent first (read-only)
    Lru {
        /// Data directory (overrides storage.data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// List expanded group ids (read-only)
    Expanded {
        /// Data directory (overrides storage.data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Manage configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Actions for the `config` subcommand.
#[derive(Subcommand)]
enum ConfigAction {
    /// Create default configuration file
    Init {
        /// Overwrite existing configuration (creates backup)
        #[arg(long)]
        force: bool,
    },
    /// Show configuration file path
    Path,
    /// Validate configuration file
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => {
            let result = match action {
                ConfigAction::Init { force } => {
                    let path = cli.config.clone().unwrap_or_else(xdg::config_path);
                    default::create_default_config_at(&path, force).map(|()| {
                        println!("Created configuration at {}", path.display());
                    })
                }
                ConfigAction::Path => {
                    let path = cli.config.clone().unwrap_or_else(xdg::config_path);
                    println!("{}", path.display());
                    Ok(())
                }
                ConfigAction::Validate => load_config(cli.config.as_ref()).map(|config| {
                    println!("Configuration is valid");
                    println!("{config:#?}");
                }),
            };
            if let Err(e) = result {
                eprintln!("Config error: {e}");
                return ExitCode::FAILURE;
            }
        }
        Commands::Groups { data_dir, json } => {
            let Some(storage) = open_storage(cli.config.as_ref(), data_dir) else {
                return ExitCode::FAILURE;
            };
            match storage.load_groups() {
                Ok(tables) => print_groups(&tables.active_groups(), json),
                Err(e) => {
                    eprintln!("Storage error: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        Commands::Lru { data_dir } => {
            let Some(storage) = open_storage(cli.config.as_ref(), data_dir) else {
                return ExitCode::FAILURE;
            };
            match read_blob(&storage, LRU_BLOB_KEY, lru::decode_blob) {
                Ok(tabs) => {
                    if tabs.is_empty() {
                        println!("LRU queue is empty");
                    }
                    for (index, tab) in tabs.iter().enumerate() {
                        println!("{index:>3}  {tab}");
                    }
                }
                Err(message) => {
                    eprintln!("{message}");
                    return ExitCode::FAILURE;
                }
            }
        }
        Commands::Expanded { data_dir } => {
            let Some(storage) = open_storage(cli.config.as_ref(), data_dir) else {
                return ExitCode::FAILURE;
            };
            match read_blob(&storage, EXPANSION_BLOB_KEY, expansion::decode_blob) {
                Ok(ids) => {
                    if ids.is_empty() {
                        println!("No expanded groups");
                    }
                    for id in ids {
                        println!("{id}");
                    }
                }
                Err(message) => {
                    eprintln!("{message}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, tab_islands::config::error::ConfigError> {
    match path {
        Some(path) => ConfigLoader::load_from_path(path),
        None => ConfigLoader::load_default(),
    }
}

/// Loads config, initializes logging and opens the data directory for
/// reading. Nothing on disk is created or rewritten. Errors are printed;
/// `None` means the command should fail.
fn open_storage(config_path: Option<&PathBuf>, data_dir: Option<PathBuf>) -> Option<JsonFileStorage> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {e}");
            return None;
        }
    };
    logging::init(config.log.level);

    let dir = data_dir.unwrap_or_else(|| config.storage.data_dir_path());
    match JsonFileStorage::open_read_only(&dir) {
        Ok(storage) => Some(storage),
        Err(e) => {
            eprintln!("Storage error: {e}");
            None
        }
    }
}

fn read_blob<T: Default>(
    storage: &JsonFileStorage,
    key: &str,
    decode: impl FnOnce(&str) -> Result<T, serde_json::Error>,
) -> Result<T, String> {
    match storage.load_blob(key) {
        Ok(Some(json)) => decode(&json).map_err(|e| format!("Corrupt {key} blob: {e}")),
        Ok(None) => Ok(T::default()),
        Err(e) => Err(format!("Storage error: {e}")),
    }
}

fn print_groups(groups: &[Group], json: bool) {
    if json {
        match serde_json::to_string_pretty(groups) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("Failed to serialize groups: {e}"),
        }
        return;
    }
    if groups.is_empty() {
        println!("No groups");
        return;
    }
    for group in groups {
        let name = if group.name.is_empty() {
            "(unnamed)"
        } else {
            group.name.as_str()
        };
        println!(
            "{}  {:<7} {:<24} {} tab(s)  [{}]",
            group.id,
            group.color,
            name,
            group.len(),
            group.scope
        );
        for tab in &group.tab_ids {
            println!("    {tab}");
        }
    }
}
