//! scoreboard-reader - Scoreboard screenshot recognition CLI
//!
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scoreboard_reader::app::{fingerprint_file, ScoreboardReader};
use scoreboard_reader::config::{self, AppConfig};
use scoreboard_reader::storage::{self, ImageHash, ImageHashSet};
use scoreboard_reader::vision::dhash::DEFAULT_HASH_SIZE;

/// Read stats out of scoreboard screenshots
#[derive(Parser, Debug)]
#[command(name = "scoreboard-reader")]
#[command(about = "Region-based scoreboard screenshot recognition")]
struct Args {
    /// Configuration file (default: config.toml in the config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recognize a screenshot and print the result as JSON
    Recognize {
        image: PathBuf,
        /// Profile id (default: the active profile)
        #[arg(short, long)]
        profile: Option<String>,
        /// Print single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Manage region profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    /// Print the dHash of an image (e.g. a cropped portrait)
    Hash {
        image: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_HASH_SIZE)]
        size: u32,
        /// Print a single-entry hash set under this name instead
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Export or import a profile's hash sets
    Hashes {
        #[command(subcommand)]
        action: HashesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// List stored profiles
    List,
    /// Print a profile's regions, optionally scaled to an image size
    Show {
        id: String,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    /// Make a profile active
    Activate { id: String },
    /// Delete a profile
    Delete { id: String },
    /// Export a profile
    Export {
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import an exported profile
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum HashesCommand {
    /// Export one hash set of a profile
    Export {
        profile: String,
        set: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import an exported hash set into a profile
    Import { profile: String, file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Hashing needs neither the store nor the OCR backend
    if let Command::Hash { image, size, name } = &args.command {
        return print_hash(image, *size, name.as_deref());
    }

    let config = load_or_create_config(args.config.as_deref())?;
    let reader = ScoreboardReader::new(&config)?;

    match args.command {
        Command::Recognize {
            image,
            profile,
            compact,
        } => {
            let output = reader.recognize_file(&image, profile.as_deref()).await?;
            let json = if compact {
                serde_json::to_string(&output)?
            } else {
                serde_json::to_string_pretty(&output)?
            };
            println!("{}", json);
        }
        Command::Profiles { action } => run_profile_command(&reader, action)?,
        Command::Hashes { action } => run_hashes_command(&reader, action)?,
        Command::Hash { .. } => {}
    }

    Ok(())
}

fn run_profile_command(reader: &ScoreboardReader, action: ProfileCommand) -> Result<()> {
    let store = reader.store();

    match action {
        ProfileCommand::List => {
            println!("{}", serde_json::to_string_pretty(&store.list()?)?);
        }
        ProfileCommand::Show { id, width, height } => match store.get(&id, width, height)? {
            Some(regions) => println!("{}", serde_json::to_string_pretty(&regions)?),
            None => bail!("Profile {} does not exist", id),
        },
        ProfileCommand::Activate { id } => {
            if !store.set_active(&id)? {
                bail!("Profile {} does not exist", id);
            }
            info!("Active profile: {}", id);
        }
        ProfileCommand::Delete { id } => {
            if !store.delete(&id)? {
                bail!("Profile {} does not exist", id);
            }
        }
        ProfileCommand::Export { id, output } => match store.export(&id)? {
            Some(json) => write_output(&json, output.as_deref())?,
            None => bail!("Profile {} does not exist", id),
        },
        ProfileCommand::Import { file } => {
            let json = read_input(&file)?;
            match store.import(&json)? {
                Some(count) => info!("Imported profile ({} profiles stored)", count),
                None => bail!("{:?} is not a valid profile export", file),
            }
        }
    }

    Ok(())
}

fn run_hashes_command(reader: &ScoreboardReader, action: HashesCommand) -> Result<()> {
    let store = reader.store();

    match action {
        HashesCommand::Export { profile, set, output } => match store.export_hash_set(&profile, &set)? {
            Some(json) => write_output(&json, output.as_deref())?,
            None => bail!("Profile {} has no hash set {}", profile, set),
        },
        HashesCommand::Import { profile, file } => {
            let json = read_input(&file)?;
            match store.import_hash_set(&profile, &json)? {
                Some(count) => info!("Imported hash set ({} sets in {})", count, profile),
                None => bail!("Could not import {:?} into profile {}", file, profile),
            }
        }
    }

    Ok(())
}

fn print_hash(image: &Path, size: u32, name: Option<&str>) -> Result<()> {
    if size == 0 {
        bail!("Hash size must be at least 1");
    }
    let hash = fingerprint_file(image, size)?;

    match name {
        Some(name) => {
            let now = Utc::now();
            let set = ImageHashSet {
                id: name.to_string(),
                description: format!("Fingerprint of {}", image.display()),
                hashes: vec![ImageHash::new(name, hash)],
                created_at: now,
                updated_at: now,
            };
            println!("{}", serde_json::to_string_pretty(&set)?);
        }
        None => println!("{}", hash),
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn write_output(json: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Load configuration from file or create default
fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => tracing::warn!("Ignoring invalid configuration: {:#}", e),
            }
        } else if let Err(e) = config::save_config(&AppConfig::default(), &config_path) {
            tracing::warn!("Could not write default configuration: {:#}", e);
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}
