use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prefvault::{AnswerArchive, ConfigManager, HashEmbedder, Metadata, VectorStore};
use serde_json::Value;
use std::path::PathBuf;

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(name = "prefvault", version, about = "Preference answer vector store")]
struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed an answer and store it
    Store {
        /// Question the answer belongs to
        #[arg(short, long)]
        question: String,
        /// Answer text
        text: String,
        /// Extra metadata as key=value (value parsed as JSON when possible)
        #[arg(short, long = "meta", value_parser = parse_meta_pair)]
        meta: Vec<(String, Value)>,
    },
    /// Find stored answers similar to the given text
    Search {
        text: String,
        /// Number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },
    /// Show metadata for a stored vector
    Get { id: String },
    /// Show store statistics
    Stats,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration
    Show,
}

fn parse_meta_pair(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err("metadata key must not be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

/// JSON envelope for non-interactive output
fn json_output(success: bool, data: Value, error: Option<&str>) -> String {
    serde_json::json!({
        "success": success,
        "data": data,
        "error": error,
    })
    .to_string()
}

fn main() -> Result<()> {
    // Check for --json flag before initializing logging
    let json_mode = std::env::args().any(|arg| arg == "--json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("prefvault=info"));

    if json_mode {
        // Keep stdout clean for the JSON envelope
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    } else if std::env::var("PREFVAULT_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }

    let cli = Cli::parse();

    if let Err(e) = run_command(cli.command, cli.config, cli.json) {
        if cli.json {
            println!("{}", json_output(false, Value::Null, Some(&format!("{:#}", e))));
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Command Runner
// ============================================================================

fn load_config(path: Option<PathBuf>) -> Result<ConfigManager> {
    let manager = match path {
        Some(path) => ConfigManager::load_from(path)?,
        None => ConfigManager::new()?,
    };
    Ok(manager)
}

fn open_archive(manager: &ConfigManager) -> Result<AnswerArchive<HashEmbedder>> {
    let vector = &manager.get().vector;
    let store = VectorStore::open(vector).context("Failed to open vector store")?;
    let embedder = HashEmbedder::new(vector.dimension)?;
    Ok(AnswerArchive::new(store, embedder)?)
}

fn run_command(command: Commands, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let manager = load_config(config_path)?;

    match command {
        Commands::Store {
            question,
            text,
            meta,
        } => {
            let mut archive = open_archive(&manager)?;
            let extra: Metadata = meta.into_iter().collect();
            let id = archive.store_answer_with(&question, &text, extra)?;

            if json_mode {
                println!("{}", json_output(true, serde_json::json!({ "id": id }), None));
            } else {
                println!("{}", id);
            }
        }
        Commands::Search { text, top_k } => {
            let archive = open_archive(&manager)?;
            let results = archive.similar_answers(&text, top_k)?;

            if json_mode {
                println!("{}", json_output(true, serde_json::to_value(&results)?, None));
            } else if results.is_empty() {
                println!("No stored answers");
            } else {
                for result in &results {
                    println!(
                        "{:.4}  {}  {}",
                        result.score,
                        result.id,
                        Value::Object(result.metadata.clone())
                    );
                }
            }
        }
        Commands::Get { id } => {
            let archive = open_archive(&manager)?;
            match archive.store().get(&id) {
                Some(metadata) => {
                    if json_mode {
                        println!("{}", json_output(true, Value::Object(metadata), None));
                    } else {
                        println!("{}", serde_json::to_string_pretty(&metadata)?);
                    }
                }
                None => {
                    if json_mode {
                        println!("{}", json_output(false, Value::Null, Some("not found")));
                    } else {
                        eprintln!("{}: not found", id);
                    }
                    std::process::exit(1);
                }
            }
        }
        Commands::Stats => {
            let archive = open_archive(&manager)?;
            let stats = archive.store().stats();

            if json_mode {
                println!("{}", json_output(true, serde_json::to_value(&stats)?, None));
            } else {
                println!("Vector store: {}", stats.storage_dir.display());
                println!("  Vectors: {}", stats.vectors);
                println!("  Dimension: {}", stats.dimension);
                println!("  Index size: {} bytes", stats.index_bytes);
                println!("  Metadata size: {} bytes", stats.metadata_bytes);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                if json_mode {
                    let storage_dir = manager.get().vector.resolve_storage_dir()?;
                    let data = serde_json::json!({
                        "path": manager.config_path(),
                        "config": manager.get(),
                        "storage_dir": storage_dir,
                    });
                    println!("{}", json_output(true, data, None));
                } else {
                    println!("# {}", manager.config_path().display());
                    println!("{}", toml::to_string_pretty(manager.get())?);
                }
            }
        },
    }

    Ok(())
}
