//! # Chat Harness CLI (`chx`)
//!
//! ## Usage
//!
//! ```bash
//! chx --config ./chx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chx status` | Show effective settings and required environment variables |
//! | `chx extract <file>...` | Print the extracted text of each file |
//! | `chx chunks <path>...` | Assemble and split files, print the chunks |
//! | `chx fetch` | Download the container into a local directory |
//! | `chx push <path>...` | Upload files to the container |
//! | `chx ask "<question>"` | Ingest, then answer one question |
//! | `chx chat` | Ingest, then chat interactively |
//!
//! `ask` and `chat` read `--local` paths when given and download the
//! configured container otherwise.

mod chat_cmd;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chat_harness::config;
use chat_harness::connector_azure::{self, guess_content_type, StorageSettings};
use chat_harness::extract::extract;
use chat_harness::ingest::{block_delimiter, build_chunks, expand_paths};

const DEFAULT_CONFIG: &str = "./chx.toml";

/// Chat Harness: ask questions about your documents.
#[derive(Parser)]
#[command(
    name = "chx",
    about = "Chat with documents from local disk or Azure Blob Storage",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./chx.toml`; built-in defaults apply when that file
    /// does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show effective settings and which environment variables are set.
    Status,

    /// Print the text extracted from each file.
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Assemble files (directories are walked) and print the chunks.
    Chunks {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Characters of each chunk to print.
        #[arg(long, default_value_t = 200)]
        preview: usize,
    },

    /// Download every blob in the container.
    Fetch {
        /// Target directory (default: a new directory under the system temp dir).
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Upload files to the container, named by their base name.
    Push {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Content type for every file (default: guessed from the extension).
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Ingest documents and answer a single question.
    Ask {
        question: String,

        /// Local files or directories to use instead of the container.
        #[arg(long)]
        local: Vec<PathBuf>,
    },

    /// Ingest documents and start an interactive chat.
    Chat {
        /// Local files or directories to use instead of the container.
        #[arg(long)]
        local: Vec<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,chat_harness=debug,chx=debug"
    } else {
        "warn,chat_harness=info,chx=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (config_path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let cfg = config::load_or_default(&config_path, required)?;

    match cli.command {
        Commands::Status => {
            status::run_status(&cfg)?;
        }
        Commands::Extract { files } => {
            let blocks: Vec<String> = files.iter().map(|f| extract(f)).collect();
            println!("{}", blocks.join(&block_delimiter()));
        }
        Commands::Chunks { paths, preview } => {
            let files = expand_paths(&paths)?;
            let chunks = build_chunks(&files, &cfg.chunking)?;
            println!("{} chunks from {} files", chunks.len(), files.len());
            for chunk in &chunks {
                let text: String = chunk.text.chars().take(preview).collect();
                println!(
                    "\n--- chunk {} ({} chars) ---\n{}",
                    chunk.index,
                    chunk.text.chars().count(),
                    text
                );
            }
        }
        Commands::Fetch { dest } => {
            let settings = StorageSettings::from_config(&cfg.storage)?;
            let dir = match dest {
                Some(dir) => dir,
                None => std::env::temp_dir()
                    .join(format!("chx-fetch-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"))),
            };
            std::fs::create_dir_all(&dir)?;
            let paths = connector_azure::fetch_into(&settings, &dir).await?;
            println!("Downloaded {} files to {}", paths.len(), dir.display());
            for path in paths {
                println!("- {}", path.display());
            }
        }
        Commands::Push {
            paths,
            content_type,
        } => {
            let settings = StorageSettings::from_config(&cfg.storage)?;
            let files: Vec<(PathBuf, String)> = expand_paths(&paths)?
                .into_iter()
                .map(|p| {
                    let ct = content_type
                        .clone()
                        .unwrap_or_else(|| guess_content_type(&p).to_string());
                    (p, ct)
                })
                .collect();

            let report = connector_azure::push(&settings, &files).await?;
            if report.created_container {
                println!("Created container: {}", settings.container);
            } else {
                println!("Using existing container: {}", settings.container);
            }
            println!(
                "Uploaded {} files ({} skipped, {} failed)",
                report.uploaded.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for (name, err) in &report.failed {
                println!("  failed: {}: {}", name, err);
            }
        }
        Commands::Ask { question, local } => {
            chat_cmd::run_ask(&cfg, &question, &local).await?;
        }
        Commands::Chat { local } => {
            chat_cmd::run_chat(&cfg, &local).await?;
        }
    }

    Ok(())
}
