//! `chx ask` and `chx chat`: ingest a corpus, then answer questions.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use chat_harness::config::Config;
use chat_harness::connector_azure::{self, StorageSettings};
use chat_harness::embedding::create_embedder;
use chat_harness::ingest::{build_chunks, expand_paths};
use chat_harness::llm::LlmConnector;
use chat_harness::models::{SourceSnippet, Turn};
use chat_harness::session::{AskResponse, ChatSession, Providers};

const HELP: &str = "Commands: /reset  /history  /sources  /reload  /quit";

fn providers(config: &Config) -> Result<Providers> {
    let llm: Arc<dyn LlmConnector> = Arc::new(config.llm.clone());
    Ok(Providers {
        embedder: create_embedder(&config.embedding)?,
        llm,
        top_k: config.retrieval.top_k,
    })
}

/// Read the local paths (or the whole container when none are given),
/// chunk them and ingest into `session`.
async fn load_session(
    config: &Config,
    local: &[PathBuf],
    providers: &Providers,
    session: &mut ChatSession,
) -> Result<()> {
    let chunks = if local.is_empty() {
        let settings = StorageSettings::from_config(&config.storage)?;
        let batch = connector_azure::fetch_all(&settings).await?;
        println!(
            "Downloaded {} files from container '{}'",
            batch.paths.len(),
            settings.container
        );
        build_chunks(&batch.paths, &config.chunking)?
    } else {
        let paths = expand_paths(local)?;
        info!(files = paths.len(), "reading local files");
        build_chunks(&paths, &config.chunking)?
    };

    let report = session.ingest(chunks, providers).await?;
    println!("{}", report.message);
    Ok(())
}

fn print_sources(sources: &[SourceSnippet], preview_chars: usize) {
    for (i, source) in sources.iter().enumerate() {
        println!("Source {} (score {:.3}):", i + 1, source.score);
        println!("{}", source.preview(preview_chars));
        println!("---");
    }
}

fn print_answer(response: &AskResponse, preview_chars: usize) {
    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!();
        print_sources(&response.sources, preview_chars);
    }
}

fn print_transcript(transcript: &[Turn]) {
    if transcript.is_empty() {
        println!("(no messages yet)");
    }
    for turn in transcript {
        println!("{}: {}", turn.speaker.label(), turn.content);
    }
}

pub async fn run_ask(config: &Config, question: &str, local: &[PathBuf]) -> Result<()> {
    let providers = providers(config)?;
    let mut session = ChatSession::new();
    load_session(config, local, &providers, &mut session).await?;

    let response = session.ask(question).await?;
    print_answer(&response, config.retrieval.source_preview_chars);
    Ok(())
}

pub async fn run_chat(config: &Config, local: &[PathBuf]) -> Result<()> {
    let providers = providers(config)?;
    let mut session = ChatSession::new();
    load_session(config, local, &providers, &mut session).await?;

    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!("{}", HELP);
    }

    let preview_chars = config.retrieval.source_preview_chars;
    let mut last_sources: Vec<SourceSnippet> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush().context("Failed to flush stdout")?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/reset" => {
                if session.reset() {
                    last_sources.clear();
                    println!("Chat history cleared!");
                } else {
                    println!("No chat history to clear");
                }
            }
            "/history" => print_transcript(session.transcript()),
            "/sources" => {
                if last_sources.is_empty() {
                    println!("(no sources yet)");
                }
                print_sources(&last_sources, preview_chars);
            }
            "/reload" => {
                last_sources.clear();
                if let Err(e) = load_session(config, local, &providers, &mut session).await {
                    eprintln!("Error: {:#}", e);
                }
            }
            question => match session.ask(question).await {
                Ok(response) => {
                    print_answer(&response, preview_chars);
                    last_sources = response.sources;
                }
                Err(e) => eprintln!("Error: {}", e),
            },
        }
    }

    Ok(())
}
