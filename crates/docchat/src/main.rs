//! # docchat CLI
//!
//! Command-line interface for docchat: chat with your PDFs.
//!
//! PDFs are split into chunks, embedded and stored in a local index. Questions
//! are answered by a language model grounded on the most relevant chunks,
//! with per-session conversation memory.
//!
//! ## Commands
//!
//! - `docchat ingest <PDF>...` - Add PDFs to the index
//! - `docchat ask <QUESTION>` - Ask a single question
//! - `docchat chat` - Interactive session
//! - `docchat status` - Show index statistics
//! - `docchat config {show|init|path}` - Manage configuration
//!
//! ## Examples
//!
//! ```bash
//! # Index a syllabus
//! docchat ingest ~/courses/syllabus.pdf
//!
//! # Ask about it (needs GROQ_API_KEY)
//! docchat ask "When is the final exam?"
//!
//! # Get JSON output
//! docchat status --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docchat_chat::{ConversationalPipeline, HistoryStore, OpenAiCompatModel};
use docchat_chunker::Segmenter;
use docchat_core::{Embedder, LanguageModel, VectorStore};
use docchat_extract::PdfLoader;
use docchat_index::{IndexBuilder, IngestInput, IngestUpdate};
use futures::StreamExt;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod config;
mod repl;

use config::{Config, cache_dir};

/// Session used when none is given.
const DEFAULT_SESSION: &str = "default";

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Chat with your PDF documents")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/docchat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Add PDF documents to the index
    Ingest {
        /// PDF files to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a single question
    Ask {
        /// Question text
        question: String,

        /// Conversation session id
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// Start an interactive chat session
    Chat {
        /// Conversation session id
        #[arg(short, long, default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// Show index status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for ingestion.
#[derive(Serialize)]
struct IngestOutput {
    files: Vec<IngestItem>,
    total_records: usize,
}

#[derive(Serialize)]
struct IngestItem {
    path: String,
    chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Output structure for a single answer.
#[derive(Serialize)]
struct AskOutput {
    session: String,
    question: String,
    answer: String,
    model: String,
}

/// Output structure for status.
#[derive(Serialize)]
struct StatusOutput {
    persist_directory: Option<String>,
    total_records: u64,
    total_sources: u64,
    dimension: usize,
    embedding_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

/// Shared components built from configuration.
pub(crate) struct Components {
    pub store: Arc<dyn VectorStore>,
    pub builder: IndexBuilder,
}

/// Build the embedder, the index and the ingestion pipeline.
pub(crate) async fn create_components(config: &Config) -> Result<Components> {
    let backend = config.backend()?;

    let models_dir = cache_dir()
        .context("Failed to get cache directory")?
        .join("models");
    info!(
        "Loading embedder {} (this may download the model on first run)...",
        config.rag.embedding_model_name
    );
    let embedder: Arc<dyn Embedder> =
        docchat_embed::create_embedder(&config.rag.embedding_model_name, models_dir)
            .await
            .context("Failed to initialize embedder")?;

    let persist_directory = config.persist_directory();
    let store = docchat_store::create_vector_store(backend, persist_directory, embedder.clone())
        .await
        .context("Failed to open index")?;

    let segmenter = Segmenter::from_config(&config.chunking, embedder)
        .context("Invalid chunking configuration")?;

    let builder = IndexBuilder::new(
        Arc::new(PdfLoader::new()),
        Arc::new(segmenter),
        store.clone(),
    );

    Ok(Components { store, builder })
}

/// Build the configured language model.
pub(crate) fn create_model(config: &Config) -> Result<OpenAiCompatModel> {
    let llm = &config.llm;
    let mut model = OpenAiCompatModel::from_env(&llm.base_url, &llm.api_key_env, &llm.model)
        .context("Failed to configure language model")?
        .with_streaming(llm.streaming);
    if let Some(temperature) = llm.temperature {
        model = model.with_temperature(temperature);
    }
    Ok(model)
}

/// Number of documents whose ingestion failed.
fn failed_count(files: &[IngestItem]) -> usize {
    files.iter().filter(|f| f.error.is_some()).count()
}

/// Build a pipeline over `store`.
pub(crate) fn create_pipeline(
    config: &Config,
    store: &Arc<dyn VectorStore>,
    model: Arc<dyn LanguageModel>,
) -> ConversationalPipeline {
    let retriever = store.as_retriever(config.search_config());
    ConversationalPipeline::new(retriever, model, Arc::new(HistoryStore::new()))
}

/// Log ingestion progress until the builder is dropped.
fn spawn_progress_logger(builder: &IndexBuilder) -> tokio::task::JoinHandle<()> {
    let mut updates = builder.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                IngestUpdate::Started { source } => info!("Ingesting {}", source),
                IngestUpdate::Ingested {
                    source,
                    chunk_count,
                } => info!("Ingested: {} ({} chunks)", source, chunk_count),
                IngestUpdate::Empty { source } => warn!("No text found in {}", source),
                IngestUpdate::Failed { source, error } => warn!("Error: {}: {}", source, error),
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.clone()).context("Failed to load config")?;

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Ingest { paths } => {
            let components = create_components(&config).await?;
            let progress = spawn_progress_logger(&components.builder);

            let mut files = Vec::with_capacity(paths.len());
            for path in paths {
                let display = path.display().to_string();
                match components.builder.ingest(IngestInput::Path(path)).await {
                    Ok(chunks) => files.push(IngestItem {
                        path: display,
                        chunks,
                        error: None,
                    }),
                    Err(e) => files.push(IngestItem {
                        path: display,
                        chunks: 0,
                        error: Some(e.to_string()),
                    }),
                }
            }

            let total_records = components.store.len().await;
            drop(components);
            let _ = progress.await;

            let failed = failed_count(&files);

            match cli.format {
                OutputFormat::Json => {
                    let output = IngestOutput {
                        files,
                        total_records,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    for file in &files {
                        match &file.error {
                            Some(error) => println!("FAILED  {}: {}", file.path, error),
                            None => println!("OK      {} ({} chunks)", file.path, file.chunks),
                        }
                    }
                    println!("\nIndex now holds {total_records} chunks.");
                }
            }

            if failed > 0 {
                anyhow::bail!("{failed} document(s) could not be ingested");
            }
        }

        Commands::Ask { question, session } => {
            // Credentials are checked before the embedder loads
            let model = Arc::new(create_model(&config)?);
            let components = create_components(&config).await?;
            if components.store.is_empty().await {
                warn!("The index is empty. Run 'docchat ingest <PDF>' first.");
            }

            let pipeline = create_pipeline(&config, &components.store, model);

            let mut fragments = pipeline.converse(session.clone(), question.clone());
            let mut answer = String::new();
            let mut stdout = std::io::stdout();
            while let Some(fragment) = fragments.next().await {
                if cli.format == OutputFormat::Text {
                    print!("{fragment}");
                    stdout.flush()?;
                }
                answer.push_str(&fragment);
            }

            match cli.format {
                OutputFormat::Json => {
                    let output = AskOutput {
                        session,
                        question,
                        answer,
                        model: pipeline.model_name(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => println!(),
            }
        }

        Commands::Chat { session } => {
            let model = create_model(&config)?;
            let components = create_components(&config).await?;
            let pipeline = create_pipeline(&config, &components.store, Arc::new(model.clone()));

            repl::run(repl::Repl::new(pipeline, components.builder, model, session)).await?;
        }

        Commands::Status => {
            let components = create_components(&config).await?;
            let stats = components.store.stats().await?;
            let persist_directory = config
                .persist_directory()
                .map(|p| p.to_string_lossy().to_string());

            match cli.format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        persist_directory,
                        total_records: stats.total_records,
                        total_sources: stats.total_sources,
                        dimension: stats.dimension,
                        embedding_model: stats.embedding_model,
                        last_updated: stats.last_updated.map(|t| t.to_rfc3339()),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!(
                        "Index Status ({})",
                        persist_directory.as_deref().unwrap_or("in memory")
                    );
                    println!("  Documents: {}", stats.total_sources);
                    println!("  Chunks:    {}", stats.total_records);
                    println!(
                        "  Embedder:  {} ({} dims)",
                        stats.embedding_model, stats.dimension
                    );
                    if let Some(last) = stats.last_updated {
                        println!("  Updated:   {}", last.format("%Y-%m-%d %H:%M:%S"));
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

/// Truncate a string to max characters, adding ellipsis if needed.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_len {
        s
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 100), "line one line two");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::parse_from(["docchat", "ask", "What is due?", "--session", "s1"]);
        match cli.command {
            Commands::Ask { question, session } => {
                assert_eq!(question, "What is due?");
                assert_eq!(session, "s1");
            }
            _ => panic!("expected ask"),
        }

        let cli = Cli::parse_from(["docchat", "--format", "json", "status"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_failed_count() {
        let item = |error: Option<&str>| IngestItem {
            path: "a.pdf".to_string(),
            chunks: 0,
            error: error.map(str::to_string),
        };
        assert_eq!(failed_count(&[]), 0);
        assert_eq!(failed_count(&[item(None), item(None)]), 0);
        assert_eq!(
            failed_count(&[item(None), item(Some("encrypted")), item(Some("not a pdf"))]),
            2
        );
    }

    #[test]
    fn test_create_model_requires_api_key() {
        let mut config = Config::default();
        config.llm.api_key_env = "DOCCHAT_TEST_UNSET_API_KEY".to_string();
        assert!(create_model(&config).is_err());
    }

    #[test]
    fn test_cli_ingest_requires_paths() {
        assert!(Cli::try_parse_from(["docchat", "ingest"]).is_err());
        let cli = Cli::try_parse_from(["docchat", "ingest", "a.pdf", "b.pdf"]).unwrap();
        assert!(matches!(cli.command, Commands::Ingest { paths } if paths.len() == 2));
    }
}
