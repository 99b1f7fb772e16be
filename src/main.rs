//! # askdoc CLI
//!
//! The `askdoc` binary builds the index for a document and answers
//! questions about it, one-shot, interactively, or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! askdoc --config ./config/askdoc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdoc build` | Chunk, embed, and index the configured document |
//! | `askdoc ask "<question>"` | Answer one question and list its sources |
//! | `askdoc chat` | Interactive question/answer session |
//! | `askdoc serve` | Start the HTTP JSON API |
//! | `askdoc stats` | Show what the current index was built from |
//!
//! ## Examples
//!
//! ```bash
//! # Index a PDF with smaller chunks
//! askdoc build --document ./data/policies.pdf --chunk-size 200 --chunk-overlap 40
//!
//! # Ask a question, machine-readable
//! askdoc ask "How long is the return window?" --json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use askdoc::config::{self, Config};
use askdoc::embedding::create_embedder;
use askdoc::engine::QueryEngine;
use askdoc::indexer::{self, BuildOptions};
use askdoc::progress::ProgressMode;
use askdoc::{server, shell, stats};

const DEFAULT_CONFIG: &str = "./config/askdoc.toml";

/// askdoc: ask questions about a document, answered from its own text.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the flag is omitted and `./config/askdoc.toml` does not exist,
/// built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "askdoc",
    about = "askdoc: retrieval-augmented question answering over a single document",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./config/askdoc.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log build and query milestones to stderr (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the index for the document.
    ///
    /// Extracts the text, splits it into overlapping chunks, embeds every
    /// chunk, and replaces the index and chunk store. A failed build leaves
    /// any previous index in place.
    Build {
        /// Document to index (overrides `[document].path`).
        #[arg(long)]
        document: Option<PathBuf>,

        /// Maximum chunk length in characters (overrides `[chunking].chunk_size`).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared between neighbouring chunks (overrides `[chunking].chunk_overlap`).
        #[arg(long)]
        chunk_overlap: Option<usize>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Answer a single question.
    Ask {
        /// The question.
        question: String,

        /// Print the answer and sources as JSON.
        #[arg(long)]
        json: bool,

        /// Also print the rendered prompt to stderr.
        #[arg(long)]
        show_prompt: bool,
    },

    /// Start an interactive chat session.
    Chat,

    /// Serve `POST /query` and `GET /health` on `[server].bind`.
    Serve,

    /// Show index statistics.
    Stats,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Tell the user when answers are not produced from the rendered prompt.
fn note_prompt_use(engine: &QueryEngine) {
    if !engine.uses_prompt() {
        eprintln!(
            "note: the '{}' generator answers with sentences from the retrieved chunks; \
             the prompt template is not used (set [generation].provider to ollama or openai)",
            engine.generator_name()
        );
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => config::load_config_or_default(&PathBuf::from(DEFAULT_CONFIG), true),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Build {
            document,
            chunk_size,
            chunk_overlap,
            progress,
        } => {
            if let Some(document) = document {
                cfg.document.path = document;
            }
            if let Some(size) = chunk_size {
                cfg.chunking.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                cfg.chunking.chunk_overlap = overlap;
            }
            config::validate(&cfg)?;

            let embedder = create_embedder(&cfg.embedding)?;
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let report = indexer::build(
                &BuildOptions::from_config(&cfg),
                embedder.as_ref(),
                reporter.as_ref(),
            )
            .await?;

            println!("build {}", cfg.document.path.display());
            println!("  pages: {}", report.pages);
            println!("  characters: {}", report.chars);
            println!("  chunks: {}", report.chunk_count);
            println!("  embedding: {}", report.manifest.embedding_identity());
            println!("  index: {}", report.index_dir.display());
            println!("  chunk store: {}", report.chunks_path.display());
            println!("ok");
        }
        Commands::Ask {
            question,
            json,
            show_prompt,
        } => {
            let engine = QueryEngine::open(&cfg).await?;
            note_prompt_use(&engine);

            if show_prompt {
                if let Ok(sources) = engine.retrieve(&question).await {
                    eprintln!("{}", engine.render_prompt(&sources, &question));
                    eprintln!("---");
                }
            }

            let answer = engine.query(&question).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                writeln!(out, "{}", answer.answer)?;
                shell::write_sources(&mut out, &answer, cfg.shell.source_preview_chars)?;
            }
        }
        Commands::Chat => {
            let engine = QueryEngine::open(&cfg).await?;
            note_prompt_use(&engine);
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            shell::run_chat(&engine, &cfg.shell, stdin.lock(), &mut stdout.lock())
                .await
                .context("chat session failed")?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
