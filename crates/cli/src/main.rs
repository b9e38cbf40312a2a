//! DocChat CLI
//!
//! Ask questions about a documentation corpus from the terminal or over HTTP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docchat_cli::server;
use docchat_engine::{DocChat, GeminiClient, Settings, StartupError, Submission};
use docchat_index::IndexArtifact;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// DocChat - chat with your documentation
#[derive(Parser)]
#[command(name = "docchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Corpus root (overrides DOCCHAT_CORPUS_ROOT)
    #[arg(short, long)]
    corpus: Option<PathBuf>,

    /// Chunks retrieved per question (overrides DOCCHAT_TOP_K)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the credential, the corpus and the API
    Check,

    /// Build the index and show its stats
    Index,

    /// Ask a single question
    Ask {
        /// The question
        question: String,
    },

    /// Interactive chat
    Chat,

    /// Serve chat sessions over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr; stdout carries replies
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")?;

    let mut settings = Settings::from_env().map_err(|e| startup_failure(e.into()))?;
    if let Some(corpus) = cli.corpus {
        settings.corpus_root = corpus;
    }
    if let Some(top_k) = cli.top_k {
        if top_k == 0 {
            anyhow::bail!("--top-k must be at least 1");
        }
        settings.top_k = top_k;
    }

    match cli.command {
        Commands::Check => {
            cmd_check(settings).await?;
        }
        Commands::Index => {
            cmd_index(settings).await?;
        }
        Commands::Ask { question } => {
            cmd_ask(settings, question).await?;
        }
        Commands::Chat => {
            cmd_chat(settings).await?;
        }
        Commands::Serve { addr } => {
            cmd_serve(settings, addr).await?;
        }
    }

    Ok(())
}

fn startup_failure(err: StartupError) -> anyhow::Error {
    anyhow::anyhow!("Startup failed [{}]: {}", err.precondition(), err)
}

/// Preflight plus an eager index build; nothing is served if this fails
async fn start(settings: Settings) -> Result<(DocChat, Arc<IndexArtifact>)> {
    let chat = DocChat::new(settings).map_err(startup_failure)?;
    let index = chat.start().await.map_err(startup_failure)?;
    Ok((chat, index))
}

async fn cmd_check(settings: Settings) -> Result<()> {
    DocChat::preflight(&settings).map_err(|e| startup_failure(e.into()))?;
    println!("✓ Credential found");
    println!("✓ Corpus root: {}", settings.corpus_root.display());

    let loader = settings.loader();
    let documents = tokio::task::spawn_blocking(move || loader.load())
        .await
        .context("Corpus loader task failed")?
        .map_err(|e| startup_failure(e.into()))?;
    println!(
        "✓ {} documents ({})",
        documents.len(),
        settings.extensions.join(", ")
    );

    let client = GeminiClient::from_settings(&settings).map_err(startup_failure)?;
    match client.health().await {
        Ok(true) => {
            println!("✓ Gemini API reachable ({})", settings.chat_model);
        }
        Ok(false) => {
            eprintln!("Error: Gemini API rejected the request.");
            eprintln!("  Base URL: {}", client.base_url());
            eprintln!("  Model: {}", settings.chat_model);
            anyhow::bail!("Gemini API check failed");
        }
        Err(e) => {
            eprintln!("Error: Gemini API is not reachable.");
            eprintln!("  Base URL: {}", client.base_url());
            anyhow::bail!("Gemini API unavailable: {}", e);
        }
    }

    Ok(())
}

async fn cmd_index(settings: Settings) -> Result<()> {
    let (_chat, index) = start(settings).await?;
    let stats = index.stats();

    println!("✓ Index built:");
    println!("  • Documents: {}", stats.documents);
    println!("  • Chunks: {}", stats.chunks);
    println!("  • Dimensions: {}", stats.dimensions);

    Ok(())
}

async fn cmd_ask(settings: Settings, question: String) -> Result<()> {
    let (chat, _index) = start(settings).await?;
    let mut presenter = chat
        .new_presenter()
        .await
        .context("Failed to open a chat session")?;

    let submission = presenter.submit(&question).await;
    if !print_submission(&submission) {
        anyhow::bail!("Question could not be answered");
    }

    Ok(())
}

async fn cmd_chat(settings: Settings) -> Result<()> {
    let (chat, _index) = start(settings).await?;
    let mut presenter = chat
        .new_presenter()
        .await
        .context("Failed to open a chat session")?;

    println!("DocChat - {}", chat.settings().topic);
    println!("Ask a question, or type quit to exit");
    println!();
    if let Some(greeting) = presenter.snapshot().transcript.first() {
        println!("{}", greeting.content);
        println!();
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("you> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        match line.trim() {
            "" => continue,
            "quit" | "exit" | "q" => break,
            message => {
                let submission = presenter.submit(message).await;
                print_submission(&submission);
                println!();
            }
        }
    }

    info!(
        "Session {} ended after {} messages",
        presenter.id(),
        presenter.session().transcript().len()
    );
    Ok(())
}

async fn cmd_serve(settings: Settings, addr: SocketAddr) -> Result<()> {
    let (chat, index) = start(settings).await?;
    let stats = index.stats();
    info!(
        "Index ready: {} documents, {} chunks",
        stats.documents, stats.chunks
    );

    server::serve(Arc::new(chat), addr).await
}

/// Print the reply and its sources, or the turn error. Returns false on error.
fn print_submission(submission: &Submission) -> bool {
    if let Some(error) = &submission.error {
        eprintln!("Error ({}): {}", error.stage, error.message);
        if error.retryable {
            eprintln!("This looks temporary; try again.");
        }
        return false;
    }

    if let Some(reply) = submission.reply() {
        println!("{}", reply.content.trim());
    }

    if !submission.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &submission.sources {
            println!(
                "  • {} (chunk {}, score {:.3})",
                source.path, source.chunk_index, source.score
            );
        }
    }

    true
}
