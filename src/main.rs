use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use pdf_qa::models::{Answer, Document};
use pdf_qa::{AppConfig, QaService};

#[derive(Parser, Debug)]
#[command(name = "pdf-qa")]
#[command(about = "Ask grounded questions about a PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and chunk a PDF and print what was found
    Ingest {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long, default_value_t = false)]
        show_chunks: bool,
    },
    /// Answer a single question
    Ask {
        #[arg(long)]
        pdf: PathBuf,
        #[arg(long)]
        question: String,
    },
    /// Print suggested questions
    Suggest {
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Interactive question loop on stdin
    Chat {
        #[arg(long)]
        pdf: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    let qa = QaService::from_config(&config).context("invalid chunking configuration")?;

    match cli.command {
        Command::Ingest { pdf, show_chunks } => {
            let document = load(&qa, &pdf).await?;
            println!(
                "Ingested {} pages={} chars={} chunks={} sha256={}",
                document.id,
                document.page_count,
                document.text.chars().count(),
                document.chunks.len(),
                document.content_hash
            );
            if show_chunks {
                for chunk in &document.chunks {
                    println!(
                        "--- chunk {} [{}..{}]\n{}",
                        chunk.index, chunk.start, chunk.end, chunk.text
                    );
                }
            }
        }
        Command::Ask { pdf, question } => {
            let document = load(&qa, &pdf).await?;
            let answer = qa
                .answer(&document, &question)
                .await
                .context("could not get an answer; try again")?;
            print_answer(&answer);
        }
        Command::Suggest { pdf } => {
            let document = load(&qa, &pdf).await?;
            let set = qa
                .suggest(&document)
                .await
                .context("could not generate suggested questions")?;
            for (n, question) in set.questions.iter().enumerate() {
                println!("{}. {}", n + 1, question);
            }
        }
        Command::Chat { pdf } => {
            let document = load(&qa, &pdf).await?;
            run_chat(&qa, &document).await?;
        }
    }

    Ok(())
}

async fn load(qa: &QaService, path: &Path) -> Result<std::sync::Arc<Document>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading PDF: {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string());

    qa.ingest(bytes, filename)
        .await
        .with_context(|| format!("failed to ingest {}", path.display()))
}

async fn run_chat(qa: &QaService, document: &Document) -> Result<()> {
    match qa.suggest(document).await {
        Ok(set) => {
            println!("Suggested questions:");
            for question in &set.questions {
                println!("  - {question}");
            }
        }
        Err(err) => tracing::warn!("no suggestions available: {}", err),
    }
    println!("Ask a question (empty line to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            break;
        }
        match qa.answer(document, question).await {
            Ok(answer) => print_answer(&answer),
            Err(err) => println!("Model unavailable, please try again: {err}"),
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if answer.grounded {
        let sources = answer
            .source_chunks
            .iter()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("(from chunks {sources})");
    } else {
        println!("(not grounded in the document)");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
