use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use pdf_qa::{AppConfig, QaService};

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Run a question/answer evaluation set against one PDF")]
struct Cli {
    #[arg(long)]
    pdf: String,
    #[arg(long, default_value = "eval/prompts.jsonl")]
    file: String,
    #[arg(long, default_value_t = false)]
    verbose: bool,
    #[arg(long, default_value_t = false)]
    suggestions: bool,
}

#[derive(Debug, Deserialize)]
struct EvalPrompt {
    id: String,
    question: String,
    #[serde(default)]
    expect_contains: Vec<String>,
    #[serde(default)]
    expect_not_grounded: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let qa = QaService::from_config(&config).context("invalid chunking configuration")?;

    let prompts = load_prompts(&cli.file)?;
    if prompts.is_empty() {
        anyhow::bail!("no prompts found in {}", cli.file);
    }

    let bytes = std::fs::read(&cli.pdf).with_context(|| format!("failed reading {}", cli.pdf))?;
    let document = qa
        .ingest(bytes, Some(cli.pdf.clone()))
        .await
        .with_context(|| format!("failed to ingest {}", cli.pdf))?;

    let mut total = 0usize;
    let mut passed = 0usize;
    let mut grounded_count = 0usize;
    let mut failures = 0usize;

    for prompt in prompts {
        total += 1;
        let answer = match qa.answer(&document, &prompt.question).await {
            Ok(answer) => answer,
            Err(err) => {
                failures += 1;
                println!("--- {} --- model error: {}", prompt.id, err);
                continue;
            }
        };

        if answer.grounded {
            grounded_count += 1;
        }

        let answer_lower = answer.text.to_lowercase();
        let mut pass = prompt
            .expect_contains
            .iter()
            .all(|needle| answer_lower.contains(&needle.to_lowercase()));
        if prompt.expect_not_grounded.unwrap_or(false) == answer.grounded {
            pass = false;
        }
        if pass {
            passed += 1;
        }

        if cli.verbose {
            println!("--- {} ---", prompt.id);
            println!("Q: {}", prompt.question);
            println!("A: {}", answer.text.replace('\n', " "));
            println!("Outcome: {:?} chunks={:?}", answer.outcome, answer.source_chunks);
            println!();
        }
    }

    println!("Eval prompts: {}", total);
    println!("Expectation accuracy: {:.1}%", ratio(passed, total) * 100.0);
    println!("Grounded rate: {:.1}%", ratio(grounded_count, total) * 100.0);
    println!("Model failures: {}", failures);

    if cli.suggestions {
        match qa.suggest(&document).await {
            Ok(set) => {
                println!("Suggested questions ({}):", set.questions.len());
                for question in &set.questions {
                    println!("  - {question}");
                }
            }
            Err(err) => println!("Suggestions unavailable: {err}"),
        }
    }

    Ok(())
}

fn load_prompts(path: &str) -> Result<Vec<EvalPrompt>> {
    let file = File::open(path).with_context(|| format!("failed opening {}", path))?;
    let reader = BufReader::new(file);
    let mut prompts = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: EvalPrompt = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", path, idx + 1))?;
        prompts.push(parsed);
    }

    Ok(prompts)
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
