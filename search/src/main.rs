use anyhow::{anyhow, Result};
use clap::Parser;
use snapcore::{rank, DescriptionStore, OpenAiClient};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "search")]
#[command(about = "Search indexed screenshots with a free-text query")]
struct Args {
    /// Search query
    #[arg(long)]
    query: String,
    /// Input JSON store file
    #[arg(long, default_value = "screenshot_descriptions.json")]
    input: PathBuf,
    /// Number of top results to return
    #[arg(long, default_value_t = 5)]
    top: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store = DescriptionStore::load(&args.input);
    if store.is_empty() {
        return Err(anyhow!(
            "no descriptions found in '{}'; run the indexer first",
            args.input.display()
        ));
    }
    println!("Loaded {} screenshot descriptions from {}", store.len(), args.input.display());

    let client = OpenAiClient::from_env()?;
    let results = rank(&client, &args.query, &store, args.top).await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("\nTop {} results for '{}':", results.len(), args.query);
    println!("{}", "-".repeat(60));
    for (i, result) in results.iter().enumerate() {
        let name = Path::new(&result.identifier)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| result.identifier.clone());
        let excerpt: String = result.description.chars().take(100).collect();
        println!("{}. {name}", i + 1);
        println!("   Confidence: {}%", result.confidence);
        println!("   Description: {excerpt}...");
        println!();
    }
    Ok(())
}
