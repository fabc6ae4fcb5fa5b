use anyhow::Result;
use clap::Parser;
use snapcore::{ingest_dir, DescriptionStore, OpenAiClient};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Index screenshots into a description store using a vision model")]
struct Args {
    /// Path to the folder containing screenshots
    #[arg(long)]
    folder: PathBuf,
    /// Output JSON store file
    #[arg(long, default_value = "screenshot_descriptions.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let client = OpenAiClient::from_env()?;
    let report = ingest_dir(&client, &args.folder, &args.output).await?;

    for outcome in &report.outcomes {
        println!("{:>7}  {}", outcome.status.label(), outcome.identifier);
    }
    println!(
        "\nIndexing complete! Processed {} new images ({} skipped, {} failed).",
        report.indexed(),
        report.skipped(),
        report.failed()
    );
    println!("Total images in index: {}", DescriptionStore::load(&args.output).len());
    Ok(())
}
