use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::{build_app, ServerConfig};
use snapcore::OpenAiClient;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Directory for uploaded screenshots
    #[arg(long, default_value = "screenshots")]
    screenshots: PathBuf,
    /// Description store file
    #[arg(long, default_value = "screenshot_descriptions.json")]
    store: PathBuf,
    /// Default number of search results
    #[arg(long, default_value_t = 5)]
    top_k: usize,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let model = Arc::new(OpenAiClient::from_env()?);
    let config = ServerConfig {
        upload_dir: args.screenshots,
        store_path: args.store,
        default_top_k: args.top_k,
    };
    let app: Router = build_app(config, model)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
