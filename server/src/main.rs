use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use server::{build_app, ServerOptions};
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Precomputed PageRank scores (`title,score` lines)
    #[arg(long)]
    pagerank: Option<PathBuf>,
    /// Link file for HITS ranking; needs --titles
    #[arg(long, requires = "titles")]
    links: Option<PathBuf>,
    /// `nodeLabel;title` lines mapping graph nodes to document file names
    #[arg(long, requires = "links")]
    titles: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let options = ServerOptions { index: args.index, pagerank: args.pagerank, links: args.links, titles: args.titles };
    let app: Router = build_app(&options)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
