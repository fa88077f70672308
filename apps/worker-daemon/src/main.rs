//! Worker binary: claims jobs off the Redis backbone, runs them through
//! the provider facade and orchestrators, and commits or refunds points.

mod config;
mod http_provider;
mod server;

use clap::Parser;
use core_config::AppConfig;
use server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "worker-daemon")]
#[command(about = "Per-job-kind worker loops: claim, execute, commit-or-refund", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, env = "WORKER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "WORKER_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.json {
        tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer()).init();
    }

    let config = AppConfig::load()?;
    let server = Server::new(config).await?;
    server.run().await
}
