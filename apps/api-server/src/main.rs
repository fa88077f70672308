//! HTTP surface binary: job control, artifact reads, file upload, and the
//! sharing/marketplace/withdrawal endpoints.

mod auth;
mod blob;
mod error;
mod handlers;
mod router;
mod server;
mod state;

use clap::Parser;
use core_config::AppConfig;
use server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "api-server")]
#[command(about = "Points-metered document and media processing HTTP API", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, env = "API_LISTEN_ADDR")]
    listen: Option<String>,

    #[arg(long, env = "API_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "API_LOG_JSON")]
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

    let mut config = AppConfig::load()?;
    if let Some(listen) = cli.listen {
        config.server.bind = Some(listen);
    }

    let server = Server::new(config).await?;
    server.run().await
}
