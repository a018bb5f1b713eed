use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quickserve::{Config, Server, app};

/// Demo JSON service: users, items, a slow endpoint, notifications, health.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file; missing files are ignored.
    #[arg(short, long, default_value = quickserve::config::DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let router = app::router(&config).context("building routes")?;
    let server = Server::bind(config.socket_addr()?).await?;
    server.serve(router).await?;
    Ok(())
}
