use algo_orchestrator::config::Settings;
use algo_orchestrator::exchange::{CoinbaseExchange, RestClient, SocketTiming, StaticToken, TokenSource};
use algo_orchestrator::{Exchange, Manager};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Algorithmic trading orchestrator
#[derive(Debug, Parser)]
#[command(name = "algo-orchestrator", version, about)]
struct Cli {
    /// Settings file layered over config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Extra symbols to start on boot
    #[arg(long = "enable", value_name = "SYMBOL")]
    enable: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    tracing::info!("🚀 algo-orchestrator starting");

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    for symbol in cli.enable {
        if !settings.enabled.contains(&symbol) {
            settings.enabled.push(symbol);
        }
    }
    settings.validate().context("invalid settings")?;

    let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new(settings.exchange.bearer_token.clone()));
    let rest = RestClient::new(
        settings.exchange.rest_url.clone(),
        tokens.clone(),
        settings.exchange.requests_per_second,
        settings.exchange.request_timeout(),
    )
    .context("failed to build REST client")?;

    let exchange = Arc::new(CoinbaseExchange::new(
        rest,
        tokens,
        settings.exchange.feed_urls(),
        settings.inbound_size()?,
        SocketTiming::default(),
    ));

    let shutdown = CancellationToken::new();
    let market_feed = exchange.start_market_feed(shutdown.child_token());
    let user_feed = exchange.start_user_feed(shutdown.child_token());

    let manager = Manager::new(
        exchange.clone() as Arc<dyn Exchange>,
        settings.manager_params()?,
        settings.manager.clone(),
        settings.signaler.clone(),
        settings.trader.clone(),
    )
    .context("failed to build manager")?;

    for symbol in &settings.enabled {
        match manager.start(symbol).await {
            Ok(()) => {}
            Err(e) => tracing::error!(symbol = %symbol, error = %e, "failed to start trader"),
        }
    }

    let mut halted = manager.halted();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️ received Ctrl+C, shutting down");
        }
        _ = halted.wait_for(|halted| *halted) => {
            tracing::error!("🛑 daily P/L limit reached, traders stopped; shutting down");
        }
    }

    manager.shutdown().await;
    shutdown.cancel();
    let _ = tokio::join!(market_feed, user_feed);

    tracing::info!("👋 shutdown complete");
    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
