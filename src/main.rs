/// Main entry point: run one trading cycle
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strata::broker::{AlpacaBackend, Broker, BrokerBackend, MockBackend};
use strata::config::{load_config, BarSourceKind, BrokerKind, Config};
use strata::data::{BarSource, CsvBarSource, SecurityProvider, YahooBarSource};
use strata::dsl::StrategyLoader;
use strata::engine::TradingEngine;
use strata::telemetry::TracingObserver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = load_config(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("strata={}", config.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting strata trading cycle...");
    let report = run_cycle(&config).await?;
    info!(
        "Done: {} orders placed, {} symbols skipped",
        report.orders_placed,
        report.symbols_skipped.len()
    );
    for symbol in &report.symbols_skipped {
        warn!("Skipped this cycle: {}", symbol);
    }
    Ok(())
}

async fn run_cycle(config: &Config) -> anyhow::Result<strata::CycleReport> {
    let strategy = StrategyLoader::new(&config.strategies_dir)
        .load(&config.strategy)
        .context("loading strategy")?;
    info!("Strategy '{}' loaded", strategy.name);

    let source: Box<dyn BarSource> = match config.bar_source {
        BarSourceKind::Csv => Box::new(CsvBarSource::new(
            &config.bar_data_dir,
            config.watchlist.clone(),
        )),
        BarSourceKind::Yahoo => Box::new(
            YahooBarSource::connect(config.watchlist.clone())
                .await
                .context("fetching Yahoo bar history")?,
        ),
    };
    let provider = SecurityProvider::new(source);

    let backend: Box<dyn BrokerBackend> = match config.broker {
        BrokerKind::Mock => {
            info!("Simulation mode: mock broker backend");
            Box::new(MockBackend::new())
        }
        BrokerKind::Alpaca => {
            info!("Live mode: Alpaca broker backend");
            Box::new(AlpacaBackend::from_env().context("configuring Alpaca backend")?)
        }
    };

    let observer = Arc::new(TracingObserver);
    let broker = Broker::new(backend, config.pdt_policy()?, observer.clone());
    let mut engine = TradingEngine::new(strategy, provider, broker, observer);
    Ok(engine.execute().await?)
}
