mod client;
mod config;
mod obsidian;
mod server;
mod tools;
mod weather;

use std::sync::Arc;

use anyhow::Result;
use client::{FanoutMetrics, InMemoryMetrics, LogLogger, LogMetrics, Logger, MetricsSink};
use config::Config;
use obsidian::ObsidianClient;
use server::ToolServer;
use tokio::io::BufReader;
use weather::WeatherClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::from_file(&config_path)?;

    // Logs go to stderr; stdout carries replies
    init_logging(&config.logging.level);
    log::info!("Configuration loaded from {}", config_path);

    config.validate()?;

    let logger: Arc<dyn Logger> = Arc::new(LogLogger::new());
    let stats = Arc::new(InMemoryMetrics::new());
    let metrics: Arc<dyn MetricsSink> = Arc::new(FanoutMetrics::new(vec![
        stats.clone() as Arc<dyn MetricsSink>,
        Arc::new(LogMetrics) as Arc<dyn MetricsSink>,
    ]));

    let vault = ObsidianClient::from_config(&config, logger.clone(), metrics.clone())?;
    let weather = WeatherClient::from_config(&config, logger, metrics)?;
    let policy = config.retry_policy();
    log::info!(
        "Clients ready (vault {}, weather {}, {} attempt(s) per call, {} ms backoff step)",
        config.obsidian.base_url,
        config.weather.base_url,
        policy.max_attempts(),
        policy.base_delay().as_millis()
    );

    let server = Arc::new(ToolServer::new(Arc::new(vault), Arc::new(weather), stats));
    log::info!("Serving {} tools on stdin/stdout", server::TOOL_NAMES.len());

    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    log::info!("Input closed, shutting down");
    Ok(())
}

/// RUST_LOG wins over the configured level when set.
fn init_logging(level: &str) {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    if let Err(e) = pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .try_init()
    {
        eprintln!("Logger already initialized: {}", e);
    }
}
