use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crassus::broker::alpaca::AlpacaClient;
use crassus::config::AppConfig;
use crassus::engine::Engine;
use crassus::marketdata::venue::VenueClient;
use crassus::marketdata::yahoo::YahooClient;
use crassus::marketdata::OptionsDataSource;
use crassus::monitor::TargetStore;
use crassus::screener::Screener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    crassus::init_tracing();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = AppConfig::load(&config_path)?;
    info!(config = %config_path, paper = config.broker.paper, "starting crassus");

    let retry = config.data.retry_policy();
    let primary: Arc<dyn OptionsDataSource> = Arc::new(YahooClient::new(retry)?);
    let secondary: Option<Arc<dyn OptionsDataSource>> = match &config.data.venue_base_url {
        Some(url) => {
            Some(Arc::new(VenueClient::new(url.clone(), retry)?) as Arc<dyn OptionsDataSource>)
        }
        None => None,
    };

    let broker = Arc::new(AlpacaClient::new(
        config.broker.api_key().context("broker API key")?,
        config.broker.api_secret().context("broker API secret")?,
        config.broker.paper,
    )?);

    let screener = Screener::new(
        config.screening.criteria(),
        config.screening.solver.params(),
        config.screening.risk_free_rate,
    );
    let store = Arc::new(TargetStore::new(&config.monitor.store_path));

    let engine = Engine::new(
        primary,
        secondary,
        screener,
        broker,
        store,
        config.risk.max_dollar_risk,
        config.risk.contract_multiplier,
        Duration::from_secs(config.monitor.interval_secs),
    );

    engine.run_monitor_loop().await;
    info!("crassus stopped");
    Ok(())
}
