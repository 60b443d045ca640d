//! Engine wiring and the long-running monitor loop.

pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::broker::BrokerExecution;
use crate::marketdata::OptionsDataSource;
use crate::monitor::{ExitMonitor, TargetStore};
use crate::screener::Screener;
use crate::types::{EngineError, StrategyParams, TradeSignal};

pub use pipeline::{EvaluationOutcome, SignalPipeline};

/// Top-level handle owning the signal pipeline and the exit monitor.
pub struct Engine {
    pipeline: SignalPipeline,
    monitor: ExitMonitor,
    monitor_interval: Duration,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary: Arc<dyn OptionsDataSource>,
        secondary: Option<Arc<dyn OptionsDataSource>>,
        screener: Screener,
        broker: Arc<dyn BrokerExecution>,
        store: Arc<TargetStore>,
        max_dollar_risk: f64,
        contract_multiplier: f64,
        monitor_interval: Duration,
    ) -> Self {
        let monitor_source: Arc<dyn OptionsDataSource> =
            secondary.clone().unwrap_or_else(|| primary.clone());
        // The monitor wants whatever source answers single-contract
        // quotes most cheaply; close-only data is fine for threshold
        // checks, so the secondary serves it when configured.
        let monitor = ExitMonitor::new(monitor_source, broker.clone(), store.clone());
        let pipeline = SignalPipeline::new(
            primary,
            secondary,
            screener,
            broker,
            store,
            max_dollar_risk,
            contract_multiplier,
        );
        Self {
            pipeline,
            monitor,
            monitor_interval,
        }
    }

    pub async fn evaluate_signal(
        &self,
        signal: &TradeSignal,
        params: &StrategyParams,
    ) -> Result<EvaluationOutcome, EngineError> {
        self.pipeline.evaluate_signal(signal, params).await
    }

    /// Run exit-monitor cycles until ctrl-c. A failed cycle logs and
    /// waits for the next tick; targets it could not process remain
    /// tracked.
    pub async fn run_monitor_loop(&self) {
        info!(
            interval_secs = self.monitor_interval.as_secs(),
            "exit monitor loop starting"
        );
        let mut ticker = interval(self.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.monitor.run_cycle().await {
                        Ok(actions) if actions.is_empty() => {}
                        Ok(actions) => {
                            info!(count = actions.len(), "exit actions taken this cycle");
                        }
                        Err(err) => {
                            error!(%err, "monitor cycle failed, targets untouched");
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, stopping monitor loop");
                    break;
                }
            }
        }
    }
}
