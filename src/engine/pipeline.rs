//! Signal evaluation pipeline.
//!
//! One inbound directional signal goes through: source selection,
//! screening, dollar-risk sizing, entry order submission, and exit
//! target registration. The data source is picked once per evaluation;
//! whichever source served the chain also defines how the premium was
//! derived, so mixing sources mid-evaluation is never allowed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::broker::{BrokerExecution, OrderSide};
use crate::marketdata::OptionsDataSource;
use crate::monitor::TargetStore;
use crate::risk;
use crate::screener::Screener;
use crate::types::{
    correlation_id, round_to_cents, EngineError, ExitTarget, PositionSide, ScoredCandidate,
    StrategyParams, TradeSignal,
};

/// What the pipeline did with a signal. `NoTrade` is a normal outcome,
/// not an error.
#[derive(Debug)]
pub enum EvaluationOutcome {
    Submitted {
        contract_symbol: String,
        qty: u32,
        entry_price: f64,
        take_profit_price: f64,
        stop_loss_price: f64,
        order_id: String,
        correlation_id: String,
    },
    NoTrade {
        reason: String,
    },
}

pub struct SignalPipeline {
    primary: Arc<dyn OptionsDataSource>,
    secondary: Option<Arc<dyn OptionsDataSource>>,
    screener: Screener,
    broker: Arc<dyn BrokerExecution>,
    store: Arc<TargetStore>,
    max_dollar_risk: f64,
    contract_multiplier: f64,
}

impl SignalPipeline {
    pub fn new(
        primary: Arc<dyn OptionsDataSource>,
        secondary: Option<Arc<dyn OptionsDataSource>>,
        screener: Screener,
        broker: Arc<dyn BrokerExecution>,
        store: Arc<TargetStore>,
        max_dollar_risk: f64,
        contract_multiplier: f64,
    ) -> Self {
        Self {
            primary,
            secondary,
            screener,
            broker,
            store,
            max_dollar_risk,
            contract_multiplier,
        }
    }

    /// Evaluate one signal end to end.
    pub async fn evaluate_signal(
        &self,
        signal: &TradeSignal,
        params: &StrategyParams,
    ) -> Result<EvaluationOutcome, EngineError> {
        let cid = correlation_id();
        info!(
            correlation_id = %cid,
            ticker = %signal.ticker,
            side = ?signal.side,
            strategy = %signal.strategy,
            "evaluating signal"
        );

        let candidate = match self.screen(signal, &cid).await? {
            Some(c) => c,
            None => {
                return Ok(EvaluationOutcome::NoTrade {
                    reason: "no contract passed screening".to_string(),
                })
            }
        };

        let qty = risk::contracts_for_risk(
            self.max_dollar_risk,
            params.options_sl_pct,
            candidate.premium,
            self.contract_multiplier,
        )?;
        if qty == 0 {
            info!(
                correlation_id = %cid,
                contract = %candidate.quote.contract_symbol,
                premium = candidate.premium,
                "risk budget too small for one contract"
            );
            return Ok(EvaluationOutcome::NoTrade {
                reason: format!(
                    "risk budget {:.2} below one contract at premium {:.2}",
                    self.max_dollar_risk, candidate.premium
                ),
            });
        }

        let entry_price = round_to_cents(candidate.premium);
        let take_profit_price =
            round_to_cents(candidate.premium * (1.0 + params.options_tp_pct / 100.0));
        let stop_loss_price =
            round_to_cents(candidate.premium * (1.0 - params.options_sl_pct / 100.0));

        let ack = self
            .broker
            .submit_limit_order(
                &candidate.quote.contract_symbol,
                OrderSide::Buy,
                qty,
                entry_price,
                cid.clone(),
            )
            .await?;

        // Register the exit target only after the broker accepted the
        // entry; an unfilled day order with no target is harmless, a
        // target with no position gets reconciled away.
        self.store
            .register(ExitTarget {
                contract_symbol: candidate.quote.contract_symbol.clone(),
                underlying: signal.ticker.clone(),
                side: PositionSide::Long,
                qty,
                entry_price,
                take_profit_price,
                stop_loss_price,
                correlation_id: cid.clone(),
                created_at: Utc::now(),
            })
            .await?;

        info!(
            correlation_id = %cid,
            contract = %candidate.quote.contract_symbol,
            qty,
            entry = entry_price,
            tp = take_profit_price,
            sl = stop_loss_price,
            order_id = %ack.order_id,
            "entry submitted and exit target registered"
        );

        Ok(EvaluationOutcome::Submitted {
            contract_symbol: candidate.quote.contract_symbol,
            qty,
            entry_price,
            take_profit_price,
            stop_loss_price,
            order_id: ack.order_id,
            correlation_id: cid,
        })
    }

    /// Screen against the primary source, falling back to the secondary
    /// only when the primary cannot serve data at all.
    async fn screen(
        &self,
        signal: &TradeSignal,
        cid: &str,
    ) -> Result<Option<ScoredCandidate>, EngineError> {
        let as_of = Utc::now().date_naive();
        match self
            .screener
            .best_candidate(
                self.primary.as_ref(),
                &signal.ticker,
                signal.price,
                signal.side,
                as_of,
            )
            .await
        {
            Ok(result) => Ok(result),
            Err(EngineError::DataUnavailable { provider, message }) => {
                let Some(secondary) = &self.secondary else {
                    return Err(EngineError::DataUnavailable { provider, message });
                };
                warn!(
                    correlation_id = %cid,
                    failed_source = %provider,
                    %message,
                    fallback = secondary.name(),
                    "primary source unavailable, falling back"
                );
                self.screener
                    .best_candidate(
                        secondary.as_ref(),
                        &signal.ticker,
                        signal.price,
                        signal.side,
                        as_of,
                    )
                    .await
            }
            Err(other) => Err(other),
        }
    }
}
