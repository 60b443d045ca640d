//! Exit-target monitoring.
//!
//! Each cycle walks every tracked target through a small state machine:
//!
//! - position no longer open at the broker: `RECONCILED_CLOSED`, the
//!   target is dropped without any order
//! - price at or beyond take-profit: closing limit order at the TP price
//! - price at or beyond stop-loss: closing market order
//! - otherwise the target stays `ACTIVE`
//!
//! Terminal transitions claim the target (remove it from the store)
//! before any order goes out; a concurrent cycle that saw the same
//! snapshot loses the claim and submits nothing.
//!
//! Failures are isolated per target. A quote fetch or order rejection
//! logs and leaves that target in place for the next cycle; only the
//! broker position listing is cycle-fatal, since without it every
//! reconcile decision would be a guess.

pub mod store;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::broker::{BrokerExecution, OrderKind, OrderSide};
use crate::marketdata::OptionsDataSource;
use crate::types::{correlation_id, EngineError, ExitAction, ExitTarget, TargetState};

pub use store::TargetStore;

pub struct ExitMonitor {
    data: Arc<dyn OptionsDataSource>,
    broker: Arc<dyn BrokerExecution>,
    store: Arc<TargetStore>,
}

impl ExitMonitor {
    pub fn new(
        data: Arc<dyn OptionsDataSource>,
        broker: Arc<dyn BrokerExecution>,
        store: Arc<TargetStore>,
    ) -> Self {
        Self {
            data,
            broker,
            store,
        }
    }

    /// Evaluate every tracked target once. Returns the actions taken
    /// this cycle; targets that stayed `ACTIVE` produce no entry.
    pub async fn run_cycle(&self) -> Result<Vec<ExitAction>, EngineError> {
        let targets = self.store.load_all().await;
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let positions = self.broker.list_open_positions().await?;
        let open_symbols: Vec<&str> = positions
            .iter()
            .map(|p| p.contract_symbol.as_str())
            .collect();

        let mut actions = Vec::new();
        for target in targets {
            match self.check_target(&target, &open_symbols).await {
                Ok(Some(action)) => actions.push(action),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        contract = %target.contract_symbol,
                        correlation_id = %target.correlation_id,
                        %err,
                        "target check failed, will retry next cycle"
                    );
                }
            }
        }
        Ok(actions)
    }

    async fn check_target(
        &self,
        target: &ExitTarget,
        open_symbols: &[&str],
    ) -> Result<Option<ExitAction>, EngineError> {
        // Position closed outside the engine (manual close, expiry,
        // assignment): nothing left to protect. A `None` from remove
        // means a concurrent cycle already reconciled it.
        if !open_symbols.contains(&target.contract_symbol.as_str()) {
            if self.store.remove(&target.contract_symbol).await?.is_none() {
                return Ok(None);
            }
            info!(
                contract = %target.contract_symbol,
                correlation_id = %target.correlation_id,
                "position no longer open, reconciled"
            );
            return Ok(Some(ExitAction {
                contract_symbol: target.contract_symbol.clone(),
                state: TargetState::ReconciledClosed,
                current_price: None,
                order_id: None,
                note: Some("position closed externally".to_string()),
            }));
        }

        let quote = self.data.fetch_quote(&target.contract_symbol).await?;
        let current_price = quote.mid().unwrap_or(quote.last_price);
        if current_price <= 0.0 {
            return Err(EngineError::DataUnavailable {
                provider: self.data.name().to_string(),
                message: format!("no usable price for {}", target.contract_symbol),
            });
        }

        match next_state(target, current_price) {
            TargetState::Active => Ok(None),
            TargetState::TpHit => {
                // Claim the target before submitting, so an overlapping
                // cycle that saw the same snapshot cannot also close it.
                let Some(claimed) = self.store.remove(&target.contract_symbol).await? else {
                    return Ok(None);
                };
                let ack = self
                    .submit_close_or_restore(claimed, OrderKind::Limit(target.take_profit_price))
                    .await?;
                info!(
                    contract = %target.contract_symbol,
                    correlation_id = %target.correlation_id,
                    price = current_price,
                    tp = target.take_profit_price,
                    order_id = %ack,
                    "take profit hit"
                );
                Ok(Some(ExitAction {
                    contract_symbol: target.contract_symbol.clone(),
                    state: TargetState::TpHit,
                    current_price: Some(current_price),
                    order_id: Some(ack),
                    note: None,
                }))
            }
            TargetState::SlHit => {
                let Some(claimed) = self.store.remove(&target.contract_symbol).await? else {
                    return Ok(None);
                };
                let ack = self.submit_close_or_restore(claimed, OrderKind::Market).await?;
                error!(
                    contract = %target.contract_symbol,
                    correlation_id = %target.correlation_id,
                    price = current_price,
                    sl = target.stop_loss_price,
                    order_id = %ack,
                    "stop loss hit"
                );
                Ok(Some(ExitAction {
                    contract_symbol: target.contract_symbol.clone(),
                    state: TargetState::SlHit,
                    current_price: Some(current_price),
                    order_id: Some(ack),
                    note: None,
                }))
            }
            TargetState::ReconciledClosed => unreachable!("handled before price check"),
        }
    }

    /// Submit the closing order for an already-claimed target. On a
    /// broker rejection the target goes back into the store so the next
    /// cycle retries it.
    async fn submit_close_or_restore(
        &self,
        target: ExitTarget,
        kind: OrderKind,
    ) -> Result<String, EngineError> {
        let side = if target.side.closing_is_sell() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let submit = match kind {
            OrderKind::Limit(price) => {
                self.broker
                    .submit_limit_order(
                        &target.contract_symbol,
                        side,
                        target.qty,
                        price,
                        correlation_id(),
                    )
                    .await
            }
            OrderKind::Market => {
                self.broker
                    .submit_market_order(&target.contract_symbol, side, target.qty, correlation_id())
                    .await
            }
        };
        match submit {
            Ok(ack) => Ok(ack.order_id),
            Err(err) => {
                if let Err(store_err) = self.store.register(target).await {
                    warn!(%store_err, "could not restore target after rejected close");
                }
                Err(err)
            }
        }
    }
}

/// Pure transition function. Long targets profit upward; short targets
/// profit downward. TP wins when a price satisfies both thresholds.
fn next_state(target: &ExitTarget, current_price: f64) -> TargetState {
    let (tp_hit, sl_hit) = if target.side.closing_is_sell() {
        (
            current_price >= target.take_profit_price,
            current_price <= target.stop_loss_price,
        )
    } else {
        (
            current_price <= target.take_profit_price,
            current_price >= target.stop_loss_price,
        )
    };
    if tp_hit {
        TargetState::TpHit
    } else if sl_hit {
        TargetState::SlHit
    } else {
        TargetState::Active
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionSide;

    fn long_target(tp: f64, sl: f64) -> ExitTarget {
        ExitTarget::sample("AAPL260320C00150000", tp, sl)
    }

    #[test]
    fn test_long_between_thresholds_stays_active() {
        let t = long_target(6.00, 4.50);
        assert_eq!(next_state(&t, 5.20), TargetState::Active);
    }

    #[test]
    fn test_long_tp_at_threshold() {
        let t = long_target(6.00, 4.50);
        assert_eq!(next_state(&t, 6.00), TargetState::TpHit);
        assert_eq!(next_state(&t, 7.35), TargetState::TpHit);
    }

    #[test]
    fn test_long_sl_at_threshold() {
        let t = long_target(6.00, 4.50);
        assert_eq!(next_state(&t, 4.50), TargetState::SlHit);
        assert_eq!(next_state(&t, 3.10), TargetState::SlHit);
    }

    #[test]
    fn test_short_thresholds_invert() {
        let mut t = long_target(4.00, 6.50);
        t.side = PositionSide::Short;
        assert_eq!(next_state(&t, 3.90), TargetState::TpHit);
        assert_eq!(next_state(&t, 6.60), TargetState::SlHit);
        assert_eq!(next_state(&t, 5.00), TargetState::Active);
    }

    #[test]
    fn test_tp_wins_over_sl_on_degenerate_targets() {
        // tp below sl can only come from misconfiguration upstream; the
        // transition still has to be deterministic.
        let t = long_target(4.00, 5.00);
        assert_eq!(next_state(&t, 4.50), TargetState::TpHit);
    }
}
