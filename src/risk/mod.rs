//! Dollar-risk position sizing.
//!
//! One question answered here: how many contracts can be bought so that
//! getting stopped out loses no more than the configured dollar risk?
//! The stop distance is a percentage of the entry premium, scaled by the
//! contract multiplier (100 shares for standard US equity options).

use tracing::debug;

use crate::types::EngineError;

/// Standard US equity option multiplier.
pub const DEFAULT_CONTRACT_MULTIPLIER: f64 = 100.0;

/// Number of contracts whose worst-case stop-out loss stays within
/// `max_dollar_risk`.
///
/// `stop_loss_pct` is the stop distance as a percent of `premium_price`
/// (e.g. 10.0 means the stop sits 10% below entry). The count is rounded
/// down; zero is a legitimate answer meaning the risk budget cannot
/// absorb even one contract.
pub fn contracts_for_risk(
    max_dollar_risk: f64,
    stop_loss_pct: f64,
    premium_price: f64,
    contract_multiplier: f64,
) -> Result<u32, EngineError> {
    if max_dollar_risk <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "max_dollar_risk must be positive, got {max_dollar_risk}"
        )));
    }
    if premium_price <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "premium_price must be positive, got {premium_price}"
        )));
    }
    if contract_multiplier <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "contract_multiplier must be positive, got {contract_multiplier}"
        )));
    }

    let stop_distance = (stop_loss_pct / 100.0) * premium_price;
    if stop_distance <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "stop distance must be positive, got {stop_distance} (stop_loss_pct {stop_loss_pct})"
        )));
    }

    let risk_per_contract = stop_distance * contract_multiplier;
    let qty = (max_dollar_risk / risk_per_contract).floor() as u32;

    debug!(
        max_dollar_risk,
        stop_loss_pct,
        premium_price,
        risk_per_contract,
        qty,
        "sized position"
    );
    Ok(qty)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
