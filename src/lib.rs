//! CRASSUS: options signal evaluation and exit monitoring.
//!
//! The engine takes directional trade signals on an underlying, screens
//! its option chain for the best single-leg contract, sizes the position
//! against a fixed dollar-risk budget, submits the entry, and then
//! babysits the position with persisted take-profit / stop-loss targets
//! until something fires or the position disappears.

pub mod broker;
pub mod config;
pub mod engine;
pub mod marketdata;
pub mod monitor;
pub mod pricing;
pub mod risk;
pub mod screener;
pub mod types;

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber. `RUST_LOG` controls filtering
/// (default `info`); set `CRASSUS_LOG_JSON=1` for JSON output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CRASSUS_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
