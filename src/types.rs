//! Shared types for the CRASSUS engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market-data, screening,
//! and monitoring modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Option right: call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Map a signal direction to the contract right we buy:
    /// buy signals buy calls, sell signals buy puts.
    pub fn from_signal_side(side: SignalSide) -> Self {
        match side {
            SignalSide::Buy => OptionRight::Call,
            SignalSide::Sell => OptionRight::Put,
        }
    }
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionRight::Call => write!(f, "call"),
            OptionRight::Put => write!(f, "put"),
        }
    }
}

impl std::str::FromStr for OptionRight {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" | "c" => Ok(OptionRight::Call),
            "put" | "p" => Ok(OptionRight::Put),
            _ => Err(anyhow::anyhow!("Unknown option right: {s}")),
        }
    }
}

/// Signal direction from the upstream webhook parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalSide {
    Buy,
    Sell,
}

impl fmt::Display for SignalSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSide::Buy => write!(f, "buy"),
            SignalSide::Sell => write!(f, "sell"),
        }
    }
}

/// Direction of a tracked position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Whether a sell order closes a position in this direction.
    pub fn closing_is_sell(&self) -> bool {
        matches!(self, PositionSide::Long)
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Lifecycle state for a tracked exit target.
///
/// `Active` targets remain in the store; all other states are terminal
/// and the target is removed within the cycle that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetState {
    /// Target registered, position presumed open.
    Active,
    /// Take-profit hit, limit sell submitted.
    TpHit,
    /// Stop-loss hit, market sell submitted.
    SlHit,
    /// Position found closed externally, no order submitted.
    ReconciledClosed,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Active => write!(f, "ACTIVE"),
            TargetState::TpHit => write!(f, "TP_HIT"),
            TargetState::SlHit => write!(f, "SL_HIT"),
            TargetState::ReconciledClosed => write!(f, "RECONCILED_CLOSED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// A single option quote from a market-data source.
///
/// Immutable snapshot, produced fresh per fetch. `bid`/`ask` and
/// `implied_volatility` are `None` when the source does not quote them
/// (the secondary source quotes close price only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuote {
    /// OCC-style contract symbol (e.g. "AAPL240215C00150000").
    pub contract_symbol: String,
    pub underlying: String,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub right: OptionRight,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Last traded / close price.
    pub last_price: f64,
    /// Source-provided implied volatility (annualized), if quoted.
    pub implied_volatility: Option<f64>,
    pub open_interest: u32,
    pub volume: u32,
}

impl OptionQuote {
    /// Mid price between bid and ask. `None` when either side is missing
    /// or non-positive.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b > 0.0 && a > 0.0 => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Bid-ask spread as a percentage of mid. `None` without a valid mid.
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid()?;
        let (b, a) = (self.bid?, self.ask?);
        Some(((a - b) / mid) * 100.0)
    }

    /// Days to expiration relative to `today`.
    pub fn dte(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days()
    }

    /// Helper to build a test quote with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        OptionQuote {
            contract_symbol: "AAPL260320C00150000".to_string(),
            underlying: "AAPL".to_string(),
            strike: 150.0,
            expiration: NaiveDate::from_ymd_opt(2026, 3, 20).unwrap(),
            right: OptionRight::Call,
            bid: Some(4.90),
            ask: Some(5.10),
            last_price: 5.00,
            implied_volatility: Some(0.32),
            open_interest: 1500,
            volume: 120,
        }
    }
}

impl fmt::Display for OptionQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ${:.2} exp {} (bid {:.2} / ask {:.2} | oi {} | vol {})",
            self.underlying,
            self.right,
            self.contract_symbol,
            self.strike,
            self.expiration,
            self.bid.unwrap_or(0.0),
            self.ask.unwrap_or(0.0),
            self.open_interest,
            self.volume,
        )
    }
}

/// Theoretical price and sensitivities for an option contract.
///
/// Conventions (screener thresholds are calibrated to these, do not change):
/// - `theta` is per **calendar day** (annual theta / 365)
/// - `vega` is per **1% move in IV** (raw vega x 0.01)
///
/// Derived data, recomputed on demand; never cached across snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GreeksResult {
    /// Theoretical price from the closed-form model.
    pub price: f64,
    /// Signed delta. Calls in [0, 1], puts in [-1, 0].
    pub delta: f64,
    pub gamma: f64,
    /// Time decay per calendar day.
    pub theta: f64,
    /// Price change per 1 percentage-point move in IV.
    pub vega: f64,
    /// The volatility used to compute the above.
    pub iv: f64,
}

impl fmt::Display for GreeksResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "px={:.4} d={:.3} g={:.4} t={:.4}/day v={:.4}/1% iv={:.1}%",
            self.price,
            self.delta,
            self.gamma,
            self.theta,
            self.vega,
            self.iv * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Screening
// ---------------------------------------------------------------------------

/// Configuration for contract filtering. Loaded once per evaluation,
/// immutable during that evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningCriteria {
    /// Minimum days to expiration.
    pub dte_min: i64,
    /// Maximum days to expiration.
    pub dte_max: i64,
    /// Minimum absolute delta.
    pub delta_min: f64,
    /// Maximum absolute delta.
    pub delta_max: f64,
    pub min_volume: u32,
    pub min_open_interest: u32,
    /// Max bid-ask spread as % of mid price.
    pub max_spread_pct: f64,
    /// Minimum option premium.
    pub min_price: f64,
    /// Maximum option premium.
    pub max_price: f64,
}

impl Default for ScreeningCriteria {
    fn default() -> Self {
        Self {
            dte_min: 14,
            dte_max: 45,
            delta_min: 0.30,
            delta_max: 0.70,
            min_volume: 10,
            min_open_interest: 100,
            max_spread_pct: 5.0,
            min_price: 0.50,
            max_price: 50.0,
        }
    }
}

impl ScreeningCriteria {
    /// The midpoint of the absolute-delta window; candidates closest to
    /// this score highest on the delta term.
    pub fn target_delta(&self) -> f64 {
        (self.delta_min + self.delta_max) / 2.0
    }

    /// Half-width of the delta window, used to normalize delta distance.
    pub fn delta_half_window(&self) -> f64 {
        (self.delta_max - self.delta_min) / 2.0
    }
}

/// A quote/greeks pair with its composite screening score in [0, 1].
/// Ephemeral; exists only during ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub quote: OptionQuote,
    pub greeks: GreeksResult,
    /// Composite score in [0, 1]; higher is better.
    pub score: f64,
    pub dte: i64,
    /// Entry premium estimate (mid for quoted sources, close otherwise).
    pub premium: f64,
}

impl fmt::Display for ScoredCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} score={:.3} premium=${:.2} dte={} delta={:.3} oi={}",
            self.quote.contract_symbol,
            self.score,
            self.premium,
            self.dte,
            self.greeks.delta,
            self.quote.open_interest,
        )
    }
}

// ---------------------------------------------------------------------------
// Signals & strategy parameters (upstream collaborators)
// ---------------------------------------------------------------------------

/// A validated trading signal from the upstream webhook parser.
/// The core never parses raw webhook text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub side: SignalSide,
    pub ticker: String,
    pub strategy: String,
    /// Signal entry price of the underlying.
    pub price: f64,
    /// Execution mode label (e.g. "paper", "live"). Opaque to the core.
    pub mode: String,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

/// TP/SL percentages for a named strategy, supplied by the upstream
/// strategy config lookup. Opaque numeric inputs to the core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyParams {
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub stop_limit_pct: f64,
    /// Take-profit % of the option premium.
    pub options_tp_pct: f64,
    /// Stop-loss % of the option premium.
    pub options_sl_pct: f64,
}

// ---------------------------------------------------------------------------
// Exit targets
// ---------------------------------------------------------------------------

/// TP/SL targets for an open options position.
///
/// Created when an entry order is accepted; replaced (never edited) on
/// re-registration; removed when its target fires or the position is
/// found closed externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitTarget {
    pub contract_symbol: String,
    pub underlying: String,
    pub side: PositionSide,
    pub qty: u32,
    pub entry_price: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for ExitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} entry={:.2} tp={:.2} sl={:.2} [{}]",
            self.side,
            self.contract_symbol,
            self.qty,
            self.entry_price,
            self.take_profit_price,
            self.stop_loss_price,
            self.correlation_id,
        )
    }
}

impl ExitTarget {
    #[cfg(test)]
    pub fn sample(symbol: &str, tp: f64, sl: f64) -> Self {
        ExitTarget {
            contract_symbol: symbol.to_string(),
            underlying: "AAPL".to_string(),
            side: PositionSide::Long,
            qty: 2,
            entry_price: 5.00,
            take_profit_price: tp,
            stop_loss_price: sl,
            correlation_id: "test0001".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Per-target outcome of a monitor cycle, for logging and reporting.
#[derive(Debug, Clone)]
pub struct ExitAction {
    pub contract_symbol: String,
    pub state: TargetState,
    pub current_price: Option<f64>,
    pub order_id: Option<String>,
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Round an options price to 2 decimal places.
/// US-listed equity options are quoted in dollars and cents; the venue
/// validates tick sizes server-side.
pub fn round_to_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Generate a short correlation ID for log tracing (8 hex chars).
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy.
///
/// `NoCandidate` is deliberately absent: an empty screening result is a
/// business outcome (`Ok(None)`), not an error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed numeric parameters. Reported to the caller, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream data source exhausted its retries. A field named
    /// `source` would be picked up by thiserror as the error cause.
    #[error("Data unavailable ({provider}): {message}")]
    DataUnavailable { provider: String, message: String },

    /// IV solver failed. Excludes the candidate, not the whole cycle.
    #[error("IV solver did not converge: {0}")]
    NoConvergence(String),

    /// Execution venue rejected a call.
    #[error("Broker error: {0}")]
    Broker(String),

    /// Target store unreadable or unwritable.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- OptionRight tests --

    #[test]
    fn test_right_display() {
        assert_eq!(format!("{}", OptionRight::Call), "call");
        assert_eq!(format!("{}", OptionRight::Put), "put");
    }

    #[test]
    fn test_right_from_str() {
        assert_eq!("call".parse::<OptionRight>().unwrap(), OptionRight::Call);
        assert_eq!("PUT".parse::<OptionRight>().unwrap(), OptionRight::Put);
        assert_eq!("c".parse::<OptionRight>().unwrap(), OptionRight::Call);
        assert!("straddle".parse::<OptionRight>().is_err());
    }

    #[test]
    fn test_right_from_signal_side() {
        assert_eq!(OptionRight::from_signal_side(SignalSide::Buy), OptionRight::Call);
        assert_eq!(OptionRight::from_signal_side(SignalSide::Sell), OptionRight::Put);
    }

    #[test]
    fn test_right_serialization_roundtrip() {
        for right in [OptionRight::Call, OptionRight::Put] {
            let json = serde_json::to_string(&right).unwrap();
            let parsed: OptionRight = serde_json::from_str(&json).unwrap();
            assert_eq!(right, parsed);
        }
    }

    // -- PositionSide tests --

    #[test]
    fn test_closing_side() {
        assert!(PositionSide::Long.closing_is_sell());
        assert!(!PositionSide::Short.closing_is_sell());
    }

    // -- TargetState tests --

    #[test]
    fn test_target_state_display() {
        assert_eq!(format!("{}", TargetState::Active), "ACTIVE");
        assert_eq!(format!("{}", TargetState::TpHit), "TP_HIT");
        assert_eq!(format!("{}", TargetState::SlHit), "SL_HIT");
        assert_eq!(format!("{}", TargetState::ReconciledClosed), "RECONCILED_CLOSED");
    }

    // -- OptionQuote tests --

    #[test]
    fn test_quote_mid() {
        let q = OptionQuote::sample(); // bid 4.90, ask 5.10
        assert!((q.mid().unwrap() - 5.00).abs() < 1e-10);
    }

    #[test]
    fn test_quote_mid_missing_bid() {
        let mut q = OptionQuote::sample();
        q.bid = None;
        assert!(q.mid().is_none());
    }

    #[test]
    fn test_quote_mid_zero_ask() {
        let mut q = OptionQuote::sample();
        q.ask = Some(0.0);
        assert!(q.mid().is_none());
    }

    #[test]
    fn test_quote_spread_pct() {
        let q = OptionQuote::sample();
        // (5.10 - 4.90) / 5.00 * 100 = 4.0%
        assert!((q.spread_pct().unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_quote_dte() {
        let q = OptionQuote::sample(); // expires 2026-03-20
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(q.dte(today), 19);
    }

    #[test]
    fn test_quote_serialization_roundtrip() {
        let q = OptionQuote::sample();
        let json = serde_json::to_string(&q).unwrap();
        let parsed: OptionQuote = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.contract_symbol, q.contract_symbol);
        assert_eq!(parsed.right, OptionRight::Call);
        assert_eq!(parsed.open_interest, 1500);
    }

    #[test]
    fn test_quote_display() {
        let q = OptionQuote::sample();
        let display = format!("{q}");
        assert!(display.contains("AAPL"));
        assert!(display.contains("call"));
    }

    // -- ScreeningCriteria tests --

    #[test]
    fn test_criteria_defaults() {
        let c = ScreeningCriteria::default();
        assert_eq!(c.dte_min, 14);
        assert_eq!(c.dte_max, 45);
        assert!((c.delta_min - 0.30).abs() < 1e-10);
        assert!((c.delta_max - 0.70).abs() < 1e-10);
        assert_eq!(c.min_open_interest, 100);
        assert_eq!(c.min_volume, 10);
    }

    #[test]
    fn test_criteria_target_delta() {
        let c = ScreeningCriteria::default();
        assert!((c.target_delta() - 0.50).abs() < 1e-10);
        assert!((c.delta_half_window() - 0.20).abs() < 1e-10);
    }

    // -- ExitTarget tests --

    #[test]
    fn test_exit_target_serialization_roundtrip() {
        let t = ExitTarget::sample("AAPL260320C00150000", 6.00, 4.50);
        let json = serde_json::to_string(&t).unwrap();
        let parsed: ExitTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.contract_symbol, "AAPL260320C00150000");
        assert_eq!(parsed.side, PositionSide::Long);
        assert_eq!(parsed.qty, 2);
        assert!((parsed.take_profit_price - 6.00).abs() < 1e-10);
    }

    #[test]
    fn test_exit_target_display() {
        let t = ExitTarget::sample("AAPL260320C00150000", 6.00, 4.50);
        let display = format!("{t}");
        assert!(display.contains("AAPL260320C00150000"));
        assert!(display.contains("tp=6.00"));
    }

    // -- Helper tests --

    #[test]
    fn test_round_to_cents() {
        assert!((round_to_cents(5.123) - 5.12).abs() < 1e-10);
        assert!((round_to_cents(5.126) - 5.13).abs() < 1e-10);
        assert_eq!(round_to_cents(0.0), 0.0);
    }

    #[test]
    fn test_correlation_id_length() {
        let id = correlation_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_correlation_ids_unique() {
        assert_ne!(correlation_id(), correlation_id());
    }

    // -- EngineError tests --

    #[test]
    fn test_error_display() {
        let e = EngineError::DataUnavailable {
            provider: "yahoo".to_string(),
            message: "rate limited".to_string(),
        };
        assert_eq!(format!("{e}"), "Data unavailable (yahoo): rate limited");

        let e = EngineError::InvalidInput("stop distance must be positive".to_string());
        assert!(format!("{e}").contains("stop distance"));
    }
}
