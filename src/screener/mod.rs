//! Contract screener.
//!
//! Takes a full option chain and boils it down to the single best
//! candidate for a directional signal: hard filters first (side, DTE
//! window, liquidity, premium band, spread), then greeks for the
//! survivors, then a composite score in [0, 1] to rank what's left.
//!
//! An empty result is not an error. Callers get `Ok(None)` and decide
//! what "no trade" means for them.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::marketdata::OptionsDataSource;
use crate::pricing::{self, PriceInputs, SolverParams};
use crate::types::{
    EngineError, GreeksResult, OptionQuote, OptionRight, ScoredCandidate, ScreeningCriteria,
    SignalSide,
};

/// Composite score weights. Must sum to 1 so the score stays in [0, 1].
const WEIGHT_DELTA: f64 = 0.40;
const WEIGHT_OPEN_INTEREST: f64 = 0.30;
const WEIGHT_SPREAD: f64 = 0.20;
const WEIGHT_IV: f64 = 0.10;

/// Open-interest scale for the saturating liquidity term: an OI equal to
/// this scores 0.5.
const OI_SCALE: f64 = 1000.0;

/// Spread term when the source has no two-sided quotes to measure.
const SPREAD_TERM_UNQUOTED: f64 = 0.5;

pub struct Screener {
    criteria: ScreeningCriteria,
    solver: SolverParams,
    risk_free_rate: f64,
}

impl Screener {
    pub fn new(criteria: ScreeningCriteria, solver: SolverParams, risk_free_rate: f64) -> Self {
        Self {
            criteria,
            solver,
            risk_free_rate,
        }
    }

    /// Screen the chain of `underlying` for the given signal direction.
    ///
    /// Buy signals screen calls; sell signals screen puts. Returns the
    /// top candidate, or `Ok(None)` when nothing passes.
    pub async fn best_candidate(
        &self,
        source: &dyn OptionsDataSource,
        underlying: &str,
        underlying_price: f64,
        side: SignalSide,
        as_of: NaiveDate,
    ) -> Result<Option<ScoredCandidate>, EngineError> {
        if underlying_price <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "underlying_price must be positive, got {underlying_price}"
            )));
        }

        let chain = source.fetch_chain(underlying, as_of).await?;
        let quoted = source.has_quoted_iv();
        let right = OptionRight::from_signal_side(side);

        let total = chain.len();
        let mut candidates: Vec<ScoredCandidate> = Vec::new();
        for quote in chain {
            if let Some(candidate) =
                self.evaluate(&quote, right, underlying_price, quoted, as_of)
            {
                candidates.push(candidate);
            }
        }

        // Deterministic ranking: score, then open interest, then symbol.
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.quote.open_interest.cmp(&a.quote.open_interest))
                .then(a.quote.contract_symbol.cmp(&b.quote.contract_symbol))
        });

        match candidates.into_iter().next() {
            Some(best) => {
                info!(
                    underlying,
                    source = source.name(),
                    contract = %best.quote.contract_symbol,
                    score = best.score,
                    delta = best.greeks.delta,
                    scanned = total,
                    "screener selected candidate"
                );
                Ok(Some(best))
            }
            None => {
                info!(
                    underlying,
                    source = source.name(),
                    scanned = total,
                    "no contract passed screening"
                );
                Ok(None)
            }
        }
    }

    /// Run one quote through hard filters, greeks, and scoring.
    fn evaluate(
        &self,
        quote: &OptionQuote,
        right: OptionRight,
        underlying_price: f64,
        quoted_source: bool,
        as_of: NaiveDate,
    ) -> Option<ScoredCandidate> {
        let c = &self.criteria;

        if quote.right != right {
            return None;
        }

        let dte = quote.dte(as_of);
        if dte < c.dte_min || dte > c.dte_max {
            return None;
        }

        if quote.open_interest < c.min_open_interest || quote.volume < c.min_volume {
            return None;
        }

        // Quoted sources must show a live two-sided market; entry premium
        // is the mid. Close-only sources use the settlement price and the
        // spread filter does not apply.
        let (premium, spread_pct) = if quoted_source {
            let premium = quote.mid()?;
            let spread = quote.spread_pct()?;
            if spread > c.max_spread_pct {
                return None;
            }
            (premium, Some(spread))
        } else {
            (quote.last_price, None)
        };

        if premium < c.min_price || premium > c.max_price {
            return None;
        }

        let inputs = PriceInputs {
            underlying_price,
            strike: quote.strike,
            time_to_expiry_years: dte as f64 / 365.0,
            risk_free_rate: self.risk_free_rate,
            right,
        };

        let greeks = match self.greeks_for(quote, &inputs, premium) {
            Ok(g) => g,
            Err(err) => {
                debug!(
                    contract = %quote.contract_symbol,
                    %err,
                    "excluding contract, greeks unavailable"
                );
                return None;
            }
        };

        let abs_delta = greeks.delta.abs();
        if abs_delta < c.delta_min || abs_delta > c.delta_max {
            return None;
        }

        let score = self.score(abs_delta, quote.open_interest, spread_pct, greeks.iv);
        Some(ScoredCandidate {
            quote: quote.clone(),
            greeks,
            score,
            dte,
            premium,
        })
    }

    /// Greeks from the quoted IV when present, otherwise from IV solved
    /// against the observed premium.
    fn greeks_for(
        &self,
        quote: &OptionQuote,
        inputs: &PriceInputs,
        premium: f64,
    ) -> Result<GreeksResult, EngineError> {
        let iv = match quote.implied_volatility {
            Some(iv) if iv > 0.0 => iv,
            _ => pricing::solve_implied_volatility(inputs, premium, &self.solver)?,
        };
        pricing::price(inputs, iv)
    }

    /// Composite score in [0, 1], higher is better. Every sub-term is
    /// clamped to [0, 1] before weighting.
    fn score(
        &self,
        abs_delta: f64,
        open_interest: u32,
        spread_pct: Option<f64>,
        iv: f64,
    ) -> f64 {
        let c = &self.criteria;

        let half_window = c.delta_half_window();
        let delta_term = if half_window > 0.0 {
            1.0 - ((abs_delta - c.target_delta()).abs() / half_window).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let oi = f64::from(open_interest);
        let oi_term = oi / (oi + OI_SCALE);

        let spread_term = match spread_pct {
            Some(s) if c.max_spread_pct > 0.0 => 1.0 - (s / c.max_spread_pct).clamp(0.0, 1.0),
            Some(_) => 0.0,
            None => SPREAD_TERM_UNQUOTED,
        };

        let iv_term = 1.0 / (1.0 + iv.max(0.0));

        WEIGHT_DELTA * delta_term
            + WEIGHT_OPEN_INTEREST * oi_term
            + WEIGHT_SPREAD * spread_term
            + WEIGHT_IV * iv_term
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
