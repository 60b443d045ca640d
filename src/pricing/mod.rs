//! Closed-form option pricing and greeks.
//!
//! European-style Black-Scholes pricing with delta, gamma, theta, and
//! vega computed in a single pass over the shared d1/d2 terms.
//!
//! Conventions:
//! - theta is returned per **calendar day** (annual theta / 365)
//! - vega is returned per **1% move in IV** (raw vega x 0.01)
//!
//! Adequate for US equity options given the use case (contract screening
//! and risk assessment, not market-making). American early exercise and
//! dividend adjustments are out of scope.

pub mod iv;

use crate::types::{EngineError, GreeksResult, OptionRight};

pub use iv::{solve_implied_volatility, SolverParams};

/// Days per year used for the theta per-day conversion.
const DAYS_PER_YEAR: f64 = 365.0;

/// Inputs shared by the pricer and the IV solver.
#[derive(Debug, Clone, Copy)]
pub struct PriceInputs {
    /// Current price of the underlying (S).
    pub underlying_price: f64,
    /// Strike price (K).
    pub strike: f64,
    /// Time to expiration in years (T).
    pub time_to_expiry_years: f64,
    /// Annualized risk-free rate (r).
    pub risk_free_rate: f64,
    pub right: OptionRight,
}

impl PriceInputs {
    fn validate(&self) -> Result<(), EngineError> {
        if self.underlying_price <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "underlying_price must be positive, got {}",
                self.underlying_price
            )));
        }
        if self.strike <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "strike must be positive, got {}",
                self.strike
            )));
        }
        if self.time_to_expiry_years <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "time_to_expiry_years must be positive, got {}",
                self.time_to_expiry_years
            )));
        }
        Ok(())
    }
}

/// Standard normal CDF via the error function:
/// Phi(x) = 0.5 * (1 + erf(x / sqrt(2))).
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF.
fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// d1 term: (ln(S/K) + (r + sigma^2/2) T) / (sigma sqrt(T)).
fn d1(inputs: &PriceInputs, sigma: f64) -> f64 {
    let numerator = (inputs.underlying_price / inputs.strike).ln()
        + (inputs.risk_free_rate + 0.5 * sigma * sigma) * inputs.time_to_expiry_years;
    numerator / (sigma * inputs.time_to_expiry_years.sqrt())
}

/// Price a European option and compute all greeks in one pass.
///
/// Fails with `InvalidInput` when `time_to_expiry_years <= 0` or
/// `volatility <= 0`.
pub fn price(inputs: &PriceInputs, volatility: f64) -> Result<GreeksResult, EngineError> {
    inputs.validate()?;
    if volatility <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "volatility must be positive, got {volatility}"
        )));
    }

    let s = inputs.underlying_price;
    let k = inputs.strike;
    let t = inputs.time_to_expiry_years;
    let r = inputs.risk_free_rate;
    let sqrt_t = t.sqrt();

    let d1_val = d1(inputs, volatility);
    let d2_val = d1_val - volatility * sqrt_t;
    let discount = (-r * t).exp();
    let pdf_d1 = normal_pdf(d1_val);

    let (px, delta) = match inputs.right {
        OptionRight::Call => (
            s * normal_cdf(d1_val) - k * discount * normal_cdf(d2_val),
            normal_cdf(d1_val),
        ),
        OptionRight::Put => (
            k * discount * normal_cdf(-d2_val) - s * normal_cdf(-d1_val),
            normal_cdf(d1_val) - 1.0,
        ),
    };

    // Gamma is identical for calls and puts
    let gamma = pdf_d1 / (s * volatility * sqrt_t);

    let common_term = -(s * pdf_d1 * volatility) / (2.0 * sqrt_t);
    let theta_annual = match inputs.right {
        OptionRight::Call => common_term - r * k * discount * normal_cdf(d2_val),
        OptionRight::Put => common_term + r * k * discount * normal_cdf(-d2_val),
    };

    Ok(GreeksResult {
        price: px,
        delta,
        gamma,
        theta: theta_annual / DAYS_PER_YEAR,
        vega: s * pdf_d1 * sqrt_t * 0.01,
        iv: volatility,
    })
}

/// Theoretical price only, without the greeks. Used by the IV solver's
/// objective function where the sensitivities are not needed.
pub fn price_only(inputs: &PriceInputs, volatility: f64) -> Result<f64, EngineError> {
    price(inputs, volatility).map(|g| g.price)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
