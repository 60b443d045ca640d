//! Implied-volatility solver.
//!
//! Bracketed bisection over the Black-Scholes price as a function of
//! volatility. Bisection trades speed for an unconditional convergence
//! guarantee inside the bracket, which matters more than iteration count
//! when solving a few hundred contracts per screening pass.

use tracing::trace;

use crate::types::EngineError;

use super::{price_only, PriceInputs};

/// Tunable knobs for the bisection solver.
#[derive(Debug, Clone, Copy)]
pub struct SolverParams {
    /// Lower volatility bound of the search bracket.
    pub lo: f64,
    /// Upper volatility bound of the search bracket.
    pub hi: f64,
    /// Stop when the bracket width falls below this.
    pub tolerance: f64,
    /// Hard iteration cap.
    pub max_iterations: u32,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            lo: 0.01,
            hi: 5.0,
            tolerance: 1e-8,
            max_iterations: 200,
        }
    }
}

/// Solve for the volatility at which the model price equals
/// `market_price`.
///
/// Fails with `NoConvergence` when the objective does not change sign
/// across `[lo, hi]` (no root bracketed) or when the iteration cap is
/// exhausted before the bracket narrows to tolerance. Fails with
/// `InvalidInput` on a non-positive market price or degenerate inputs.
pub fn solve_implied_volatility(
    inputs: &PriceInputs,
    market_price: f64,
    params: &SolverParams,
) -> Result<f64, EngineError> {
    if market_price <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "market_price must be positive, got {market_price}"
        )));
    }
    if params.lo <= 0.0 || params.hi <= params.lo {
        return Err(EngineError::InvalidInput(format!(
            "solver bounds must satisfy 0 < lo < hi, got [{}, {}]",
            params.lo, params.hi
        )));
    }

    let objective = |sigma: f64| -> Result<f64, EngineError> {
        Ok(price_only(inputs, sigma)? - market_price)
    };

    let mut lo = params.lo;
    let mut hi = params.hi;
    let f_lo = objective(lo)?;
    let f_hi = objective(hi)?;

    if f_lo == 0.0 {
        return Ok(lo);
    }
    if f_hi == 0.0 {
        return Ok(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return Err(EngineError::NoConvergence(format!(
            "market price {market_price:.4} not bracketed by vol range [{lo}, {hi}]"
        )));
    }

    let mut f_lo = f_lo;
    for iteration in 0..params.max_iterations {
        let mid = 0.5 * (lo + hi);
        let f_mid = objective(mid)?;

        if f_mid == 0.0 || (hi - lo) < params.tolerance {
            trace!(iteration, iv = mid, "implied vol converged");
            return Ok(mid);
        }

        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(EngineError::NoConvergence(format!(
        "bisection did not converge within {} iterations (bracket [{lo:.6}, {hi:.6}])",
        params.max_iterations
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::price;
    use crate::types::OptionRight;

    fn call_inputs() -> PriceInputs {
        PriceInputs {
            underlying_price: 100.0,
            strike: 100.0,
            time_to_expiry_years: 0.25,
            risk_free_rate: 0.05,
            right: OptionRight::Call,
        }
    }

    #[test]
    fn test_round_trip_recovers_vol() {
        let inputs = call_inputs();
        for true_vol in [0.15, 0.30, 0.80, 2.0] {
            let px = price(&inputs, true_vol).unwrap().price;
            let solved =
                solve_implied_volatility(&inputs, px, &SolverParams::default()).unwrap();
            assert!(
                (solved - true_vol).abs() < 1e-6,
                "wanted {true_vol}, solved {solved}"
            );
        }
    }

    #[test]
    fn test_put_round_trip() {
        let inputs = PriceInputs {
            right: OptionRight::Put,
            strike: 95.0,
            ..call_inputs()
        };
        let px = price(&inputs, 0.42).unwrap().price;
        let solved = solve_implied_volatility(&inputs, px, &SolverParams::default()).unwrap();
        assert!((solved - 0.42).abs() < 1e-6);
    }

    #[test]
    fn test_price_below_bracket_no_convergence() {
        // A price below the value at the lowest admissible vol cannot be
        // bracketed.
        let inputs = call_inputs();
        let floor = price(&inputs, 0.01).unwrap().price;
        let result =
            solve_implied_volatility(&inputs, floor * 0.5, &SolverParams::default());
        assert!(matches!(result, Err(EngineError::NoConvergence(_))));
    }

    #[test]
    fn test_price_above_bracket_no_convergence() {
        let inputs = call_inputs();
        let ceiling = price(&inputs, 5.0).unwrap().price;
        let result =
            solve_implied_volatility(&inputs, ceiling * 1.5, &SolverParams::default());
        assert!(matches!(result, Err(EngineError::NoConvergence(_))));
    }

    #[test]
    fn test_iteration_cap_exhausted() {
        let inputs = call_inputs();
        let px = price(&inputs, 0.30).unwrap().price;
        let params = SolverParams {
            tolerance: 1e-15,
            max_iterations: 3,
            ..SolverParams::default()
        };
        let result = solve_implied_volatility(&inputs, px, &params);
        assert!(matches!(result, Err(EngineError::NoConvergence(_))));
    }

    #[test]
    fn test_non_positive_market_price_rejected() {
        let inputs = call_inputs();
        for bad in [0.0, -1.25] {
            let result = solve_implied_volatility(&inputs, bad, &SolverParams::default());
            assert!(matches!(result, Err(EngineError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_bad_bounds_rejected() {
        let inputs = call_inputs();
        let params = SolverParams {
            lo: 2.0,
            hi: 1.0,
            ..SolverParams::default()
        };
        let result = solve_implied_volatility(&inputs, 5.0, &params);
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_custom_bracket() {
        let inputs = call_inputs();
        let px = price(&inputs, 0.25).unwrap().price;
        let params = SolverParams {
            lo: 0.05,
            hi: 1.0,
            ..SolverParams::default()
        };
        let solved = solve_implied_volatility(&inputs, px, &params).unwrap();
        assert!((solved - 0.25).abs() < 1e-6);
    }
}
