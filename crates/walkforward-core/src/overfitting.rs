//! Multiple-testing corrections for backtested Sharpe ratios.
//!
//! A good-looking Sharpe from the best of N tried configurations is partly a
//! selection artifact. These adjustments (Bailey & López de Prado) quantify
//! how much, complementing the fold-dispersion statistics in the aggregate
//! results.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Deflated Sharpe ratio outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeflatedSharpe {
    /// Deflation z-score of the observed Sharpe against the null maximum.
    pub deflated_sharpe: f64,
    pub observed_sharpe: f64,
    /// Expected maximum Sharpe under the no-skill null given `num_trials`.
    pub expected_max_sharpe_null: f64,
    pub num_trials: usize,
    pub num_observations: usize,
    /// Probability of observing this Sharpe by chance alone.
    pub p_value: f64,
}

/// Deflate an observed Sharpe for selection bias across `num_trials` tested
/// configurations over `num_observations` returns.
///
/// `skewness`/`kurtosis` adjust the Sharpe standard error for non-Gaussian
/// returns; pass 0.0 for both if unknown.
pub fn deflated_sharpe_ratio(
    observed_sharpe: f64,
    num_trials: usize,
    num_observations: usize,
    skewness: f64,
    kurtosis: f64,
) -> DeflatedSharpe {
    if num_trials < 1 || num_observations < 3 {
        return DeflatedSharpe {
            deflated_sharpe: observed_sharpe,
            observed_sharpe,
            expected_max_sharpe_null: 0.0,
            num_trials,
            num_observations,
            p_value: 1.0,
        };
    }

    let n = num_trials as f64;
    let t = num_observations as f64;

    // Extreme value theory: E[max SR] ~= sqrt(2 ln N), Var ~= 1 / (2 ln N).
    // A single trial has nothing to deflate against.
    let (expected_max, std_max) = if num_trials > 1 {
        ((2.0 * n.ln()).sqrt(), (1.0 / (2.0 * n.ln())).sqrt())
    } else {
        (0.0, 0.0)
    };

    // Sharpe standard error adjusted for higher moments:
    // SE ~= sqrt((1 + SR^2/2 - skew*SR + kurt*SR^2/4) / T)
    let sr2 = observed_sharpe.powi(2);
    let se_num = 1.0 + sr2 / 2.0 - skewness * observed_sharpe + kurtosis * sr2 / 4.0;
    let se = (se_num.max(1.0 / t) / t).sqrt();

    let deflated = (observed_sharpe - expected_max) / (std_max + se);
    let p_value = 2.0 * (1.0 - standard_normal().cdf(deflated.abs()));

    DeflatedSharpe {
        deflated_sharpe: deflated,
        observed_sharpe,
        expected_max_sharpe_null: expected_max,
        num_trials,
        num_observations,
        p_value,
    }
}

/// Smallest number of return observations needed to distinguish
/// `expected_sharpe` from zero at the given confidence and power.
pub fn minimum_backtest_length(expected_sharpe: f64, confidence_level: f64, power: f64) -> usize {
    if expected_sharpe.abs() < 0.01 {
        return 10_000;
    }
    let normal = standard_normal();
    let z_alpha = normal.inverse_cdf(1.0 - (1.0 - confidence_level) / 2.0);
    let z_beta = normal.inverse_cdf(power);
    (((z_alpha + z_beta) / expected_sharpe).powi(2)).ceil() as usize
}

fn standard_normal() -> Normal {
    // Unit normal construction cannot fail.
    Normal::new(0.0, 1.0).unwrap()
}
