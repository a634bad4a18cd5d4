//! Small numeric kernels shared by the engine and the reporting layer.
//!
//! All functions are pure, take slices, and never allocate more than a
//! single pass needs. Sample statistics use the `n - 1` denominator.

use serde::{Deserialize, Serialize};

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (denominator `n - 1`). `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    Some(var.sqrt())
}

/// Simple linear regression `y = alpha + beta * x` fitted by least squares.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub alpha: f64,
    pub beta: f64,
    /// Number of (x, y) pairs used.
    pub n: usize,
}

impl LinearFit {
    /// Fitted residual for a single observation.
    pub fn residual(&self, x: f64, y: f64) -> f64 {
        y - (self.alpha + self.beta * x)
    }
}

/// Ordinary least squares of `y` on `x` with intercept.
///
/// Returns `None` with fewer than two pairs, mismatched lengths, or when `x`
/// has no variance (beta undefined).
pub fn ols(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        sxy += (xi - mx) * (yi - my);
        sxx += (xi - mx).powi(2);
    }
    if sxx < 1e-300 {
        return None;
    }
    let beta = sxy / sxx;
    Some(LinearFit {
        alpha: my - beta * mx,
        beta,
        n,
    })
}

/// Cross-sectional z-scores: `(v - mean) / sample_std`.
///
/// `None` when fewer than two values are present or the dispersion is zero,
/// in which case the cross-section carries no ranking information.
pub fn zscores(values: &[f64]) -> Option<Vec<f64>> {
    let m = mean(values)?;
    let sd = sample_std(values)?;
    if sd < 1e-15 || !sd.is_finite() {
        return None;
    }
    Some(values.iter().map(|v| (v - m) / sd).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_known_values() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&v), Some(2.5));
        let sd = sample_std(&v).unwrap();
        assert!((sd - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn std_needs_two_values() {
        assert!(sample_std(&[1.0]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn ols_recovers_exact_line() {
        let x = [0.01, -0.02, 0.03, 0.0, 0.015];
        let y: Vec<f64> = x.iter().map(|v| 0.001 + 1.5 * v).collect();
        let fit = ols(&x, &y).unwrap();
        assert!((fit.alpha - 0.001).abs() < 1e-12);
        assert!((fit.beta - 1.5).abs() < 1e-12);
        assert!(fit.residual(0.02, 0.001 + 1.5 * 0.02).abs() < 1e-12);
    }

    #[test]
    fn ols_rejects_constant_regressor() {
        assert!(ols(&[0.1, 0.1, 0.1], &[0.0, 1.0, 2.0]).is_none());
    }

    #[test]
    fn zscores_of_two_values_are_symmetric() {
        let z = zscores(&[0.02, -0.01]).unwrap();
        let expected = 1.0 / 2.0_f64.sqrt();
        assert!((z[0] - expected).abs() < 1e-12);
        assert!((z[1] + expected).abs() < 1e-12);
    }

    #[test]
    fn zscores_degenerate_when_flat() {
        assert!(zscores(&[0.5, 0.5, 0.5]).is_none());
        assert!(zscores(&[0.5]).is_none());
    }
}
