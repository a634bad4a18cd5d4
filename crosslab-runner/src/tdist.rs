//! Student t distribution and the fold-level t-test.
//!
//! Implements from first principles:
//! - Lanczos approximation for ln(Gamma)
//! - Regularized incomplete beta function (continued fraction)
//! - Student's t CDF and two-sided p-values for regression t-statistics
//! - One-sided t-test (H0: mean = 0, H1: mean > 0) on fold test Sharpes
//!
//! The fold-level test treats a handful of Sharpe ratios as i.i.d. normal
//! draws; the p-value ranks walk-forward runs, it is not a literal error rate.

use serde::{Deserialize, Serialize};

// ─── Math primitives ─────────────────────────────────────────────────

#[allow(clippy::excessive_precision)]
const LANCZOS: [f64; 9] = [
    0.99999999999980993,
    676.5203681218851,
    -1259.1392167224028,
    771.32342877765313,
    -176.61502916214059,
    12.507343278686905,
    -0.13857109526572012,
    9.9843695780195716e-6,
    1.5056327351493116e-7,
];

/// ln(Gamma(x)) by the Lanczos approximation (g = 7, n = 9).
pub(crate) fn ln_gamma(x: f64) -> f64 {
    use std::f64::consts::PI;

    if x < 0.5 {
        let s = (PI * x).sin().abs();
        if s < 1e-300 {
            return f64::INFINITY;
        }
        return PI.ln() - s.ln() - ln_gamma(1.0 - x);
    }

    let z = x - 1.0;
    let series = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (z + i as f64));
    let t = z + 7.5;
    0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + series.ln()
}

/// I_x(a, b) via the modified Lentz continued fraction.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) {
        return f64::NAN;
    }
    if x == 0.0 || x == 1.0 {
        return x;
    }
    if x > (a + 1.0) / (a + b + 2.0) {
        return 1.0 - incomplete_beta(b, a, 1.0 - x);
    }

    const TINY: f64 = 1e-30;
    const EPS: f64 = 1e-14;
    let clamp = |v: f64| if v.abs() < TINY { TINY } else { v };

    let front = (a * x.ln() + b * (1.0 - x).ln() + ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b))
        .exp()
        / a;

    let mut c = 1.0;
    let mut d = 1.0 / clamp(1.0 - (a + b) * x / (a + 1.0));
    let mut f = d;
    for m in 1..=200 {
        let m = m as f64;
        let even = m * (b - m) * x / ((a + 2.0 * m - 1.0) * (a + 2.0 * m));
        d = 1.0 / clamp(1.0 + even * d);
        c = clamp(1.0 + even / c);
        f *= c * d;

        let odd = -(a + m) * (a + b + m) * x / ((a + 2.0 * m) * (a + 2.0 * m + 1.0));
        d = 1.0 / clamp(1.0 + odd * d);
        c = clamp(1.0 + odd / c);
        let step = c * d;
        f *= step;
        if (step - 1.0).abs() < EPS {
            break;
        }
    }
    front * f
}

/// P(T <= t) for Student's t with `df` degrees of freedom.
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if df <= 0.0 || t.is_nan() {
        return f64::NAN;
    }
    if t == 0.0 {
        return 0.5;
    }
    if t.is_infinite() {
        return if t > 0.0 { 1.0 } else { 0.0 };
    }
    let tail = 0.5 * incomplete_beta(df / 2.0, 0.5, df / (df + t * t));
    if t > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Two-sided p-value P(|T| >= |t|).
pub fn two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return if t.is_nan() { f64::NAN } else { 0.0 };
    }
    (2.0 * (1.0 - t_cdf(t.abs(), df))).clamp(0.0, 1.0)
}

// ─── Fold-level test ─────────────────────────────────────────────────

/// Result of a one-sided t-test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    /// mean / (std / sqrt(n))
    pub t_statistic: f64,
    /// P(T > t) under H0
    pub p_value: f64,
    pub df: f64,
}

/// One-sided t-test of H0: mean = 0 against H1: mean > 0.
///
/// `None` for fewer than two values. Identical values have no spread: a
/// positive mean is reported as certain, anything else as uninformative.
pub fn one_sided_t_test(values: &[f64]) -> Option<TTestResult> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let df = n - 1.0;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / df;
    let se = (var / n).sqrt();

    if se < 1e-15 {
        let (t_statistic, p_value) = if mean > 0.0 {
            (f64::INFINITY, 0.0)
        } else {
            (0.0, 0.5)
        };
        return Some(TTestResult {
            t_statistic,
            p_value,
            df,
        });
    }

    let t_statistic = mean / se;
    Some(TTestResult {
        t_statistic,
        p_value: 1.0 - t_cdf(t_statistic, df),
        df,
    })
}
