//! Performance metrics: pure functions over per-bar return series.
//!
//! Every metric takes a return series (and optionally a benchmark series) and
//! returns a scalar or a small record. Gaps (`None`) are dropped, never read as
//! zero returns; sleeve results have no gaps, benchmark series may.

use serde::{Deserialize, Serialize};

use crosslab_core::engine::SleeveResult;
use crosslab_core::stats::{mean, ols, sample_std};

use crate::tdist::two_sided_p;

/// Hourly bars, 24 * 365.
pub const HOURLY_BARS_PER_YEAR: f64 = 8_760.0;

/// Annualization and inference settings shared by every report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub bars_per_year: f64,
    /// Newey-West max lags for alpha/beta standard errors; `None` for plain OLS.
    #[serde(default)]
    pub hac_lags: Option<usize>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            bars_per_year: HOURLY_BARS_PER_YEAR,
            hac_lags: Some(24),
        }
    }
}

/// Aggregate performance of one return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub n_obs: usize,
    pub total_return: f64,
    /// Geometric annualized growth.
    pub cagr: f64,
    /// Arithmetic mean per bar times bars per year.
    pub ann_return: f64,
    pub ann_vol: f64,
    pub sharpe: f64,
    /// Sharpe of the pre-cost series (equal to `sharpe` for plain return series).
    pub gross_sharpe: f64,
    pub max_drawdown: f64,
    pub mean_turnover: f64,
    pub ann_turnover: f64,
    /// Annualized cost as a fraction of equity.
    pub ann_cost_drag: f64,
}

impl PerformanceMetrics {
    /// Metrics of a simulated sleeve, including turnover and cost drag.
    pub fn compute(result: &SleeveResult, bars_per_year: f64) -> Self {
        let net = result.net_returns();
        let gross = result.gross_returns();
        let n = net.len();
        let mut m = Self::from_observed(&net, bars_per_year);
        m.gross_sharpe = sharpe_ratio(&gross, bars_per_year);
        if n > 0 {
            m.mean_turnover = result.mean_turnover();
            m.ann_turnover = m.mean_turnover * bars_per_year;
            m.ann_cost_drag = result.total_cost() / n as f64 * bars_per_year;
        }
        m
    }

    /// Metrics of a series that may contain gaps.
    pub fn from_returns(returns: &[Option<f64>], bars_per_year: f64) -> Self {
        Self::from_observed(&observed(returns), bars_per_year)
    }

    fn from_observed(r: &[f64], bars_per_year: f64) -> Self {
        let sharpe = sharpe_ratio(r, bars_per_year);
        Self {
            n_obs: r.len(),
            total_return: total_return(r),
            cagr: cagr(r, bars_per_year),
            ann_return: annualized_return(r, bars_per_year),
            ann_vol: annualized_vol(r, bars_per_year),
            sharpe,
            gross_sharpe: sharpe,
            max_drawdown: max_drawdown(&equity_curve(r)),
            mean_turnover: 0.0,
            ann_turnover: 0.0,
            ann_cost_drag: 0.0,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Observed values of a gappy series, in order.
pub fn observed(returns: &[Option<f64>]) -> Vec<f64> {
    returns.iter().flatten().copied().collect()
}

/// Compounded equity after each bar, starting from 1.0.
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |eq, r| {
            *eq *= 1.0 + r;
            Some(*eq)
        })
        .collect()
}

/// Product of `(1 + r)` minus one.
pub fn total_return(returns: &[f64]) -> f64 {
    returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0
}

/// Geometric annualized return: `prod(1 + r)^(bars_per_year / n) - 1`.
///
/// A wiped-out series (equity at or below zero) reports -1.0.
pub fn cagr(returns: &[f64], bars_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let growth = 1.0 + total_return(returns);
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(bars_per_year / returns.len() as f64) - 1.0
}

pub fn annualized_return(returns: &[f64], bars_per_year: f64) -> f64 {
    mean(returns).unwrap_or(0.0) * bars_per_year
}

pub fn annualized_vol(returns: &[f64], bars_per_year: f64) -> f64 {
    sample_std(returns).unwrap_or(0.0) * bars_per_year.sqrt()
}

/// Annualized Sharpe ratio: `mean / std * sqrt(bars_per_year)`, zero risk-free rate.
///
/// Returns 0.0 with fewer than two observations or zero variance.
pub fn sharpe_ratio(returns: &[f64], bars_per_year: f64) -> f64 {
    let (Some(m), Some(sd)) = (mean(returns), sample_std(returns)) else {
        return 0.0;
    };
    if sd < 1e-15 {
        return 0.0;
    }
    m / sd * bars_per_year.sqrt()
}

/// Maximum drawdown as a negative fraction, measured from an initial equity of 1.0.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            worst = worst.min(eq / peak - 1.0);
        }
    }
    worst
}

/// Trailing annualized Sharpe over `window` bars.
///
/// A value is produced only when the full window is observed.
pub fn rolling_sharpe(
    returns: &[Option<f64>],
    window: usize,
    bars_per_year: f64,
) -> Vec<Option<f64>> {
    (0..returns.len())
        .map(|i| {
            if window < 2 || i + 1 < window {
                return None;
            }
            let w: Option<Vec<f64>> = returns[i + 1 - window..=i].iter().copied().collect();
            let w = w?;
            let sd = sample_std(&w)?;
            (sd >= 1e-15).then(|| mean(&w).unwrap_or(0.0) / sd * bars_per_year.sqrt())
        })
        .collect()
}

// ─── Newey-West inference ───────────────────────────────────────────

/// Mean per bar with its Newey-West t-statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanTStat {
    pub mean: f64,
    pub t_stat: f64,
    pub ann_mean: f64,
    pub n_obs: usize,
}

/// Newey-West (Bartlett kernel) t-statistic for the mean of `returns`.
pub fn newey_west_mean_tstat(
    returns: &[f64],
    max_lags: usize,
    bars_per_year: f64,
) -> Option<MeanTStat> {
    let n = returns.len();
    let m = mean(returns)?;
    let e: Vec<f64> = returns.iter().map(|r| r - m).collect();
    let mut s = e.iter().map(|x| x * x).sum::<f64>();
    for lag in 1..=max_lags.min(n.saturating_sub(1)) {
        let w = bartlett(lag, max_lags);
        let gamma: f64 = (lag..n).map(|t| e[t] * e[t - lag]).sum();
        s += 2.0 * w * gamma;
    }
    let se = (s.max(0.0)).sqrt() / n as f64;
    let t_stat = if se > 0.0 { m / se } else { 0.0 };
    Some(MeanTStat {
        mean: m,
        t_stat,
        ann_mean: m * bars_per_year,
        n_obs: n,
    })
}

fn bartlett(lag: usize, max_lags: usize) -> f64 {
    1.0 - lag as f64 / (max_lags as f64 + 1.0)
}

// ─── Alpha / beta ───────────────────────────────────────────────────

/// OLS of strategy returns on benchmark returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaBeta {
    /// Intercept per bar.
    pub alpha: f64,
    pub alpha_ann: f64,
    pub alpha_t: f64,
    pub alpha_p: f64,
    pub beta: f64,
    pub beta_t: f64,
    pub beta_p: f64,
    pub r_squared: f64,
    pub n_obs: usize,
    /// Lags used for Newey-West standard errors; `None` for classical OLS errors.
    pub hac_lags: Option<usize>,
}

/// Regress `strategy` on `benchmark` over bars where both are observed.
///
/// `None` when fewer than three paired observations remain or the benchmark
/// has no variance.
pub fn alpha_beta(
    strategy: &[Option<f64>],
    benchmark: &[Option<f64>],
    config: &ReportConfig,
) -> Option<AlphaBeta> {
    let (x, y): (Vec<f64>, Vec<f64>) = strategy
        .iter()
        .zip(benchmark)
        .filter_map(|(s, b)| Some((b.as_ref().copied()?, s.as_ref().copied()?)))
        .unzip();
    let n = x.len();
    if n < 3 {
        return None;
    }
    let fit = ols(&x, &y)?;
    let resid: Vec<f64> = x.iter().zip(&y).map(|(xi, yi)| fit.residual(*xi, *yi)).collect();

    let my = mean(&y)?;
    let sst: f64 = y.iter().map(|v| (v - my).powi(2)).sum();
    let ssr: f64 = resid.iter().map(|e| e * e).sum();
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { 0.0 };

    let (var_alpha, var_beta) = match config.hac_lags {
        Some(lags) => hac_variances(&x, &resid, lags)?,
        None => classical_variances(&x, ssr)?,
    };
    let df = (n - 2) as f64;
    let t = |coef: f64, var: f64| if var > 0.0 { coef / var.sqrt() } else { 0.0 };
    let alpha_t = t(fit.alpha, var_alpha);
    let beta_t = t(fit.beta, var_beta);

    Some(AlphaBeta {
        alpha: fit.alpha,
        alpha_ann: fit.alpha * config.bars_per_year,
        alpha_t,
        alpha_p: two_sided_p(alpha_t, df),
        beta: fit.beta,
        beta_t,
        beta_p: two_sided_p(beta_t, df),
        r_squared,
        n_obs: n,
        hac_lags: config.hac_lags,
    })
}

/// Classical OLS coefficient variances `s^2 (X'X)^-1`.
fn classical_variances(x: &[f64], ssr: f64) -> Option<(f64, f64)> {
    let n = x.len() as f64;
    let mx = mean(x)?;
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let s2 = ssr / (n - 2.0);
    Some((s2 * (1.0 / n + mx * mx / sxx), s2 / sxx))
}

/// Newey-West sandwich `(X'X)^-1 S (X'X)^-1` for regressors `[1, x]`.
fn hac_variances(x: &[f64], resid: &[f64], lags: usize) -> Option<(f64, f64)> {
    let n = x.len();
    let sx: f64 = x.iter().sum();
    let sxx: f64 = x.iter().map(|v| v * v).sum();
    let det = n as f64 * sxx - sx * sx;
    if det.abs() < 1e-300 {
        return None;
    }
    let bread = [[sxx / det, -sx / det], [-sx / det, n as f64 / det]];

    // score vectors u_t = e_t * [1, x_t]
    let u: Vec<[f64; 2]> = x.iter().zip(resid).map(|(xi, e)| [*e, e * xi]).collect();
    let mut meat = [[0.0; 2]; 2];
    for ut in &u {
        add_outer(&mut meat, ut, ut, 1.0);
    }
    for lag in 1..=lags.min(n.saturating_sub(1)) {
        let w = bartlett(lag, lags);
        for t in lag..n {
            add_outer(&mut meat, &u[t], &u[t - lag], w);
            add_outer(&mut meat, &u[t - lag], &u[t], w);
        }
    }

    let cov = mat_mul(&mat_mul(&bread, &meat), &bread);
    Some((cov[0][0], cov[1][1]))
}

fn add_outer(m: &mut [[f64; 2]; 2], a: &[f64; 2], b: &[f64; 2], w: f64) {
    for i in 0..2 {
        for j in 0..2 {
            m[i][j] += w * a[i] * b[j];
        }
    }
}

fn mat_mul(a: &[[f64; 2]; 2], b: &[[f64; 2]; 2]) -> [[f64; 2]; 2] {
    let mut out = [[0.0; 2]; 2];
    for i in 0..2 {
        for j in 0..2 {
            out[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j];
        }
    }
    out
}
