//! PortfolioCombiner: blends sleeve return series into one series.
//!
//! Blending happens at the return level: the combined bar is the weighted sum
//! of the sleeves' net return, gross return, turnover and cost for that bar,
//! so `net = gross - cost` still holds for the combined series.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crosslab_core::engine::{rebase_equity, SleeveBar, SleeveResult};
use crosslab_core::stats::sample_std;

use crate::metrics::sharpe_ratio;

/// How sleeve weights are chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MixMethod {
    /// 1/N on every sleeve.
    EqualWeight,
    /// Inverse trailing volatility, re-estimated every `rebalance_every` bars.
    EqualVol {
        vol_lookback: usize,
        rebalance_every: usize,
    },
    /// Fixed weights maximizing in-sample Sharpe on a simplex grid.
    StaticOptimized {
        #[serde(default = "default_step")]
        step: f64,
        /// Optimize on the first `train_bars` bars only; `None` uses the whole series.
        #[serde(default)]
        train_bars: Option<usize>,
    },
    /// User-fixed weights, one per sleeve.
    Static { weights: Vec<f64> },
}

fn default_step() -> f64 {
    0.02
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    pub method: MixMethod,
    /// Permit weights whose sum exceeds 1.
    #[serde(default)]
    pub allow_leverage: bool,
}

impl MixConfig {
    pub fn new(method: MixMethod) -> Self {
        Self {
            method,
            allow_leverage: false,
        }
    }

    pub fn equal_weight() -> Self {
        Self::new(MixMethod::EqualWeight)
    }

    pub fn equal_vol(vol_lookback: usize, rebalance_every: usize) -> Self {
        Self::new(MixMethod::EqualVol {
            vol_lookback,
            rebalance_every,
        })
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self::equal_vol(720, 24)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CombineError {
    #[error("no sleeves to combine")]
    NoSleeves,
    #[error("sleeve '{label}' is not aligned with the first sleeve")]
    Misaligned { label: String },
    #[error("expected {expected} weights, got {found}")]
    WeightCount { expected: usize, found: usize },
    #[error("weights must be finite and non-negative: {0:?}")]
    InvalidWeights(Vec<f64>),
    #[error("weights sum to {0}, above 1 without allow_leverage")]
    Leverage(f64),
    #[error("simplex step {0} must be in (0, 1] and divide 1 evenly")]
    InvalidStep(f64),
    #[error("equal-vol needs vol_lookback >= 2 and rebalance_every >= 1")]
    InvalidVolWindow,
}

/// Sleeve weights in force from bar `t` onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub t: usize,
    pub timestamp: NaiveDateTime,
    pub weights: Vec<f64>,
}

/// Combined series plus the sleeve-weight history that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub sleeves: Vec<String>,
    pub result: SleeveResult,
    pub weights: Vec<WeightSnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioCombiner {
    config: MixConfig,
}

impl PortfolioCombiner {
    pub fn new(config: MixConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    /// Combine sleeves that share one timestamp grid.
    pub fn combine(&self, sleeves: &[SleeveResult]) -> Result<CombinedResult, CombineError> {
        check_aligned(sleeves)?;
        let schedule: Vec<(usize, Vec<f64>)> = match &self.config.method {
            MixMethod::EqualVol {
                vol_lookback,
                rebalance_every,
            } => {
                check_vol_window(*vol_lookback, *rebalance_every)?;
                let n = sleeves[0].len();
                (0..n)
                    .step_by(*rebalance_every)
                    .map(|i| (i, inverse_vol_weights(sleeves, i, *vol_lookback)))
                    .collect()
            }
            MixMethod::StaticOptimized { step, train_bars } => {
                let end = train_bars.unwrap_or(usize::MAX).min(sleeves[0].len());
                let train: Vec<SleeveResult> = sleeves.iter().map(|s| prefix(s, end)).collect();
                vec![(0, optimize_simplex(&train, *step)?)]
            }
            _ => vec![(0, self.estimate_weights(sleeves)?)],
        };
        for (_, w) in &schedule {
            self.check_weights(w, sleeves.len())?;
        }
        Ok(blend(sleeves, &schedule))
    }

    /// One fixed weight vector estimated from `train` sleeves.
    ///
    /// Equal-vol uses the trailing `vol_lookback` bars at the end of the
    /// training series; the optimizer uses all of it.
    pub fn estimate_weights(&self, train: &[SleeveResult]) -> Result<Vec<f64>, CombineError> {
        check_aligned(train)?;
        let n = train.len();
        let w = match &self.config.method {
            MixMethod::EqualWeight => vec![1.0 / n as f64; n],
            MixMethod::EqualVol {
                vol_lookback,
                rebalance_every,
            } => {
                check_vol_window(*vol_lookback, *rebalance_every)?;
                let len = train[0].len();
                inverse_vol_weights(train, len, (*vol_lookback).min(len))
            }
            MixMethod::StaticOptimized { step, .. } => optimize_simplex(train, *step)?,
            MixMethod::Static { weights } => weights.clone(),
        };
        self.check_weights(&w, n)?;
        Ok(w)
    }

    /// Blend with fixed weights, e.g. test sleeves with train-estimated weights.
    pub fn apply(
        &self,
        sleeves: &[SleeveResult],
        weights: &[f64],
    ) -> Result<CombinedResult, CombineError> {
        check_aligned(sleeves)?;
        self.check_weights(weights, sleeves.len())?;
        Ok(blend(sleeves, &[(0, weights.to_vec())]))
    }

    fn check_weights(&self, w: &[f64], n: usize) -> Result<(), CombineError> {
        if w.len() != n {
            return Err(CombineError::WeightCount {
                expected: n,
                found: w.len(),
            });
        }
        if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(CombineError::InvalidWeights(w.to_vec()));
        }
        let sum: f64 = w.iter().sum();
        if !self.config.allow_leverage && sum > 1.0 + 1e-9 {
            return Err(CombineError::Leverage(sum));
        }
        Ok(())
    }
}

fn check_aligned(sleeves: &[SleeveResult]) -> Result<(), CombineError> {
    let first = sleeves.first().ok_or(CombineError::NoSleeves)?;
    for s in &sleeves[1..] {
        let same = s.len() == first.len()
            && s
                .bars
                .iter()
                .zip(&first.bars)
                .all(|(a, b)| a.t == b.t && a.timestamp == b.timestamp);
        if !same {
            return Err(CombineError::Misaligned {
                label: s.label.clone(),
            });
        }
    }
    Ok(())
}

fn check_vol_window(lookback: usize, every: usize) -> Result<(), CombineError> {
    if lookback < 2 || every == 0 {
        return Err(CombineError::InvalidVolWindow);
    }
    Ok(())
}

fn prefix(s: &SleeveResult, end: usize) -> SleeveResult {
    SleeveResult {
        bars: s.bars[..end].to_vec(),
        ..s.clone()
    }
}

/// Weights proportional to 1 / std of net returns over `[i - lookback, i)`.
///
/// Falls back to equal weights when the window is not yet full or any sleeve
/// has zero volatility there.
fn inverse_vol_weights(sleeves: &[SleeveResult], i: usize, lookback: usize) -> Vec<f64> {
    let n = sleeves.len();
    let equal = vec![1.0 / n as f64; n];
    if i < lookback || lookback < 2 {
        return equal;
    }
    let mut inv = Vec::with_capacity(n);
    for s in sleeves {
        let window: Vec<f64> = s.bars[i - lookback..i].iter().map(|b| b.net_return).collect();
        match sample_std(&window) {
            Some(v) if v > 1e-15 => inv.push(1.0 / v),
            _ => return equal,
        }
    }
    let total: f64 = inv.iter().sum();
    inv.into_iter().map(|x| x / total).collect()
}

/// Deterministic simplex search: every weight vector with entries in
/// multiples of `step` summing to 1, best in-sample Sharpe wins, first found
/// wins ties.
fn optimize_simplex(sleeves: &[SleeveResult], step: f64) -> Result<Vec<f64>, CombineError> {
    if !(step > 0.0 && step <= 1.0) {
        return Err(CombineError::InvalidStep(step));
    }
    let units = (1.0 / step).round() as usize;
    if (units as f64 * step - 1.0).abs() > 1e-9 {
        return Err(CombineError::InvalidStep(step));
    }

    let n = sleeves.len();
    let returns: Vec<Vec<f64>> = sleeves.iter().map(SleeveResult::net_returns).collect();
    let len = sleeves[0].len();
    let mut best: Option<(f64, Vec<usize>)> = None;
    let mut parts = vec![0; n];
    let mut mixed = vec![0.0; len];

    simplex_points(n, units, &mut parts, 0, &mut |k: &[usize]| {
        for (t, m) in mixed.iter_mut().enumerate() {
            *m = k
                .iter()
                .zip(&returns)
                .map(|(ki, r)| *ki as f64 / units as f64 * r[t])
                .sum();
        }
        let s = sharpe_ratio(&mixed, 1.0);
        if s.is_finite() && best.as_ref().map_or(true, |(b, _)| s > *b) {
            best = Some((s, k.to_vec()));
        }
    });

    let weights = match best {
        Some((sharpe, k)) => {
            debug!(sharpe, ?k, units, "simplex optimum");
            k.iter().map(|ki| *ki as f64 / units as f64).collect()
        }
        None => vec![1.0 / n as f64; n],
    };
    Ok(weights)
}

/// Visit every split of `remaining` units over `parts[idx..]`, first part descending.
fn simplex_points(
    n: usize,
    remaining: usize,
    parts: &mut [usize],
    idx: usize,
    visit: &mut dyn FnMut(&[usize]),
) {
    if idx == n - 1 {
        parts[idx] = remaining;
        visit(parts);
        return;
    }
    for k in (0..=remaining).rev() {
        parts[idx] = k;
        simplex_points(n, remaining - k, parts, idx + 1, visit);
    }
}

/// Blend with a piecewise-constant weight schedule starting at bar 0.
fn blend(sleeves: &[SleeveResult], schedule: &[(usize, Vec<f64>)]) -> CombinedResult {
    let first = &sleeves[0];
    let mut bars = Vec::with_capacity(first.len());
    let mut snapshots = Vec::with_capacity(schedule.len());
    let mut next = 0;
    let mut current: &[f64] = &[];

    for i in 0..first.len() {
        if next < schedule.len() && schedule[next].0 == i {
            current = &schedule[next].1;
            snapshots.push(WeightSnapshot {
                t: first.bars[i].t,
                timestamp: first.bars[i].timestamp,
                weights: current.to_vec(),
            });
            next += 1;
        }
        let mut bar = SleeveBar {
            timestamp: first.bars[i].timestamp,
            t: first.bars[i].t,
            net_return: 0.0,
            gross_return: 0.0,
            turnover: 0.0,
            cost: 0.0,
            equity: 0.0,
        };
        for (s, w) in sleeves.iter().zip(current) {
            let b = &s.bars[i];
            bar.net_return += w * b.net_return;
            bar.gross_return += w * b.gross_return;
            bar.turnover += w * b.turnover;
            bar.cost += w * b.cost;
        }
        bars.push(bar);
    }

    let labels: Vec<String> = sleeves.iter().map(|s| s.label.clone()).collect();
    CombinedResult {
        result: SleeveResult {
            label: format!("mix[{}]", labels.join("+")),
            fingerprint: None,
            bars: rebase_equity(bars),
            exclusions: sleeves.iter().flat_map(|s| s.exclusions.clone()).collect(),
            flat_rebalances: sleeves.iter().flat_map(|s| s.flat_rebalances.clone()).collect(),
            rebalance_count: sleeves.iter().map(|s| s.rebalance_count).sum(),
        },
        sleeves: labels,
        weights: snapshots,
    }
}
