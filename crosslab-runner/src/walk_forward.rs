//! Walk-forward validation: fold construction, train-side selection, OOS evaluation.
//!
//! For every fold the validator grid-searches the candidate set on the train
//! range (net Sharpe), picks one configuration, runs it on the test range and
//! keeps only the test bars. Test windows may read train-period history for
//! their warm-up, never anything after their own bars. Test results are
//! concatenated in fold order into one out-of-sample series.
//!
//! Degradation ratio (mean test Sharpe / mean train Sharpe) and a one-sided
//! t-test on fold test Sharpes flag overfitting of the parameter search.

use std::ops::Range;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crosslab_core::data::ReturnPanel;
use crosslab_core::domain::ConfigHash;
use crosslab_core::engine::{EngineError, SleeveResult, SleeveRunner};
use crosslab_core::signal::SignalConfig;

use crate::combiner::{CombineError, MixConfig, PortfolioCombiner};
use crate::metrics::{sharpe_ratio, PerformanceMetrics};
use crate::tdist::{one_sided_t_test, TTestResult};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldMode {
    /// Train range starts at the first bar and grows.
    Expanding,
    /// Train range has fixed length and slides.
    Rolling,
}

/// Fold construction parameters, in bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldConfig {
    pub mode: FoldMode,
    pub train_bars: usize,
    pub test_bars: usize,
    /// Advance between consecutive folds; defaults to `test_bars`.
    #[serde(default)]
    pub step: Option<usize>,
    /// First bar of the first train range.
    #[serde(default)]
    pub offset: usize,
}

impl FoldConfig {
    pub fn expanding(train_bars: usize, test_bars: usize) -> Self {
        Self {
            mode: FoldMode::Expanding,
            train_bars,
            test_bars,
            step: None,
            offset: 0,
        }
    }

    pub fn rolling(train_bars: usize, test_bars: usize) -> Self {
        Self {
            mode: FoldMode::Rolling,
            ..Self::expanding(train_bars, test_bars)
        }
    }

    /// 365-day train, 90-day test on hourly bars.
    pub fn hourly_default() -> Self {
        Self::expanding(365 * 24, 90 * 24)
    }

    pub fn step(&self) -> usize {
        self.step.unwrap_or(self.test_bars)
    }

    pub fn validate(&self) -> Result<(), WalkForwardError> {
        if self.train_bars == 0 {
            return Err(WalkForwardError::ZeroWindow("train_bars"));
        }
        if self.test_bars == 0 {
            return Err(WalkForwardError::ZeroWindow("test_bars"));
        }
        if self.step() < self.test_bars {
            return Err(WalkForwardError::OverlappingTests {
                step: self.step(),
                test_bars: self.test_bars,
            });
        }
        Ok(())
    }
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self::hourly_default()
    }
}

// ─── Folds ───────────────────────────────────────────────────────────

/// One train/test split, as half-open bar index ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl Fold {
    pub fn train(&self) -> Range<usize> {
        self.train_start..self.train_end
    }

    pub fn test(&self) -> Range<usize> {
        self.test_start..self.test_end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
    /// The data ends inside this fold's test window.
    PartialTest { available: usize, required: usize },
    /// No candidate's warm-up fits in the train range.
    NoFeasibleCandidate {
        sleeve: String,
        train_bars: usize,
        min_warmup: usize,
    },
}

/// A fold that was planned or attempted but produced no test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFold {
    pub fold: Fold,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldPlan {
    pub folds: Vec<Fold>,
    pub skipped: Vec<SkippedFold>,
}

/// Split `n_bars` into walk-forward folds.
///
/// - Expanding: train = [offset, train_end), train_end grows by `step`
/// - Rolling: train = [train_end - train_bars, train_end)
/// - Test = [train_end, train_end + test_bars)
///
/// A trailing fold whose test window runs past the data is reported as skipped.
pub fn create_folds(n_bars: usize, config: &FoldConfig) -> Result<FoldPlan, WalkForwardError> {
    config.validate()?;
    let required = config.offset + config.train_bars + config.test_bars;
    if required > n_bars {
        return Err(WalkForwardError::InsufficientData { n_bars, required });
    }

    let mut folds = Vec::new();
    let mut skipped = Vec::new();
    let mut train_end = config.offset + config.train_bars;
    while train_end < n_bars {
        let train_start = match config.mode {
            FoldMode::Expanding => config.offset,
            FoldMode::Rolling => train_end - config.train_bars,
        };
        let fold = Fold {
            index: folds.len() + skipped.len(),
            train_start,
            train_end,
            test_start: train_end,
            test_end: train_end + config.test_bars,
        };
        if fold.test_end > n_bars {
            skipped.push(SkippedFold {
                fold,
                reason: SkipReason::PartialTest {
                    available: n_bars - train_end,
                    required: config.test_bars,
                },
            });
            break;
        }
        folds.push(fold);
        train_end += config.step();
    }
    Ok(FoldPlan { folds, skipped })
}

// ─── Results ─────────────────────────────────────────────────────────

/// How the degradation ratio was computed (or why it wasn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationFlag {
    /// Train Sharpe >= 0.1, ratio computed normally.
    Normal,
    /// Train Sharpe < 0.1, using difference metric (test - train) instead.
    LowTrainSharpe,
    /// Train Sharpe is negative, ratio skipped entirely.
    NegativeTrainSharpe,
    /// Train Sharpe positive (>= 0.1) but test Sharpe negative: clamped to 0.0.
    FailedTest,
    /// No fold completed.
    InsufficientData,
}

/// Per-fold outcome of a single-sleeve walk-forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: Fold,
    pub train_from: NaiveDateTime,
    pub test_from: NaiveDateTime,
    pub test_to: NaiveDateTime,
    pub selected: SignalConfig,
    pub fingerprint: ConfigHash,
    pub train_sharpe: f64,
    pub train_mean_turnover: f64,
    pub test: PerformanceMetrics,
    pub candidates: usize,
    pub infeasible: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub folds: Vec<FoldReport>,
    pub skipped: Vec<SkippedFold>,
    /// Test windows concatenated in time order.
    pub oos: SleeveResult,
    pub oos_metrics: PerformanceMetrics,
    pub mean_train_sharpe: f64,
    pub mean_test_sharpe: f64,
    /// `None` when the ratio cannot be computed (see `degradation_flag`).
    pub degradation_ratio: Option<f64>,
    pub degradation_flag: DegradationFlag,
    /// H0: mean fold test Sharpe = 0, H1: > 0.
    pub t_test: Option<TTestResult>,
}

/// Selected configuration of one sleeve in one mixed fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveSelection {
    pub sleeve: String,
    pub selected: SignalConfig,
    pub fingerprint: ConfigHash,
    pub train_sharpe: f64,
    pub test_sharpe: f64,
    pub candidates: usize,
    pub infeasible: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixFoldReport {
    pub fold: Fold,
    pub test_from: NaiveDateTime,
    pub test_to: NaiveDateTime,
    pub sleeves: Vec<SleeveSelection>,
    /// Mix weights estimated on the train sleeves, one per sleeve.
    pub weights: Vec<f64>,
    pub train_sharpe: f64,
    pub test: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixWalkForwardResult {
    pub folds: Vec<MixFoldReport>,
    pub skipped: Vec<SkippedFold>,
    pub oos: SleeveResult,
    pub oos_metrics: PerformanceMetrics,
    pub mean_train_sharpe: f64,
    pub mean_test_sharpe: f64,
    pub degradation_ratio: Option<f64>,
    pub degradation_flag: DegradationFlag,
    pub t_test: Option<TTestResult>,
}

/// A named sleeve and the candidates searched for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveSpec {
    pub name: String,
    pub candidates: Vec<SignalConfig>,
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("{0} must be at least one bar")]
    ZeroWindow(&'static str),
    #[error("step {step} is shorter than test_bars {test_bars}: test windows would overlap")]
    OverlappingTests { step: usize, test_bars: usize },
    #[error("insufficient data: {n_bars} bars < {required} needed for one fold")]
    InsufficientData { n_bars: usize, required: usize },
    #[error("empty candidate set for sleeve '{0}'")]
    NoCandidates(String),
    #[error("sleeve run failed on fold {fold}: {source}")]
    Engine {
        fold: usize,
        #[source]
        source: EngineError,
    },
    #[error("sleeve combination failed on fold {fold}: {source}")]
    Combine {
        fold: usize,
        #[source]
        source: CombineError,
    },
}

// ─── Validator ───────────────────────────────────────────────────────

/// Best train candidate of one sleeve in one fold.
struct Selection {
    config: SignalConfig,
    train: SleeveResult,
    sharpe: f64,
    candidates: usize,
    infeasible: usize,
}

enum FoldOutcome<T> {
    Done(T),
    Skipped(SkippedFold),
}

#[derive(Debug, Clone)]
pub struct WalkForwardValidator {
    runner: SleeveRunner,
    folds: FoldConfig,
    bars_per_year: f64,
}

impl WalkForwardValidator {
    pub fn new(runner: SleeveRunner, folds: FoldConfig, bars_per_year: f64) -> Self {
        Self {
            runner,
            folds,
            bars_per_year,
        }
    }

    pub fn fold_config(&self) -> &FoldConfig {
        &self.folds
    }

    /// Single-sleeve walk-forward over `candidates`.
    pub fn run(
        &self,
        returns: &ReturnPanel,
        candidates: &[SignalConfig],
    ) -> Result<WalkForwardResult, WalkForwardError> {
        if candidates.is_empty() {
            return Err(WalkForwardError::NoCandidates("sleeve".into()));
        }
        let plan = create_folds(returns.n_bars(), &self.folds)?;
        info!(
            folds = plan.folds.len(),
            candidates = candidates.len(),
            mode = ?self.folds.mode,
            "starting walk-forward"
        );

        let outcomes: Vec<FoldOutcome<(FoldReport, SleeveResult)>> = plan
            .folds
            .par_iter()
            .map(|fold| self.run_fold(returns, candidates, fold))
            .collect::<Result<_, _>>()?;

        let mut reports = Vec::new();
        let mut tests = Vec::new();
        let mut skipped = plan.skipped;
        for outcome in outcomes {
            match outcome {
                FoldOutcome::Done((report, test)) => {
                    reports.push(report);
                    tests.push(test);
                }
                FoldOutcome::Skipped(s) => skipped.push(s),
            }
        }
        skipped.sort_by_key(|s| s.fold.index);
        log_skipped(&skipped);

        let oos = concat_tests("oos", &tests);
        let oos_metrics = PerformanceMetrics::compute(&oos, self.bars_per_year);
        let train: Vec<f64> = reports.iter().map(|r| r.train_sharpe).collect();
        let test: Vec<f64> = reports.iter().map(|r| r.test.sharpe).collect();
        let stats = FoldStats::compute(&train, &test);

        info!(
            completed = reports.len(),
            skipped = skipped.len(),
            oos_sharpe = oos_metrics.sharpe,
            degradation = ?stats.flag,
            "walk-forward finished"
        );
        Ok(WalkForwardResult {
            folds: reports,
            skipped,
            oos,
            oos_metrics,
            mean_train_sharpe: stats.mean_train,
            mean_test_sharpe: stats.mean_test,
            degradation_ratio: stats.ratio,
            degradation_flag: stats.flag,
            t_test: stats.t_test,
        })
    }

    /// Multi-sleeve walk-forward.
    ///
    /// Per fold: select each sleeve on train, estimate mix weights from the
    /// selected train sleeves, then blend the test sleeves with those weights.
    pub fn run_mix(
        &self,
        returns: &ReturnPanel,
        sleeves: &[SleeveSpec],
        mix: &MixConfig,
    ) -> Result<MixWalkForwardResult, WalkForwardError> {
        if let Some(empty) = sleeves.iter().find(|s| s.candidates.is_empty()) {
            return Err(WalkForwardError::NoCandidates(empty.name.clone()));
        }
        if sleeves.is_empty() {
            return Err(WalkForwardError::NoCandidates("mix".into()));
        }
        let plan = create_folds(returns.n_bars(), &self.folds)?;
        let combiner = PortfolioCombiner::new(mix.clone());
        info!(
            folds = plan.folds.len(),
            sleeves = sleeves.len(),
            method = ?mix.method,
            "starting mixed walk-forward"
        );

        let outcomes: Vec<FoldOutcome<(MixFoldReport, SleeveResult)>> = plan
            .folds
            .par_iter()
            .map(|fold| self.run_mix_fold(returns, sleeves, &combiner, fold))
            .collect::<Result<_, _>>()?;

        let mut reports = Vec::new();
        let mut tests = Vec::new();
        let mut skipped = plan.skipped;
        for outcome in outcomes {
            match outcome {
                FoldOutcome::Done((report, test)) => {
                    reports.push(report);
                    tests.push(test);
                }
                FoldOutcome::Skipped(s) => skipped.push(s),
            }
        }
        skipped.sort_by_key(|s| s.fold.index);
        log_skipped(&skipped);

        let names: Vec<&str> = sleeves.iter().map(|s| s.name.as_str()).collect();
        let oos = concat_tests(&format!("oos:mix[{}]", names.join("+")), &tests);
        let oos_metrics = PerformanceMetrics::compute(&oos, self.bars_per_year);
        let train: Vec<f64> = reports.iter().map(|r| r.train_sharpe).collect();
        let test: Vec<f64> = reports.iter().map(|r| r.test.sharpe).collect();
        let stats = FoldStats::compute(&train, &test);

        info!(
            completed = reports.len(),
            skipped = skipped.len(),
            oos_sharpe = oos_metrics.sharpe,
            "mixed walk-forward finished"
        );
        Ok(MixWalkForwardResult {
            folds: reports,
            skipped,
            oos,
            oos_metrics,
            mean_train_sharpe: stats.mean_train,
            mean_test_sharpe: stats.mean_test,
            degradation_ratio: stats.ratio,
            degradation_flag: stats.flag,
            t_test: stats.t_test,
        })
    }

    fn run_fold(
        &self,
        returns: &ReturnPanel,
        candidates: &[SignalConfig],
        fold: &Fold,
    ) -> Result<FoldOutcome<(FoldReport, SleeveResult)>, WalkForwardError> {
        let sel = match self.select(returns, "sleeve", candidates, fold)? {
            Ok(sel) => sel,
            Err(skip) => return Ok(FoldOutcome::Skipped(skip)),
        };
        let test = self.run_test(returns, &sel.config, fold)?;
        let ts = returns.timestamps();
        let report = FoldReport {
            fold: *fold,
            train_from: ts[fold.train_start],
            test_from: ts[fold.test_start],
            test_to: ts[fold.test_end - 1],
            fingerprint: sel.config.fingerprint(),
            selected: sel.config,
            train_sharpe: sel.sharpe,
            train_mean_turnover: sel.train.mean_turnover(),
            test: PerformanceMetrics::compute(&test, self.bars_per_year),
            candidates: sel.candidates,
            infeasible: sel.infeasible,
        };
        debug!(
            fold = fold.index,
            selected = %report.selected.label(),
            train_sharpe = report.train_sharpe,
            test_sharpe = report.test.sharpe,
            "fold complete"
        );
        Ok(FoldOutcome::Done((report, test)))
    }

    fn run_mix_fold(
        &self,
        returns: &ReturnPanel,
        sleeves: &[SleeveSpec],
        combiner: &PortfolioCombiner,
        fold: &Fold,
    ) -> Result<FoldOutcome<(MixFoldReport, SleeveResult)>, WalkForwardError> {
        let mut selections = Vec::with_capacity(sleeves.len());
        for spec in sleeves {
            match self.select(returns, &spec.name, &spec.candidates, fold)? {
                Ok(sel) => selections.push(sel),
                Err(skip) => return Ok(FoldOutcome::Skipped(skip)),
            }
        }

        let combine_err = |source| WalkForwardError::Combine {
            fold: fold.index,
            source,
        };
        let train_sleeves: Vec<SleeveResult> = selections.iter().map(|s| s.train.clone()).collect();
        let weights = combiner
            .estimate_weights(&train_sleeves)
            .map_err(combine_err)?;
        let train_mix = combiner
            .apply(&train_sleeves, &weights)
            .map_err(combine_err)?;

        let test_sleeves = selections
            .iter()
            .map(|s| self.run_test(returns, &s.config, fold))
            .collect::<Result<Vec<_>, _>>()?;
        let test_mix = combiner
            .apply(&test_sleeves, &weights)
            .map_err(combine_err)?;

        let ts = returns.timestamps();
        let report = MixFoldReport {
            fold: *fold,
            test_from: ts[fold.test_start],
            test_to: ts[fold.test_end - 1],
            sleeves: sleeves
                .iter()
                .zip(&selections)
                .zip(&test_sleeves)
                .map(|((spec, sel), test)| SleeveSelection {
                    sleeve: spec.name.clone(),
                    fingerprint: sel.config.fingerprint(),
                    selected: sel.config.clone(),
                    train_sharpe: sel.sharpe,
                    test_sharpe: sharpe_ratio(&test.net_returns(), self.bars_per_year),
                    candidates: sel.candidates,
                    infeasible: sel.infeasible,
                })
                .collect(),
            weights,
            train_sharpe: sharpe_ratio(&train_mix.result.net_returns(), self.bars_per_year),
            test: PerformanceMetrics::compute(&test_mix.result, self.bars_per_year),
        };
        debug!(
            fold = fold.index,
            weights = ?report.weights,
            test_sharpe = report.test.sharpe,
            "mixed fold complete"
        );
        Ok(FoldOutcome::Done((report, test_mix.result)))
    }

    /// Grid-search `candidates` on the fold's train range.
    ///
    /// Highest train Sharpe wins; ties go to the lower mean turnover, then to
    /// the earlier candidate.
    fn select(
        &self,
        returns: &ReturnPanel,
        sleeve: &str,
        candidates: &[SignalConfig],
        fold: &Fold,
    ) -> Result<Result<Selection, SkippedFold>, WalkForwardError> {
        let train_bars = fold.train_end - fold.train_start;
        let feasible: Vec<(usize, &SignalConfig)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.warmup() < train_bars)
            .collect();
        let infeasible = candidates.len() - feasible.len();

        if feasible.is_empty() {
            let min_warmup = candidates.iter().map(SignalConfig::warmup).min().unwrap_or(0);
            return Ok(Err(SkippedFold {
                fold: *fold,
                reason: SkipReason::NoFeasibleCandidate {
                    sleeve: sleeve.to_string(),
                    train_bars,
                    min_warmup,
                },
            }));
        }

        let scored: Vec<(usize, SleeveResult, f64)> = feasible
            .par_iter()
            .map(|(i, cfg)| {
                let res = self
                    .runner
                    .run(returns, cfg, fold.train(), fold.train_start)
                    .map_err(|source| WalkForwardError::Engine {
                        fold: fold.index,
                        source,
                    })?;
                let s = sharpe_ratio(&res.net_returns(), self.bars_per_year);
                debug!(fold = fold.index, sleeve, candidate = %cfg.label(), sharpe = s, "train candidate");
                Ok((*i, res, if s.is_finite() { s } else { f64::NEG_INFINITY }))
            })
            .collect::<Result<_, WalkForwardError>>()?;

        // scored keeps candidate order, so strict comparisons favour the earlier one
        let best = scored.into_iter().reduce(|best, next| {
            let n = (next.2, next.1.mean_turnover());
            let b = (best.2, best.1.mean_turnover());
            if ranks_above(n, b) {
                next
            } else {
                best
            }
        });
        Ok(match best {
            Some((i, train, sharpe)) => Ok(Selection {
                config: candidates[i].clone(),
                train,
                sharpe,
                candidates: candidates.len(),
                infeasible,
            }),
            None => Err(SkippedFold {
                fold: *fold,
                reason: SkipReason::NoFeasibleCandidate {
                    sleeve: sleeve.to_string(),
                    train_bars,
                    min_warmup: 0,
                },
            }),
        })
    }

    fn run_test(
        &self,
        returns: &ReturnPanel,
        config: &SignalConfig,
        fold: &Fold,
    ) -> Result<SleeveResult, WalkForwardError> {
        self.runner
            .run(returns, config, fold.test(), fold.train_start)
            .map_err(|source| WalkForwardError::Engine {
                fold: fold.index,
                source,
            })
    }
}

fn concat_tests(label: &str, tests: &[SleeveResult]) -> SleeveResult {
    // fold test ranges are disjoint and increasing by construction
    SleeveResult::concat(label, tests).unwrap_or_else(|| SleeveResult {
        label: label.to_string(),
        fingerprint: None,
        bars: Vec::new(),
        exclusions: Vec::new(),
        flat_rebalances: Vec::new(),
        rebalance_count: 0,
    })
}

fn log_skipped(skipped: &[SkippedFold]) {
    for s in skipped {
        warn!(fold = s.fold.index, reason = ?s.reason, "fold skipped");
    }
}

// ─── Aggregate statistics ────────────────────────────────────────────

struct FoldStats {
    mean_train: f64,
    mean_test: f64,
    ratio: Option<f64>,
    flag: DegradationFlag,
    t_test: Option<TTestResult>,
}

impl FoldStats {
    fn compute(train: &[f64], test: &[f64]) -> Self {
        if test.is_empty() {
            return Self {
                mean_train: 0.0,
                mean_test: 0.0,
                ratio: None,
                flag: DegradationFlag::InsufficientData,
                t_test: None,
            };
        }
        let mean_train = train.iter().sum::<f64>() / train.len() as f64;
        let mean_test = test.iter().sum::<f64>() / test.len() as f64;
        let (ratio, flag) = compute_degradation_ratio(mean_train, mean_test);
        Self {
            mean_train,
            mean_test,
            ratio,
            flag,
            t_test: one_sided_t_test(test),
        }
    }
}

/// Degradation of test Sharpe against train Sharpe.
///
/// - train >= 0.1: ratio = test / train (Normal)
/// - 0 <= train < 0.1: difference = test - train (LowTrainSharpe)
/// - train < 0: skipped (NegativeTrainSharpe)
/// - train >= 0.1 but test < 0: clamped to 0.0 (FailedTest)
pub fn compute_degradation_ratio(
    mean_train_sharpe: f64,
    mean_test_sharpe: f64,
) -> (Option<f64>, DegradationFlag) {
    if mean_train_sharpe < 0.0 {
        (None, DegradationFlag::NegativeTrainSharpe)
    } else if mean_train_sharpe < 0.1 {
        (
            Some(mean_test_sharpe - mean_train_sharpe),
            DegradationFlag::LowTrainSharpe,
        )
    } else if mean_test_sharpe < 0.0 {
        (Some(0.0), DegradationFlag::FailedTest)
    } else {
        (
            Some(mean_test_sharpe / mean_train_sharpe),
            DegradationFlag::Normal,
        )
    }
}

/// Whether `next` beats `best`, each given as `(train Sharpe, mean turnover)`.
///
/// Higher Sharpe wins; equal Sharpe goes to the lower turnover. Non-finite
/// Sharpe ranks below every finite one. Full ties keep `best`.
fn ranks_above(next: (f64, f64), best: (f64, f64)) -> bool {
    let rank = |s: f64| if s.is_finite() { s } else { f64::NEG_INFINITY };
    let (ns, bs) = (rank(next.0), rank(best.0));
    ns > bs || (ns == bs && next.1 < best.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Fold creation ───────────────────────────────────────────

    #[test]
    fn expanding_folds_grow_train() {
        let plan = create_folds(1000, &FoldConfig::expanding(400, 100)).unwrap();
        assert_eq!(plan.folds.len(), 6);
        assert!(plan.skipped.is_empty());
        for (i, f) in plan.folds.iter().enumerate() {
            assert_eq!(f.train_start, 0);
            assert_eq!(f.train_end, 400 + 100 * i);
            assert_eq!(f.test(), f.train_end..f.train_end + 100);
        }
    }

    #[test]
    fn rolling_folds_keep_length() {
        let plan = create_folds(1000, &FoldConfig::rolling(400, 100)).unwrap();
        for f in &plan.folds {
            assert_eq!(f.train_end - f.train_start, 400);
        }
        assert_eq!(plan.folds[2].train_start, 200);
    }

    #[test]
    fn test_windows_disjoint_and_ordered() {
        let mut cfg = FoldConfig::rolling(300, 70);
        cfg.step = Some(90);
        cfg.offset = 15;
        let plan = create_folds(1000, &cfg).unwrap();
        for f in &plan.folds {
            assert!(f.train_end <= f.test_start);
            assert!(f.train_start >= 15);
        }
        for w in plan.folds.windows(2) {
            assert!(w[0].test_end <= w[1].test_start);
        }
    }

    #[test]
    fn partial_trailing_fold_reported() {
        let plan = create_folds(950, &FoldConfig::expanding(400, 100)).unwrap();
        assert_eq!(plan.folds.len(), 5);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(
            plan.skipped[0].reason,
            SkipReason::PartialTest {
                available: 50,
                required: 100
            }
        );
        assert_eq!(plan.skipped[0].fold.index, 5);
    }

    #[test]
    fn fold_config_rejects_bad_windows() {
        assert!(matches!(
            create_folds(100, &FoldConfig::expanding(0, 10)),
            Err(WalkForwardError::ZeroWindow("train_bars"))
        ));
        let mut cfg = FoldConfig::expanding(50, 20);
        cfg.step = Some(10);
        assert!(matches!(
            create_folds(100, &cfg),
            Err(WalkForwardError::OverlappingTests { .. })
        ));
        assert!(matches!(
            create_folds(60, &FoldConfig::expanding(50, 20)),
            Err(WalkForwardError::InsufficientData { .. })
        ));
    }

    #[test]
    fn fold_config_decodes_with_default_step() {
        let cfg: FoldConfig = toml::from_str(
            r#"
            mode = "rolling"
            train_bars = 8760
            test_bars = 2160
            "#,
        )
        .unwrap();
        assert_eq!(cfg.step(), 2160);
        assert_eq!(cfg.offset, 0);
    }

    // ─── Degradation ratio ───────────────────────────────────────

    #[test]
    fn degradation_cases() {
        let (r, f) = compute_degradation_ratio(2.0, 1.0);
        assert_eq!(f, DegradationFlag::Normal);
        assert!((r.unwrap() - 0.5).abs() < 1e-12);

        let (r, f) = compute_degradation_ratio(0.05, 0.03);
        assert_eq!(f, DegradationFlag::LowTrainSharpe);
        assert!((r.unwrap() + 0.02).abs() < 1e-12);

        let (r, f) = compute_degradation_ratio(-0.5, 0.3);
        assert_eq!(f, DegradationFlag::NegativeTrainSharpe);
        assert!(r.is_none());

        let (r, f) = compute_degradation_ratio(1.5, -0.3);
        assert_eq!(f, DegradationFlag::FailedTest);
        assert_eq!(r, Some(0.0));
    }

    #[test]
    fn no_folds_means_insufficient_data() {
        let s = FoldStats::compute(&[], &[]);
        assert_eq!(s.flag, DegradationFlag::InsufficientData);
        assert!(s.t_test.is_none());
    }

    #[test]
    fn equal_sharpe_goes_to_lower_turnover() {
        assert!(ranks_above((1.2, 0.05), (1.2, 0.10)));
        assert!(!ranks_above((1.2, 0.10), (1.2, 0.05)));
        assert!(!ranks_above((1.2, 0.05), (1.2, 0.05)));
        assert!(!ranks_above((1.1, 0.01), (1.2, 0.50)));
        assert!(ranks_above((1.3, 0.50), (1.2, 0.01)));
    }

    #[test]
    fn non_finite_sharpe_ranks_last() {
        assert!(ranks_above((-5.0, 1.0), (f64::NAN, 0.0)));
        assert!(!ranks_above((f64::NAN, 0.0), (-5.0, 1.0)));
        assert!(!ranks_above((f64::INFINITY, 0.0), (0.1, 1.0)));
        // two non-finite Sharpes fall back to turnover
        assert!(ranks_above((f64::NAN, 0.1), (f64::NEG_INFINITY, 0.2)));
    }
}
