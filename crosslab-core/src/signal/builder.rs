//! SignalBuilder: turns a return panel into cross-sectional scores.
//!
//! Per rebalance bar `t`, for every asset with enough consecutive observed
//! history ending at `t - 1`:
//! 1. optionally residualize its returns against the benchmark with an OLS
//!    fit over the trailing `residual_window` (fitted once per rebalance),
//! 2. sum the lookback window (ending `skip` bars before `t - 1`) and sign it
//!    by the signal kind,
//! 3. z-score across assets, zero everything inside the band,
//! 4. divide survivors by trailing realized volatility.
//!
//! Returns at or after `t` are never read.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::config::{SignalConfig, SignalConfigError};
use super::score::{AssetScore, CrossSection, Exclusion, ExclusionReason, ScorePanel, SectionStatus};
use crate::data::ReturnPanel;
use crate::domain::AssetId;
use crate::schedule::Schedule;
use crate::stats::{ols, sample_std, zscores};

/// Errors that prevent a score panel from being built at all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalError {
    #[error("invalid signal config: {0}")]
    Config(#[from] SignalConfigError),
    #[error("benchmark '{0}' not in return panel")]
    UnknownBenchmark(AssetId),
    #[error("residual_window is set but no benchmark is configured")]
    MissingBenchmark,
    #[error("schedule end {end} exceeds panel length {n_bars}")]
    OutOfBounds { end: usize, n_bars: usize },
}

/// Builds score panels. Holds only the benchmark identity; all other
/// parameters arrive per call in a `SignalConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBuilder {
    benchmark: Option<AssetId>,
}

/// Per-asset intermediate values of one cross-section.
struct Candidate {
    asset: usize,
    raw: f64,
    vol: Option<f64>,
}

impl SignalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_benchmark(benchmark: AssetId) -> Self {
        Self {
            benchmark: Some(benchmark),
        }
    }

    pub fn benchmark(&self) -> Option<&AssetId> {
        self.benchmark.as_ref()
    }

    /// Score every rebalance bar of `schedule`.
    pub fn build(
        &self,
        returns: &ReturnPanel,
        config: &SignalConfig,
        schedule: &Schedule,
    ) -> Result<ScorePanel, SignalError> {
        config.validate()?;
        if schedule.end > returns.n_bars() {
            return Err(SignalError::OutOfBounds {
                end: schedule.end,
                n_bars: returns.n_bars(),
            });
        }
        let bench = self.residual_benchmark(returns, config)?;

        let mut panel = ScorePanel {
            assets: returns.assets().to_vec(),
            sections: Vec::new(),
            exclusions: Vec::new(),
        };
        for t in schedule.rebalance_points() {
            let (section, exclusions) =
                self.score_at(returns, config, bench, t, schedule.history_start);
            panel.sections.push(section);
            panel.exclusions.extend(exclusions);
        }

        debug!(
            config = %config.label(),
            sections = panel.sections.len(),
            exclusions = panel.exclusions.len(),
            "built score panel"
        );
        Ok(panel)
    }

    /// Resolve the benchmark column when residualization is requested.
    fn residual_benchmark(
        &self,
        returns: &ReturnPanel,
        config: &SignalConfig,
    ) -> Result<Option<usize>, SignalError> {
        if config.residual_window.is_none() {
            return Ok(None);
        }
        let bench = self.benchmark.as_ref().ok_or(SignalError::MissingBenchmark)?;
        returns
            .asset_index(bench)
            .map(Some)
            .ok_or_else(|| SignalError::UnknownBenchmark(bench.clone()))
    }

    /// Score one cross-section at bar `t`, reading returns in `[history_start, t)`.
    fn score_at(
        &self,
        returns: &ReturnPanel,
        config: &SignalConfig,
        bench: Option<usize>,
        t: usize,
        history_start: usize,
    ) -> (CrossSection, Vec<Exclusion>) {
        let need = config.warmup();
        let timestamp = returns.timestamps()[t];
        let tradable: Vec<usize> = (0..returns.n_assets())
            .filter(|a| Some(*a) != bench)
            .collect();
        let mut exclusions = Vec::new();
        let exclude = |asset: usize, reason: ExclusionReason| Exclusion {
            t,
            timestamp,
            asset: returns.assets()[asset].clone(),
            reason,
        };

        let bench_window = match bench {
            Some(b) => {
                let observed = observed_run(returns.column(b), t, history_start, need);
                if observed < need {
                    exclusions.extend(tradable.iter().map(|&a| {
                        exclude(
                            a,
                            ExclusionReason::BenchmarkHistory {
                                required: need,
                                observed,
                            },
                        )
                    }));
                    return (empty_section(t, timestamp, SectionStatus::NoEligibleAssets), exclusions);
                }
                Some(trailing(returns.column(b), t, need))
            }
            None => None,
        };

        let mut candidates = Vec::with_capacity(tradable.len());
        for &a in &tradable {
            let observed = observed_run(returns.column(a), t, history_start, need);
            if observed < need {
                exclusions.push(exclude(
                    a,
                    ExclusionReason::InsufficientHistory {
                        required: need,
                        observed,
                    },
                ));
                continue;
            }
            let mut x = trailing(returns.column(a), t, need);

            if let (Some(b), Some(w)) = (&bench_window, config.residual_window) {
                let fit_from = need - w;
                let Some(fit) = ols(&b[fit_from..], &x[fit_from..]) else {
                    exclusions.push(exclude(a, ExclusionReason::DegenerateRegression));
                    continue;
                };
                for (xi, bi) in x.iter_mut().zip(b) {
                    *xi = fit.residual(*bi, *xi);
                }
            }

            let end = need - config.skip;
            let cum: f64 = x[end - config.lookback..end].iter().sum();
            let vol = config
                .effective_vol_window()
                .and_then(|v| sample_std(&x[need - v..]));
            if matches!(vol, Some(v) if v < 1e-15) {
                exclusions.push(exclude(a, ExclusionReason::ZeroVolatility));
                continue;
            }

            candidates.push(Candidate {
                asset: a,
                raw: config.direction() * cum,
                vol,
            });
        }

        (cross_section(config, t, timestamp, &candidates), exclusions)
    }
}

fn cross_section(
    config: &SignalConfig,
    t: usize,
    timestamp: chrono::NaiveDateTime,
    candidates: &[Candidate],
) -> CrossSection {
    if candidates.is_empty() {
        return empty_section(t, timestamp, SectionStatus::NoEligibleAssets);
    }
    let raws: Vec<f64> = candidates.iter().map(|c| c.raw).collect();
    let Some(z) = zscores(&raws) else {
        let scores = candidates
            .iter()
            .map(|c| AssetScore {
                asset: c.asset,
                raw: c.raw,
                zscore: 0.0,
                score: 0.0,
            })
            .collect();
        return CrossSection {
            t,
            timestamp,
            status: SectionStatus::DegenerateDispersion,
            scores,
        };
    };

    let scores: Vec<AssetScore> = candidates
        .iter()
        .zip(z)
        .map(|(c, z)| {
            let score = if z.abs() < config.band {
                0.0
            } else {
                z / c.vol.unwrap_or(1.0)
            };
            AssetScore {
                asset: c.asset,
                raw: c.raw,
                zscore: z,
                score,
            }
        })
        .collect();

    let status = if scores.iter().all(|s| s.score == 0.0) {
        SectionStatus::AllBanded
    } else {
        SectionStatus::Scored
    };
    CrossSection {
        t,
        timestamp,
        status,
        scores,
    }
}

fn empty_section(t: usize, timestamp: chrono::NaiveDateTime, status: SectionStatus) -> CrossSection {
    CrossSection {
        t,
        timestamp,
        status,
        scores: Vec::new(),
    }
}

/// Consecutive observed returns ending at `t - 1`, not reaching below
/// `floor`, capped at `cap`.
fn observed_run(col: &[Option<f64>], t: usize, floor: usize, cap: usize) -> usize {
    (floor..t)
        .rev()
        .take(cap)
        .take_while(|&s| col[s].is_some())
        .count()
}

/// The `n` returns ending at `t - 1`. Callers check presence with `observed_run` first.
fn trailing(col: &[Option<f64>], t: usize, n: usize) -> Vec<f64> {
    col[t - n..t].iter().map(|r| r.unwrap_or(0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PricePanel, ReturnKind};
    use crate::signal::SignalKind;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn grid(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    fn plain(kind: SignalKind, k: usize) -> SignalConfig {
        SignalConfig {
            kind,
            lookback: k,
            skip: 0,
            band: 0.0,
            residual_window: None,
            rebalance_every: 1,
            vol_window: None,
        }
    }

    fn three_asset_returns() -> ReturnPanel {
        ReturnPanel::from_columns(
            ReturnKind::Simple,
            grid(6),
            vec![
                (AssetId::new("A"), vec![None, Some(0.01), Some(0.02), Some(0.00), Some(0.5), Some(0.5)]),
                (AssetId::new("B"), vec![None, Some(-0.01), Some(0.00), Some(0.01), Some(0.5), Some(0.5)]),
                (AssetId::new("C"), vec![None, Some(0.00), Some(-0.02), Some(-0.01), Some(0.5), Some(0.5)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn reversal_scores_negative_for_winners() {
        let r = three_asset_returns();
        let panel = SignalBuilder::new()
            .build(&r, &plain(SignalKind::Reversal, 2), &Schedule::isolated(3..4, 1))
            .unwrap();
        let section = panel.at(3).unwrap();
        assert!(section.is_scored());
        // Window is bars 1..=2: A +0.03, B -0.01, C -0.02.
        let a = panel.score(3, 0).unwrap();
        let c = panel.score(3, 2).unwrap();
        assert!(a < 0.0);
        assert!(c > 0.0);
        assert!((section.scores[0].raw - (-0.03)).abs() < 1e-12);
    }

    #[test]
    fn momentum_is_mirror_of_reversal() {
        let r = three_asset_returns();
        let sched = Schedule::isolated(3..4, 1);
        let rev = SignalBuilder::new()
            .build(&r, &plain(SignalKind::Reversal, 2), &sched)
            .unwrap();
        let mom = SignalBuilder::new()
            .build(&r, &plain(SignalKind::Momentum, 2), &sched)
            .unwrap();
        for a in 0..3 {
            let x = rev.score(3, a).unwrap();
            let y = mom.score(3, a).unwrap();
            assert!((x + y).abs() < 1e-12);
        }
    }

    #[test]
    fn insufficient_history_excludes_and_records() {
        let r = three_asset_returns();
        let panel = SignalBuilder::new()
            .build(&r, &plain(SignalKind::Reversal, 3), &Schedule::isolated(3..4, 1))
            .unwrap();
        // Bar 0 return is a gap, so only two returns precede bar 3.
        assert_eq!(panel.at(3).unwrap().status, SectionStatus::NoEligibleAssets);
        assert_eq!(panel.exclusions.len(), 3);
        assert!(matches!(
            panel.exclusions[0].reason,
            ExclusionReason::InsufficientHistory { required: 3, observed: 2 }
        ));
    }

    #[test]
    fn history_floor_is_respected() {
        let r = three_asset_returns();
        let cfg = plain(SignalKind::Reversal, 2);
        let panel = SignalBuilder::new()
            .build(&r, &cfg, &Schedule::new(4..5, 1, 3))
            .unwrap();
        assert_eq!(panel.at(4).unwrap().status, SectionStatus::NoEligibleAssets);
        let panel = SignalBuilder::new()
            .build(&r, &cfg, &Schedule::new(4..5, 1, 2))
            .unwrap();
        assert!(panel.at(4).unwrap().is_scored());
    }

    #[test]
    fn band_zeroes_small_zscores() {
        let r = three_asset_returns();
        let cfg = plain(SignalKind::Reversal, 2).with_band(1.2);
        let panel = SignalBuilder::new()
            .build(&r, &cfg, &Schedule::isolated(3..4, 1))
            .unwrap();
        let section = panel.at(3).unwrap();
        // z-scores of (-0.03, 0.01, 0.02) are about (-1.13, 0.38, 0.76).
        assert_eq!(section.status, SectionStatus::AllBanded);
        assert!(section.scores.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn residualization_requires_benchmark() {
        let r = three_asset_returns();
        let cfg = plain(SignalKind::Reversal, 2).with_residual_window(Some(2));
        assert_eq!(
            SignalBuilder::new().build(&r, &cfg, &Schedule::isolated(3..4, 1)),
            Err(SignalError::MissingBenchmark)
        );
        assert_eq!(
            SignalBuilder::with_benchmark(AssetId::new("ZZZ"))
                .build(&r, &cfg, &Schedule::isolated(3..4, 1)),
            Err(SignalError::UnknownBenchmark(AssetId::new("ZZZ")))
        );
    }

    #[test]
    fn residualization_removes_pure_beta_exposure() {
        // A = 2 * bench exactly, B = bench + idiosyncratic noise.
        let bench = [0.01, -0.02, 0.015, 0.005, -0.01, 0.02, -0.005, 0.0];
        let noise = [0.003, -0.001, 0.002, -0.004, 0.001, 0.0, 0.002, -0.002];
        let col = |f: &dyn Fn(usize) -> f64| -> Vec<Option<f64>> {
            std::iter::once(None)
                .chain((0..8).map(|i| Some(f(i))))
                .collect()
        };
        let r = ReturnPanel::from_columns(
            ReturnKind::Simple,
            grid(9),
            vec![
                (AssetId::new("A"), col(&|i| 2.0 * bench[i])),
                (AssetId::new("B"), col(&|i| bench[i] + noise[i])),
                (AssetId::new("BENCH"), col(&|i| bench[i])),
                (AssetId::new("C"), col(&|i| 0.5 * bench[i] - noise[i])),
            ],
        )
        .unwrap();
        let cfg = plain(SignalKind::Reversal, 2).with_residual_window(Some(6));
        let panel = SignalBuilder::with_benchmark(AssetId::new("BENCH"))
            .build(&r, &cfg, &Schedule::isolated(7..8, 1))
            .unwrap();
        let section = panel.at(7).unwrap();
        // Benchmark is not tradable when residualizing.
        assert!(section.scores.iter().all(|s| s.asset != 2));
        // A is a perfect multiple of the benchmark, so its residual signal is zero.
        let a = section.scores.iter().find(|s| s.asset == 0).unwrap();
        assert!(a.raw.abs() < 1e-12);
    }

    #[test]
    fn vol_scaling_divides_by_trailing_std() {
        let r = three_asset_returns();
        let cfg = plain(SignalKind::Reversal, 2).with_vol_window(Some(2));
        let panel = SignalBuilder::new()
            .build(&r, &cfg, &Schedule::isolated(3..4, 1))
            .unwrap();
        let s = &panel.at(3).unwrap().scores[1];
        // B's returns at bars 1..=2 are -0.01 and 0.00.
        let vol = sample_std(&[-0.01, 0.0]).unwrap();
        assert!((s.score - s.zscore / vol).abs() < 1e-9);
    }

    #[test]
    fn out_of_bounds_schedule_rejected() {
        let r = three_asset_returns();
        let err = SignalBuilder::new()
            .build(&r, &plain(SignalKind::Reversal, 2), &Schedule::isolated(3..10, 1))
            .unwrap_err();
        assert_eq!(err, SignalError::OutOfBounds { end: 10, n_bars: 6 });
    }

    #[test]
    fn observed_run_stops_at_gap_and_floor() {
        let col = [None, Some(1.0), None, Some(1.0), Some(1.0)];
        assert_eq!(observed_run(&col, 5, 0, 10), 2);
        assert_eq!(observed_run(&col, 5, 4, 10), 1);
        assert_eq!(observed_run(&col, 5, 0, 1), 1);
    }
}
