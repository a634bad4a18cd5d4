//! Result summaries: performance, benchmark exposure, coverage.
//!
//! A `SleeveReport` is the serializable record of one return series (a
//! full-sample sleeve, a walk-forward OOS series or a mix). It carries the
//! coverage counters next to the metrics so excluded assets, flat rebalances
//! and skipped folds are always visible in the output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crosslab_core::data::ReturnPanel;
use crosslab_core::domain::{AssetId, ConfigHash, DatasetHash};
use crosslab_core::engine::SleeveResult;
use crosslab_core::signal::ExclusionReason;

use crate::data_loader::DataSource;
use crate::metrics::{
    alpha_beta, newey_west_mean_tstat, AlphaBeta, MeanTStat, PerformanceMetrics, ReportConfig,
};

/// Bumped whenever the JSON layout of a report changes.
pub const SCHEMA_VERSION: u32 = 1;

/// How much of the requested range produced real positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub computed_bars: usize,
    pub rebalances: usize,
    pub flat_rebalances: usize,
    /// Asset-rebalance exclusions, counted by reason.
    pub exclusions: BTreeMap<String, usize>,
    /// Distinct assets excluded at least once.
    pub excluded_assets: usize,
    pub skipped_folds: usize,
}

impl Coverage {
    pub fn of(result: &SleeveResult, skipped_folds: usize) -> Self {
        let mut exclusions = BTreeMap::new();
        let mut assets: Vec<&AssetId> = Vec::new();
        for e in &result.exclusions {
            *exclusions.entry(reason_key(&e.reason).to_string()).or_insert(0) += 1;
            assets.push(&e.asset);
        }
        assets.sort();
        assets.dedup();
        Self {
            computed_bars: result.len(),
            rebalances: result.rebalance_count,
            flat_rebalances: result.flat_rebalances.len(),
            exclusions,
            excluded_assets: assets.len(),
            skipped_folds,
        }
    }

    pub fn total_exclusions(&self) -> usize {
        self.exclusions.values().sum()
    }
}

fn reason_key(reason: &ExclusionReason) -> &'static str {
    match reason {
        ExclusionReason::InsufficientHistory { .. } => "insufficient_history",
        ExclusionReason::BenchmarkHistory { .. } => "benchmark_history",
        ExclusionReason::ZeroVolatility => "zero_volatility",
        ExclusionReason::DegenerateRegression => "degenerate_regression",
    }
}

/// Provenance stamped on every exported report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub dataset_hash: DatasetHash,
    pub source: DataSource,
    pub experiment: ConfigHash,
    pub benchmark: String,
}

impl RunMetadata {
    pub fn is_synthetic(&self) -> bool {
        matches!(self.source, DataSource::Synthetic { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveReport {
    pub schema_version: u32,
    pub label: String,
    pub fingerprint: Option<ConfigHash>,
    pub metrics: PerformanceMetrics,
    /// Newey-West test of mean net return against zero.
    pub mean_test: Option<MeanTStat>,
    /// Regression on the benchmark; `None` without a benchmark series.
    pub alpha_beta: Option<AlphaBeta>,
    pub coverage: Coverage,
}

impl SleeveReport {
    pub fn build(
        result: &SleeveResult,
        benchmark: Option<&[Option<f64>]>,
        config: &ReportConfig,
        skipped_folds: usize,
    ) -> Self {
        let net = result.net_returns();
        let strategy: Vec<Option<f64>> = net.iter().copied().map(Some).collect();
        Self {
            schema_version: SCHEMA_VERSION,
            label: result.label.clone(),
            fingerprint: result.fingerprint.clone(),
            metrics: PerformanceMetrics::compute(result, config.bars_per_year),
            mean_test: newey_west_mean_tstat(
                &net,
                config.hac_lags.unwrap_or(0),
                config.bars_per_year,
            ),
            alpha_beta: benchmark.and_then(|b| alpha_beta(&strategy, b, config)),
            coverage: Coverage::of(result, skipped_folds),
        }
    }
}

/// Benchmark returns on the bars of `result`, gaps kept as `None`.
pub fn benchmark_returns(
    returns: &ReturnPanel,
    benchmark: &AssetId,
    result: &SleeveResult,
) -> Option<Vec<Option<f64>>> {
    let b = returns.asset_index(benchmark)?;
    let kind = returns.kind();
    Some(
        result
            .bars
            .iter()
            .map(|bar| returns.get(b, bar.t).map(|r| kind.to_simple(r)))
            .collect(),
    )
}
