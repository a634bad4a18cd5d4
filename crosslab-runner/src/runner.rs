//! Experiment runner: wires config, data, engine, validation and reporting.
//!
//! Three entry points, one per CLI command:
//! - `run_backtest()`: every grid candidate over the full sample, plus a mix
//!   of each sleeve's best in-sample candidate when a mix is configured
//! - `run_walk_forward()`: per-sleeve walk-forward with OOS stitching
//! - `run_mix_walk_forward()`: walk-forward of the configured sleeve mix
//!
//! None of them touch the filesystem; `export::save_artifacts` writes the
//! returned `RunOutput`.

use rayon::prelude::*;
use thiserror::Error;
use tracing::info;

use crosslab_core::engine::{EngineError, SleeveResult};

use crate::combiner::{CombineError, PortfolioCombiner};
use crate::config::{ConfigError, ExperimentConfig};
use crate::data_loader::LoadedData;
use crate::export::{
    export_bars_csv, export_folds_csv, export_mix_folds_csv, export_weights_csv, CsvArtifacts,
    RunSummary, WalkForwardSummary,
};
use crate::metrics::sharpe_ratio;
use crate::report::{benchmark_returns, RunMetadata, SleeveReport};
use crate::walk_forward::WalkForwardError;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("sleeve '{sleeve}' failed: {source}")]
    Engine {
        sleeve: String,
        #[source]
        source: EngineError,
    },
    #[error("walk-forward error: {0}")]
    WalkForward(#[from] WalkForwardError),
    #[error("combination error: {0}")]
    Combine(#[from] CombineError),
    #[error("no [mix] section in the experiment config")]
    NoMix,
    #[error(transparent)]
    Export(#[from] anyhow::Error),
}

/// Summary plus the CSV files that go with it.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub csvs: CsvArtifacts,
}

fn metadata(config: &ExperimentConfig, data: &LoadedData) -> RunMetadata {
    RunMetadata {
        dataset_hash: data.dataset_hash.clone(),
        source: data.source.clone(),
        experiment: config.fingerprint(),
        benchmark: config.benchmark.clone(),
    }
}

fn report(
    config: &ExperimentConfig,
    data: &LoadedData,
    result: &SleeveResult,
    skipped_folds: usize,
) -> SleeveReport {
    let returns = data.panel.returns(config.return_kind);
    let bench = benchmark_returns(returns, &config.benchmark_id(), result);
    SleeveReport::build(result, bench.as_deref(), &config.report(), skipped_folds)
}

/// Full-sample run of every candidate of every sleeve.
pub fn run_backtest(config: &ExperimentConfig, data: &LoadedData) -> Result<RunOutput, RunError> {
    config.validate()?;
    let returns = data.panel.returns(config.return_kind);
    let runner = config.runner();

    let mut reports = Vec::new();
    let mut csvs = CsvArtifacts::new();
    let mut best_per_sleeve = Vec::new();
    for sleeve in &config.sleeves {
        let results = sleeve
            .grid
            .candidates()
            .par_iter()
            .map(|c| {
                runner.run_full(returns, c).map_err(|source| RunError::Engine {
                    sleeve: sleeve.name.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut best: Option<(f64, &SleeveResult)> = None;
        for r in &results {
            let s = sharpe_ratio(&r.net_returns(), config.bars_per_year);
            if best.map_or(true, |(b, _)| s > b) {
                best = Some((s, r));
            }
            reports.push(report(config, data, r, 0));
        }
        if let Some((sharpe, r)) = best {
            info!(sleeve = %sleeve.name, best = %r.label, sharpe, "full-sample backtest");
            let mut r = r.clone();
            r.label = sleeve.name.clone();
            csvs.push((format!("{}_bars.csv", sleeve.name), export_bars_csv(&r)?));
            best_per_sleeve.push(r);
        }
    }

    if let Some(mix) = &config.mix {
        let combined = PortfolioCombiner::new(mix.clone()).combine(&best_per_sleeve)?;
        reports.push(report(config, data, &combined.result, 0));
        csvs.push(("mix_bars.csv".into(), export_bars_csv(&combined.result)?));
        csvs.push((
            "mix_weights.csv".into(),
            export_weights_csv(&combined.sleeves, &combined.weights)?,
        ));
    }

    let summary = RunSummary::new("Full-Sample Backtest", metadata(config, data), reports);
    Ok(RunOutput { summary, csvs })
}

/// Walk-forward of each sleeve on its own.
pub fn run_walk_forward(
    config: &ExperimentConfig,
    data: &LoadedData,
) -> Result<RunOutput, RunError> {
    config.validate()?;
    let returns = data.panel.returns(config.return_kind);
    let validator = config.validator();

    let mut summary = RunSummary::new("Walk-Forward", metadata(config, data), Vec::new());
    let mut csvs = CsvArtifacts::new();
    for spec in config.sleeve_specs() {
        let mut wf = validator.run(returns, &spec.candidates)?;
        wf.oos.label = format!("oos:{}", spec.name);
        summary
            .reports
            .push(report(config, data, &wf.oos, wf.skipped.len()));
        summary = summary.with_walk_forward(WalkForwardSummary::from(&wf));
        csvs.push((format!("{}_folds.csv", spec.name), export_folds_csv(&wf)?));
        csvs.push((format!("{}_oos_bars.csv", spec.name), export_bars_csv(&wf.oos)?));
    }
    Ok(RunOutput { summary, csvs })
}

/// Walk-forward of the configured mix.
pub fn run_mix_walk_forward(
    config: &ExperimentConfig,
    data: &LoadedData,
) -> Result<RunOutput, RunError> {
    config.validate()?;
    let mix = config.mix.as_ref().ok_or(RunError::NoMix)?;
    let returns = data.panel.returns(config.return_kind);
    let wf = config
        .validator()
        .run_mix(returns, &config.sleeve_specs(), mix)?;

    let reports = vec![report(config, data, &wf.oos, wf.skipped.len())];
    let summary = RunSummary::new("Mixed Walk-Forward", metadata(config, data), reports)
        .with_walk_forward(WalkForwardSummary::from(&wf));
    let csvs = vec![
        ("mix_folds.csv".to_string(), export_mix_folds_csv(&wf)?),
        ("mix_oos_bars.csv".to_string(), export_bars_csv(&wf.oos)?),
    ];
    Ok(RunOutput { summary, csvs })
}
