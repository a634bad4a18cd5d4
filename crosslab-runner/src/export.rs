//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! - **JSON**: `summary.json`, a versioned `RunSummary`; unknown versions are
//!   rejected on load
//! - **CSV**: per-bar series, per-fold selections, mix weights
//! - **Markdown**: `report.md`, a human-readable digest of the summary
//!
//! Output is a pure function of the results: no wall-clock stamps, so two
//! identical runs write byte-identical files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crosslab_core::data::PricePanel;
use crosslab_core::engine::SleeveResult;

use crate::combiner::WeightSnapshot;
use crate::report::{RunMetadata, SleeveReport, SCHEMA_VERSION};
use crate::tdist::TTestResult;
use crate::walk_forward::{
    DegradationFlag, MixWalkForwardResult, SkipReason, SkippedFold, WalkForwardResult,
};

// ─── Summary types ──────────────────────────────────────────────────

/// Fold-level aggregate of a walk-forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub label: String,
    pub completed_folds: usize,
    pub skipped: Vec<SkippedFold>,
    pub mean_train_sharpe: f64,
    pub mean_test_sharpe: f64,
    pub degradation_ratio: Option<f64>,
    pub degradation_flag: DegradationFlag,
    pub t_test: Option<TTestResult>,
}

impl From<&WalkForwardResult> for WalkForwardSummary {
    fn from(wf: &WalkForwardResult) -> Self {
        Self {
            label: wf.oos.label.clone(),
            completed_folds: wf.folds.len(),
            skipped: wf.skipped.clone(),
            mean_train_sharpe: wf.mean_train_sharpe,
            mean_test_sharpe: wf.mean_test_sharpe,
            degradation_ratio: wf.degradation_ratio,
            degradation_flag: wf.degradation_flag,
            t_test: wf.t_test.clone(),
        }
    }
}

impl From<&MixWalkForwardResult> for WalkForwardSummary {
    fn from(wf: &MixWalkForwardResult) -> Self {
        Self {
            label: wf.oos.label.clone(),
            completed_folds: wf.folds.len(),
            skipped: wf.skipped.clone(),
            mean_train_sharpe: wf.mean_train_sharpe,
            mean_test_sharpe: wf.mean_test_sharpe,
            degradation_ratio: wf.degradation_ratio,
            degradation_flag: wf.degradation_flag,
            t_test: wf.t_test.clone(),
        }
    }
}

/// Everything written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub title: String,
    pub meta: RunMetadata,
    pub reports: Vec<SleeveReport>,
    #[serde(default)]
    pub walk_forward: Vec<WalkForwardSummary>,
}

impl RunSummary {
    pub fn new(title: impl Into<String>, meta: RunMetadata, reports: Vec<SleeveReport>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            title: title.into(),
            meta,
            reports,
            walk_forward: Vec::new(),
        }
    }

    pub fn with_walk_forward(mut self, wf: WalkForwardSummary) -> Self {
        self.walk_forward.push(wf);
        self
    }
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize RunSummary to JSON")
}

/// Deserialize a `RunSummary`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunSummary> {
    let summary: RunSummary =
        serde_json::from_str(json).context("failed to deserialize RunSummary from JSON")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Per-bar series. Columns: timestamp, bar, gross_return, turnover, cost,
/// net_return, equity
pub fn export_bars_csv(result: &SleeveResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "bar",
        "gross_return",
        "turnover",
        "cost",
        "net_return",
        "equity",
    ])?;
    for b in &result.bars {
        wtr.write_record([
            &b.timestamp.to_string(),
            &b.t.to_string(),
            &format!("{:.10}", b.gross_return),
            &format!("{:.10}", b.turnover),
            &format!("{:.10}", b.cost),
            &format!("{:.10}", b.net_return),
            &format!("{:.10}", b.equity),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per fold, skipped folds included with their reason.
pub fn export_folds_csv(wf: &WalkForwardResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "fold",
        "status",
        "train_start",
        "train_end",
        "test_start",
        "test_end",
        "test_from",
        "test_to",
        "selected",
        "fingerprint",
        "train_sharpe",
        "test_sharpe",
        "test_total_return",
        "test_mean_turnover",
        "candidates",
        "infeasible",
        "reason",
    ])?;
    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
    for r in &wf.folds {
        let f = r.fold;
        rows.push((
            f.index,
            vec![
                f.index.to_string(),
                "ok".into(),
                f.train_start.to_string(),
                f.train_end.to_string(),
                f.test_start.to_string(),
                f.test_end.to_string(),
                r.test_from.to_string(),
                r.test_to.to_string(),
                r.selected.label(),
                r.fingerprint.short().to_string(),
                format!("{:.4}", r.train_sharpe),
                format!("{:.4}", r.test.sharpe),
                format!("{:.6}", r.test.total_return),
                format!("{:.6}", r.test.mean_turnover),
                r.candidates.to_string(),
                r.infeasible.to_string(),
                String::new(),
            ],
        ));
    }
    for s in &wf.skipped {
        rows.push((s.fold.index, skipped_row(s, 17)));
    }
    rows.sort_by_key(|(i, _)| *i);
    for (_, row) in rows {
        wtr.write_record(&row)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per (fold, sleeve) of a mixed run, with the fold's mix weight.
pub fn export_mix_folds_csv(wf: &MixWalkForwardResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "fold",
        "status",
        "train_start",
        "train_end",
        "test_start",
        "test_end",
        "sleeve",
        "selected",
        "weight",
        "train_sharpe",
        "test_sharpe",
        "mix_test_sharpe",
        "reason",
    ])?;
    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
    for r in &wf.folds {
        let f = r.fold;
        for (s, w) in r.sleeves.iter().zip(&r.weights) {
            rows.push((
                f.index,
                vec![
                    f.index.to_string(),
                    "ok".into(),
                    f.train_start.to_string(),
                    f.train_end.to_string(),
                    f.test_start.to_string(),
                    f.test_end.to_string(),
                    s.sleeve.clone(),
                    s.selected.label(),
                    format!("{w:.4}"),
                    format!("{:.4}", s.train_sharpe),
                    format!("{:.4}", s.test_sharpe),
                    format!("{:.4}", r.test.sharpe),
                    String::new(),
                ],
            ));
        }
    }
    for s in &wf.skipped {
        rows.push((s.fold.index, skipped_row(s, 13)));
    }
    rows.sort_by_key(|(i, _)| *i);
    for (_, row) in rows {
        wtr.write_record(&row)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Wide close file readable by `data_loader::load_prices`. Gaps are empty cells.
pub fn export_prices_csv(panel: &PricePanel) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["timestamp".to_string()];
    header.extend(panel.assets().iter().map(|a| a.to_string()));
    wtr.write_record(&header)?;
    for (t, ts) in panel.timestamps().iter().enumerate() {
        let mut row = vec![ts.format("%Y-%m-%d %H:%M:%S").to_string()];
        for a in 0..panel.n_assets() {
            // Debug formatting is the shortest string that parses back to the same bits
            row.push(panel.close(a, t).map(|c| format!("{c:?}")).unwrap_or_default());
        }
        wtr.write_record(&row)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Mix weight snapshots. Columns: timestamp, bar, then one per sleeve.
pub fn export_weights_csv(sleeves: &[String], snapshots: &[WeightSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["timestamp".to_string(), "bar".to_string()];
    header.extend(sleeves.iter().cloned());
    wtr.write_record(&header)?;
    for s in snapshots {
        let mut row = vec![s.timestamp.to_string(), s.t.to_string()];
        row.extend(s.weights.iter().map(|w| format!("{w:.6}")));
        wtr.write_record(&row)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn skipped_row(s: &SkippedFold, width: usize) -> Vec<String> {
    let f = s.fold;
    let mut row = vec![
        f.index.to_string(),
        "skipped".into(),
        f.train_start.to_string(),
        f.train_end.to_string(),
        f.test_start.to_string(),
        f.test_end.to_string(),
    ];
    row.resize(width - 1, String::new());
    row.push(describe_skip(&s.reason));
    row
}

fn describe_skip(reason: &SkipReason) -> String {
    match reason {
        SkipReason::PartialTest {
            available,
            required,
        } => format!("partial test window ({available} of {required} bars)"),
        SkipReason::NoFeasibleCandidate {
            sleeve,
            train_bars,
            min_warmup,
        } => format!(
            "no feasible candidate for '{sleeve}' ({train_bars} train bars, warm-up {min_warmup})"
        ),
    }
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(summary: &RunSummary) -> String {
    let mut md = String::with_capacity(2048);
    md.push_str(&format!("# {}\n\n", summary.title));

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Dataset Hash | {} |\n", summary.meta.dataset_hash));
    md.push_str(&format!("| Experiment | {} |\n", summary.meta.experiment.short()));
    md.push_str(&format!("| Benchmark | {} |\n", summary.meta.benchmark));
    if summary.meta.is_synthetic() {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Performance\n\n");
    md.push_str("| Series | Bars | Total Return | CAGR | Ann. Vol | Sharpe | Gross Sharpe | Max DD | Ann. Turnover | Cost Drag |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: | ---: | ---: | ---: | ---: | ---: |\n");
    for r in &summary.reports {
        let m = &r.metrics;
        md.push_str(&format!(
            "| {} | {} | {:.2}% | {:.2}% | {:.2}% | {:.3} | {:.3} | {:.2}% | {:.1}x | {:.2}% |\n",
            r.label,
            m.n_obs,
            m.total_return * 100.0,
            m.cagr * 100.0,
            m.ann_vol * 100.0,
            m.sharpe,
            m.gross_sharpe,
            m.max_drawdown * 100.0,
            m.ann_turnover,
            m.ann_cost_drag * 100.0,
        ));
    }
    md.push('\n');

    let with_beta: Vec<&SleeveReport> = summary
        .reports
        .iter()
        .filter(|r| r.alpha_beta.is_some() || r.mean_test.is_some())
        .collect();
    if !with_beta.is_empty() {
        md.push_str("## Inference\n\n");
        md.push_str("| Series | Mean t (NW) | Alpha (ann.) | Alpha t | Beta | Beta t | R² |\n");
        md.push_str("| --- | ---: | ---: | ---: | ---: | ---: | ---: |\n");
        for r in with_beta {
            let t = r
                .mean_test
                .map(|m| format!("{:.2}", m.t_stat))
                .unwrap_or_else(|| "-".into());
            match &r.alpha_beta {
                Some(ab) => md.push_str(&format!(
                    "| {} | {} | {:.2}% | {:.2} | {:.3} | {:.2} | {:.3} |\n",
                    r.label,
                    t,
                    ab.alpha_ann * 100.0,
                    ab.alpha_t,
                    ab.beta,
                    ab.beta_t,
                    ab.r_squared
                )),
                None => md.push_str(&format!("| {} | {} | - | - | - | - | - |\n", r.label, t)),
            }
        }
        md.push('\n');
    }

    for wf in &summary.walk_forward {
        md.push_str(&format!("## Walk-Forward: {}\n\n", wf.label));
        md.push_str("| Metric | Value |\n");
        md.push_str("| --- | --- |\n");
        md.push_str(&format!("| Completed Folds | {} |\n", wf.completed_folds));
        md.push_str(&format!("| Skipped Folds | {} |\n", wf.skipped.len()));
        md.push_str(&format!("| Mean Train Sharpe | {:.3} |\n", wf.mean_train_sharpe));
        md.push_str(&format!("| Mean Test Sharpe | {:.3} |\n", wf.mean_test_sharpe));
        match wf.degradation_ratio {
            Some(r) => md.push_str(&format!(
                "| Degradation | {:.3} ({:?}) |\n",
                r, wf.degradation_flag
            )),
            None => md.push_str(&format!("| Degradation | n/a ({:?}) |\n", wf.degradation_flag)),
        }
        if let Some(t) = &wf.t_test {
            md.push_str(&format!(
                "| Fold Sharpe t-test | t = {:.2}, p = {:.4} (df {}) |\n",
                t.t_statistic, t.p_value, t.df
            ));
        }
        md.push('\n');
        for s in &wf.skipped {
            md.push_str(&format!(
                "- fold {} skipped: {}\n",
                s.fold.index,
                describe_skip(&s.reason)
            ));
        }
        if !wf.skipped.is_empty() {
            md.push('\n');
        }
    }

    md.push_str("## Coverage\n\n");
    md.push_str("| Series | Bars | Rebalances | Flat | Excluded Assets | Exclusions |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: | --- |\n");
    for r in &summary.reports {
        let c = &r.coverage;
        let detail = if c.exclusions.is_empty() {
            "none".to_string()
        } else {
            c.exclusions
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            r.label, c.computed_bars, c.rebalances, c.flat_rebalances, c.excluded_assets, detail
        ));
    }
    md
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Extra CSV files written next to the summary, as (file name, content).
pub type CsvArtifacts = Vec<(String, String)>;

/// Write `summary.json`, `report.md` and every CSV in `csvs` into `dir`.
///
/// Returns the paths written, summary first.
pub fn save_artifacts(dir: &Path, summary: &RunSummary, csvs: &CsvArtifacts) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    let mut written = Vec::with_capacity(csvs.len() + 2);

    let summary_path = dir.join("summary.json");
    std::fs::write(&summary_path, export_json(summary)?)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    written.push(summary_path);

    let report_path = dir.join("report.md");
    std::fs::write(&report_path, generate_report(summary))
        .with_context(|| format!("failed to write {}", report_path.display()))?;
    written.push(report_path);

    for (name, content) in csvs {
        let path = dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    info!(dir = %dir.display(), files = written.len(), "artifacts written");
    Ok(written)
}

/// Load `summary.json` from an artifact directory.
pub fn load_summary(dir: &Path) -> Result<RunSummary> {
    let path = dir.join("summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
