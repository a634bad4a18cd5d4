//! Crosslab CLI: backtest, walk-forward and sleeve-mix commands.
//!
//! Commands:
//! - `backtest`: full-sample run of every sleeve candidate (plus the mix)
//! - `walk-forward`: per-sleeve walk-forward with out-of-sample stitching
//! - `mix`: walk-forward of the configured sleeve mix
//! - `synth`: write a synthetic wide price file
//! - `config`: print the default experiment config as TOML
//!
//! Data comes from `--prices FILE` (wide or long CSV) or `--synthetic`.
//! Set `RUST_LOG` to adjust log verbosity (default `info`).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crosslab_core::data::{synthetic_panel, SyntheticSpec};
use crosslab_runner::export::{export_prices_csv, save_artifacts};
use crosslab_runner::{
    load_prices, load_synthetic, run_backtest, run_mix_walk_forward, run_walk_forward,
    ExperimentConfig, LoadedData, RunOutput,
};

#[derive(Parser)]
#[command(
    name = "crosslab",
    about = "Crosslab CLI: cross-sectional reversal/momentum backtests with walk-forward validation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full-sample backtest of every candidate in every sleeve grid.
    Backtest(RunArgs),
    /// Walk-forward validation of each sleeve.
    WalkForward(RunArgs),
    /// Walk-forward validation of the sleeve mix.
    Mix(RunArgs),
    /// Write a synthetic wide price file.
    Synth {
        /// Output CSV path.
        #[arg(long, default_value = "synthetic.csv")]
        out: PathBuf,
        #[command(flatten)]
        synthetic: SynthArgs,
    },
    /// Print the default experiment config as TOML.
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Experiment config (TOML). Defaults to the built-in reversal + momentum study.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Price file: wide (`timestamp,SYM...`) or long (`timestamp,asset,...,close,...`) CSV.
    #[arg(long, conflicts_with = "synthetic")]
    prices: Option<PathBuf>,

    /// Use a synthetic panel instead of a price file.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    #[command(flatten)]
    synth: SynthArgs,

    /// Output directory for summary.json, report.md and CSVs.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct SynthArgs {
    /// Seed for synthetic data.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of synthetic assets (the benchmark is added on top).
    #[arg(long, default_value_t = 8)]
    assets: usize,

    /// Number of synthetic hourly bars.
    #[arg(long, default_value_t = 20_000)]
    bars: usize,
}

impl SynthArgs {
    fn spec(&self) -> SyntheticSpec {
        SyntheticSpec {
            n_assets: self.assets,
            n_bars: self.bars,
            ..SyntheticSpec::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Backtest(args) => execute(&args, run_backtest),
        Commands::WalkForward(args) => execute(&args, run_walk_forward),
        Commands::Mix(args) => execute(&args, run_mix_walk_forward),
        Commands::Synth { out, synthetic } => run_synth(&out, &synthetic),
        Commands::Config => {
            let toml = toml::to_string_pretty(&ExperimentConfig::default())
                .context("failed to serialize default config")?;
            print!("{toml}");
            Ok(())
        }
    }
}

type Pipeline =
    fn(&ExperimentConfig, &LoadedData) -> std::result::Result<RunOutput, crosslab_runner::RunError>;

fn execute(args: &RunArgs, pipeline: Pipeline) -> Result<()> {
    let config = match &args.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    info!(
        experiment = %config.fingerprint().short(),
        sleeves = config.sleeves.len(),
        mix = config.mix.is_some(),
        "experiment config"
    );
    let data = load_data(args)?;
    let output = pipeline(&config, &data)?;

    print_summary(&output);
    let written = save_artifacts(&args.output_dir, &output.summary, &output.csvs)?;
    println!(
        "Artifacts saved to: {} ({} files)",
        args.output_dir.display(),
        written.len()
    );
    Ok(())
}

fn load_data(args: &RunArgs) -> Result<LoadedData> {
    match (&args.prices, args.synthetic) {
        (Some(path), false) => load_prices(path)
            .with_context(|| format!("failed to load prices from {}", path.display())),
        (None, true) => Ok(load_synthetic(&args.synth.spec(), args.synth.seed)?),
        (None, false) => bail!("one of --prices or --synthetic is required"),
        (Some(_), true) => bail!("--prices and --synthetic are mutually exclusive"),
    }
}

fn run_synth(out: &Path, args: &SynthArgs) -> Result<()> {
    let panel = synthetic_panel(&args.spec(), args.seed)?;
    std::fs::write(out, export_prices_csv(&panel)?)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "Wrote {} bars x {} assets to {}",
        panel.n_bars(),
        panel.n_assets(),
        out.display()
    );
    Ok(())
}

fn print_summary(output: &RunOutput) {
    let s = &output.summary;
    println!("\n=== {} ===", s.title);
    println!("Dataset:    {}", s.meta.dataset_hash);
    if s.meta.is_synthetic() {
        println!("Data:       SYNTHETIC");
    }
    println!();
    println!(
        "{:<48} {:>8} {:>10} {:>8} {:>9} {:>10}",
        "Series", "Bars", "Return", "Sharpe", "MaxDD", "Turnover"
    );
    for r in &s.reports {
        let m = &r.metrics;
        println!(
            "{:<48} {:>8} {:>9.2}% {:>8.3} {:>8.2}% {:>9.1}x",
            r.label,
            m.n_obs,
            m.total_return * 100.0,
            m.sharpe,
            m.max_drawdown * 100.0,
            m.ann_turnover
        );
    }
    for wf in &s.walk_forward {
        println!();
        println!("Walk-forward {}:", wf.label);
        println!(
            "  folds {} (skipped {}), train Sharpe {:.3}, test Sharpe {:.3}, degradation {:?}",
            wf.completed_folds,
            wf.skipped.len(),
            wf.mean_train_sharpe,
            wf.mean_test_sharpe,
            wf.degradation_flag
        );
    }
    println!();
}
