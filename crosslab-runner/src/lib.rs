//! Crosslab Runner: walk-forward validation, sleeve mixing, reporting.
//!
//! This crate builds on `crosslab-core` to provide:
//! - Experiment configuration from TOML
//! - Price loading from wide or long CSV files, with a synthetic fallback
//! - Candidate grids and walk-forward selection with out-of-sample stitching
//! - Multi-sleeve combination (equal weight, inverse vol, simplex-optimized)
//! - Performance metrics, Newey-West inference, benchmark alpha/beta
//! - JSON, CSV and Markdown export

pub mod combiner;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod grid;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod tdist;
pub mod walk_forward;

pub use combiner::{CombineError, CombinedResult, MixConfig, MixMethod, PortfolioCombiner};
pub use config::{ConfigError, ExperimentConfig, SleeveConfig};
pub use data_loader::{load_prices, load_synthetic, DataSource, LoadError, LoadedData};
pub use export::{save_artifacts, RunSummary, WalkForwardSummary};
pub use grid::SignalGrid;
pub use metrics::{PerformanceMetrics, ReportConfig};
pub use report::{Coverage, RunMetadata, SleeveReport};
pub use runner::{run_backtest, run_mix_walk_forward, run_walk_forward, RunError, RunOutput};
pub use tdist::TTestResult;
pub use walk_forward::{
    create_folds, DegradationFlag, Fold, FoldConfig, FoldMode, MixWalkForwardResult, SkippedFold,
    SleeveSpec, WalkForwardError, WalkForwardResult, WalkForwardValidator,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn results_are_send_sync() {
        assert_send::<WalkForwardResult>();
        assert_sync::<WalkForwardResult>();
        assert_send::<MixWalkForwardResult>();
        assert_sync::<MixWalkForwardResult>();
        assert_send::<CombinedResult>();
        assert_sync::<CombinedResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ExperimentConfig>();
        assert_sync::<ExperimentConfig>();
        assert_send::<WalkForwardValidator>();
        assert_sync::<WalkForwardValidator>();
        assert_send::<PortfolioCombiner>();
        assert_sync::<PortfolioCombiner>();
    }
}
