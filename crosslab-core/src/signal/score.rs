//! Sparse cross-sectional score storage.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::AssetId;

/// Score of one asset at one rebalance timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetScore {
    /// Index into the panel's asset list.
    pub asset: usize,
    /// Signed signal before standardization (negated cumulative return for reversal).
    pub raw: f64,
    /// Cross-sectional z-score of `raw`.
    pub zscore: f64,
    /// Final score after banding and volatility scaling.
    pub score: f64,
}

/// Outcome of scoring one cross-section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Scored,
    /// Every eligible score fell inside the band.
    AllBanded,
    /// No asset had enough history.
    NoEligibleAssets,
    /// Fewer than two eligible assets, or zero dispersion.
    DegenerateDispersion,
}

/// All scores produced at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSection {
    pub t: usize,
    pub timestamp: NaiveDateTime,
    pub status: SectionStatus,
    pub scores: Vec<AssetScore>,
}

impl CrossSection {
    pub fn is_scored(&self) -> bool {
        self.status == SectionStatus::Scored
    }
}

/// Why an asset was left out of a cross-section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Fewer consecutive observed returns than the widest window needs.
    InsufficientHistory { required: usize, observed: usize },
    /// The benchmark lacked history, so no residual could be formed.
    BenchmarkHistory { required: usize, observed: usize },
    /// Trailing realized volatility was zero.
    ZeroVolatility,
    /// Benchmark regressor had no variance over the residualization window.
    DegenerateRegression,
}

/// Record of an asset excluded at a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub t: usize,
    pub timestamp: NaiveDateTime,
    pub asset: AssetId,
    pub reason: ExclusionReason,
}

/// Scores keyed by (timestamp, asset), sparse in both dimensions.
///
/// Only scheduled rebalance bars carry a cross-section, and each
/// cross-section lists only the assets that were eligible at that bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorePanel {
    pub assets: Vec<AssetId>,
    /// Ordered by `t`.
    pub sections: Vec<CrossSection>,
    pub exclusions: Vec<Exclusion>,
}

impl ScorePanel {
    pub fn at(&self, t: usize) -> Option<&CrossSection> {
        self.sections
            .binary_search_by_key(&t, |s| s.t)
            .ok()
            .map(|i| &self.sections[i])
    }

    /// Final score of `asset` at `t`, if the asset was in that cross-section.
    pub fn score(&self, t: usize, asset: usize) -> Option<f64> {
        self.at(t)?
            .scores
            .iter()
            .find(|s| s.asset == asset)
            .map(|s| s.score)
    }
}
