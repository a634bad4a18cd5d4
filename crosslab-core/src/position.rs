//! PositionConstructor: from scores to a piecewise-constant weight path.
//!
//! New weights are formed only on scheduled rebalance bars. Every other bar
//! holds the previous vector bit-for-bit. A rebalance whose cross-section
//! carries no usable scores goes flat instead of carrying weights forward.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::AssetId;
use crate::schedule::Schedule;
use crate::signal::{CrossSection, ScorePanel, SectionStatus};

/// Portfolio construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Target sum of absolute weights at every non-flat rebalance.
    pub gross_exposure: f64,
    /// Subtract the cross-sectional mean score before scaling (net exposure 0).
    pub dollar_neutral: bool,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            gross_exposure: 1.0,
            dollar_neutral: true,
        }
    }
}

/// Why a rebalance produced a zero weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatReason {
    AllBanded,
    NoEligibleAssets,
    DegenerateDispersion,
    /// Scores existed but cancelled out after neutralization.
    ZeroAfterNeutralization,
}

impl From<SectionStatus> for FlatReason {
    fn from(status: SectionStatus) -> Self {
        match status {
            SectionStatus::AllBanded => FlatReason::AllBanded,
            SectionStatus::DegenerateDispersion => FlatReason::DegenerateDispersion,
            SectionStatus::NoEligibleAssets | SectionStatus::Scored => FlatReason::NoEligibleAssets,
        }
    }
}

/// A rebalance that went flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRebalance {
    pub t: usize,
    pub timestamp: NaiveDateTime,
    pub reason: FlatReason,
}

/// Target weights per bar over a schedule's range.
///
/// `weights[i]` is the vector held after bar `schedule.start + i`; it is the
/// vector that earns the return of the following bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightPanel {
    pub assets: Vec<AssetId>,
    pub schedule: Schedule,
    pub timestamps: Vec<NaiveDateTime>,
    pub weights: Vec<Vec<f64>>,
    pub rebalance: Vec<bool>,
    pub flat: Vec<FlatRebalance>,
}

impl WeightPanel {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight vector held after panel bar `t`.
    pub fn at(&self, t: usize) -> Option<&[f64]> {
        t.checked_sub(self.schedule.start)
            .and_then(|i| self.weights.get(i))
            .map(Vec::as_slice)
    }
}

/// Converts score panels into weight panels.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionConstructor {
    config: PositionConfig,
}

impl PositionConstructor {
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// Build the weight path over `schedule`. `timestamps` is the full panel grid.
    pub fn construct(
        &self,
        scores: &ScorePanel,
        schedule: &Schedule,
        timestamps: &[NaiveDateTime],
    ) -> WeightPanel {
        let n_assets = scores.assets.len();
        let mut weights: Vec<Vec<f64>> = Vec::with_capacity(schedule.len());
        let mut rebalance = Vec::with_capacity(schedule.len());
        let mut flat = Vec::new();
        let mut held = vec![0.0; n_assets];

        for t in schedule.range() {
            let is_rebalance = schedule.is_rebalance(t);
            if is_rebalance {
                let (target, reason) = match scores.at(t) {
                    Some(section) => self.target_weights(section, n_assets),
                    None => (vec![0.0; n_assets], Some(FlatReason::NoEligibleAssets)),
                };
                if let Some(reason) = reason {
                    flat.push(FlatRebalance {
                        t,
                        timestamp: timestamps[t],
                        reason,
                    });
                }
                held = target;
            }
            weights.push(held.clone());
            rebalance.push(is_rebalance);
        }

        if !flat.is_empty() {
            debug!(flat = flat.len(), "rebalances went flat");
        }

        WeightPanel {
            assets: scores.assets.clone(),
            schedule: *schedule,
            timestamps: timestamps[schedule.range()].to_vec(),
            weights,
            rebalance,
            flat,
        }
    }

    /// Neutralized, gross-scaled weights for one cross-section.
    ///
    /// Assets absent from the cross-section get zero weight. Banded assets
    /// stay in the cross-section with a zero score, so they take part in the
    /// mean that is subtracted.
    pub fn target_weights(
        &self,
        section: &CrossSection,
        n_assets: usize,
    ) -> (Vec<f64>, Option<FlatReason>) {
        let mut w = vec![0.0; n_assets];
        if !section.is_scored() {
            return (w, Some(section.status.into()));
        }

        let n = section.scores.len() as f64;
        let offset = if self.config.dollar_neutral {
            section.scores.iter().map(|s| s.score).sum::<f64>() / n
        } else {
            0.0
        };
        for s in &section.scores {
            w[s.asset] = s.score - offset;
        }

        let l1: f64 = w.iter().map(|x| x.abs()).sum();
        if l1 < 1e-15 || !l1.is_finite() {
            return (vec![0.0; n_assets], Some(FlatReason::ZeroAfterNeutralization));
        }
        let scale = self.config.gross_exposure / l1;
        for x in &mut w {
            *x *= scale;
        }
        (w, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::AssetScore;
    use chrono::{Duration, NaiveDate};

    fn grid(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    fn section(t: usize, scores: &[(usize, f64)]) -> CrossSection {
        CrossSection {
            t,
            timestamp: grid(t + 1)[t],
            status: SectionStatus::Scored,
            scores: scores
                .iter()
                .map(|&(asset, score)| AssetScore {
                    asset,
                    raw: score,
                    zscore: score,
                    score,
                })
                .collect(),
        }
    }

    fn panel(sections: Vec<CrossSection>) -> ScorePanel {
        ScorePanel {
            assets: vec![AssetId::new("A"), AssetId::new("B"), AssetId::new("C")],
            sections,
            exclusions: Vec::new(),
        }
    }

    #[test]
    fn weights_are_dollar_neutral_with_target_gross() {
        let pc = PositionConstructor::new(PositionConfig {
            gross_exposure: 2.0,
            dollar_neutral: true,
        });
        let (w, flat) = pc.target_weights(&section(0, &[(0, 3.0), (1, 1.0), (2, -1.0)]), 3);
        assert!(flat.is_none());
        assert!(w.iter().sum::<f64>().abs() < 1e-12);
        assert!((w.iter().map(|x| x.abs()).sum::<f64>() - 2.0).abs() < 1e-12);
        assert!(w[0] > 0.0 && w[2] < 0.0);
    }

    #[test]
    fn weights_held_between_rebalances() {
        let scores = panel(vec![
            section(0, &[(0, 1.0), (1, -1.0)]),
            section(3, &[(0, -1.0), (1, 1.0)]),
        ]);
        let sched = Schedule::isolated(0..6, 3);
        let wp = PositionConstructor::default().construct(&scores, &sched, &grid(6));
        assert_eq!(wp.len(), 6);
        assert_eq!(wp.rebalance, vec![true, false, false, true, false, false]);
        assert_eq!(wp.weights[1], wp.weights[0]);
        assert_eq!(wp.weights[2], wp.weights[0]);
        assert_eq!(wp.weights[4], wp.weights[3]);
        assert_eq!(wp.weights[0], vec![0.5, -0.5, 0.0]);
        assert_eq!(wp.at(5).unwrap(), &[-0.5, 0.5, 0.0]);
    }

    #[test]
    fn degenerate_rebalance_goes_flat() {
        let mut banded = section(2, &[(0, 0.0), (1, 0.0)]);
        banded.status = SectionStatus::AllBanded;
        let scores = panel(vec![section(0, &[(0, 1.0), (1, -1.0)]), banded]);
        let sched = Schedule::isolated(0..4, 2);
        let wp = PositionConstructor::default().construct(&scores, &sched, &grid(4));
        assert_eq!(wp.weights[2], vec![0.0; 3]);
        assert_eq!(wp.weights[3], vec![0.0; 3]);
        assert_eq!(wp.flat.len(), 1);
        assert_eq!(wp.flat[0].reason, FlatReason::AllBanded);
    }

    #[test]
    fn missing_section_goes_flat() {
        let scores = panel(vec![]);
        let wp = PositionConstructor::default().construct(&scores, &Schedule::isolated(0..2, 1), &grid(2));
        assert_eq!(wp.flat.len(), 2);
        assert!(wp.weights.iter().all(|w| w.iter().all(|x| *x == 0.0)));
    }

    #[test]
    fn identical_scores_cancel_to_flat() {
        let (w, flat) = PositionConstructor::default()
            .target_weights(&section(0, &[(0, 1.0), (1, 1.0)]), 3);
        assert_eq!(flat, Some(FlatReason::ZeroAfterNeutralization));
        assert_eq!(w, vec![0.0; 3]);
    }

    #[test]
    fn long_only_scaling_without_neutralization() {
        let pc = PositionConstructor::new(PositionConfig {
            gross_exposure: 1.0,
            dollar_neutral: false,
        });
        let (w, _) = pc.target_weights(&section(0, &[(0, 3.0), (1, 1.0)]), 3);
        assert_eq!(w, vec![0.75, 0.25, 0.0]);
    }

    #[test]
    fn banded_assets_fund_the_survivor() {
        // asset 0 clears the band; 1 and 2 are banded to zero but stay in the mean
        let (w, flat) = PositionConstructor::default()
            .target_weights(&section(0, &[(0, 1.5), (1, 0.0), (2, 0.0)]), 3);
        assert!(flat.is_none());
        assert_eq!(w, vec![0.5, -0.25, -0.25]);
    }
}
