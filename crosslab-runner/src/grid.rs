//! Candidate grids for walk-forward parameter search.
//!
//! A grid is a finite cartesian product of signal parameters. It is passed to
//! the validator explicitly; nothing about the search lives in global state.

use serde::{Deserialize, Serialize};

use crosslab_core::signal::{SignalConfig, SignalKind};

/// Parameter ranges for one sleeve.
///
/// Window lists use `0` for "disabled" (no residualization, no vol scaling)
/// so the grid stays expressible in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalGrid {
    pub kind: SignalKind,
    pub lookbacks: Vec<usize>,
    #[serde(default = "default_skips")]
    pub skips: Vec<usize>,
    pub bands: Vec<f64>,
    #[serde(default = "default_disabled")]
    pub residual_windows: Vec<usize>,
    pub rebalance_every: Vec<usize>,
    #[serde(default = "default_disabled")]
    pub vol_windows: Vec<usize>,
}

fn default_skips() -> Vec<usize> {
    vec![0]
}

fn default_disabled() -> Vec<usize> {
    vec![0]
}

impl SignalGrid {
    /// Hourly reversal search around k = 2..4 with daily rebalancing.
    pub fn reversal_default() -> Self {
        Self {
            kind: SignalKind::Reversal,
            lookbacks: vec![2, 3, 4],
            skips: vec![0],
            bands: vec![1.5, 2.0, 2.5],
            residual_windows: vec![168],
            rebalance_every: vec![24],
            vol_windows: vec![24],
        }
    }

    /// Monthly-rebalanced momentum around k = 400 with a one-day skip.
    pub fn momentum_default() -> Self {
        Self {
            kind: SignalKind::Momentum,
            lookbacks: vec![240, 400, 720],
            skips: vec![24],
            bands: vec![2.0, 2.5],
            residual_windows: vec![0],
            rebalance_every: vec![720],
            vol_windows: vec![0],
        }
    }

    /// Grid containing exactly one configuration.
    pub fn single(config: &SignalConfig) -> Self {
        Self {
            kind: config.kind,
            lookbacks: vec![config.lookback],
            skips: vec![config.skip],
            bands: vec![config.band],
            residual_windows: vec![config.residual_window.unwrap_or(0)],
            rebalance_every: vec![config.rebalance_every],
            vol_windows: vec![config.vol_window.unwrap_or(0)],
        }
    }

    /// Number of configurations in the grid.
    pub fn size(&self) -> usize {
        self.lookbacks.len()
            * self.skips.len()
            * self.bands.len()
            * self.residual_windows.len()
            * self.rebalance_every.len()
            * self.vol_windows.len()
    }

    /// All configurations, in a fixed nesting order (lookback outermost).
    ///
    /// Candidate order is the final tie-break in selection, so it must never
    /// depend on hashing or thread scheduling.
    pub fn candidates(&self) -> Vec<SignalConfig> {
        let mut out = Vec::with_capacity(self.size());
        for &lookback in &self.lookbacks {
            for &skip in &self.skips {
                for &band in &self.bands {
                    for &resid in &self.residual_windows {
                        for &every in &self.rebalance_every {
                            for &vol in &self.vol_windows {
                                out.push(SignalConfig {
                                    kind: self.kind,
                                    lookback,
                                    skip,
                                    band,
                                    residual_window: (resid > 0).then_some(resid),
                                    rebalance_every: every,
                                    vol_window: (vol > 0).then_some(vol),
                                });
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Largest warm-up of any candidate.
    pub fn max_warmup(&self) -> usize {
        self.candidates()
            .iter()
            .map(SignalConfig::warmup)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_candidates() {
        let g = SignalGrid::reversal_default();
        assert_eq!(g.size(), 9);
        assert_eq!(g.candidates().len(), 9);
    }

    #[test]
    fn zero_disables_windows() {
        let g = SignalGrid::momentum_default();
        for c in g.candidates() {
            assert_eq!(c.residual_window, None);
            assert_eq!(c.vol_window, None);
            assert_eq!(c.skip, 24);
        }
    }

    #[test]
    fn order_is_lookback_major() {
        let g = SignalGrid::reversal_default();
        let ks: Vec<usize> = g.candidates().iter().map(|c| c.lookback).collect();
        assert_eq!(ks, vec![2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn single_roundtrips_config() {
        let cfg = SignalConfig::reversal(4);
        let g = SignalGrid::single(&cfg);
        assert_eq!(g.candidates(), vec![cfg]);
    }

    #[test]
    fn max_warmup_covers_largest_window() {
        let g = SignalGrid::momentum_default();
        assert_eq!(g.max_warmup(), 744);
    }

    #[test]
    fn decodes_from_toml_with_defaults() {
        let g: SignalGrid = toml::from_str(
            r#"
            kind = "reversal"
            lookbacks = [2, 4]
            bands = [2.5]
            rebalance_every = [24]
            "#,
        )
        .unwrap();
        assert_eq!(g.skips, vec![0]);
        assert_eq!(g.size(), 2);
    }
}
