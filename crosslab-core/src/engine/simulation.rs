//! SimulationEngine: turns a weight path into per-bar sleeve returns.
//!
//! The weights held after bar `t-1` earn the return of bar `t`. Turnover is
//! charged only on rebalance bars, including the entry from a flat book at the
//! first bar of the range.

use thiserror::Error;
use tracing::debug;

use super::cost::CostModel;
use super::sleeve::{SleeveBar, SleeveResult};
use crate::data::ReturnPanel;
use crate::position::WeightPanel;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("weight panel assets do not match the return panel")]
    AssetMismatch,
    #[error("weight panel range ends at {end} but the return panel has {n_bars} bars")]
    OutOfBounds { end: usize, n_bars: usize },
    #[error("weight panel has {found} bars for a range of {expected}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("weight vector at bar {t} has {found} entries, expected {expected}")]
    WidthMismatch {
        t: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationEngine {
    cost: CostModel,
}

impl SimulationEngine {
    pub fn new(cost: CostModel) -> Self {
        Self { cost }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Simulate the weight path against the return panel.
    ///
    /// A missing return contributes zero to the bar's gross return; the held
    /// weight stays in place. Log returns are converted to simple returns
    /// before they are weighted.
    pub fn simulate(
        &self,
        weights: &WeightPanel,
        returns: &ReturnPanel,
        label: impl Into<String>,
    ) -> Result<SleeveResult, SimulationError> {
        if weights.assets.as_slice() != returns.assets() {
            return Err(SimulationError::AssetMismatch);
        }
        let sched = weights.schedule;
        if sched.end > returns.n_bars() {
            return Err(SimulationError::OutOfBounds {
                end: sched.end,
                n_bars: returns.n_bars(),
            });
        }

        if weights.weights.len() != sched.len()
            || weights.rebalance.len() != sched.len()
            || weights.timestamps.len() != sched.len()
        {
            return Err(SimulationError::LengthMismatch {
                expected: sched.len(),
                found: weights.weights.len(),
            });
        }

        let n_assets = weights.assets.len();
        let flat = vec![0.0; n_assets];
        let mut bars = Vec::with_capacity(sched.len());
        let mut equity = 1.0;

        for (i, t) in sched.range().enumerate() {
            let current = &weights.weights[i];
            if current.len() != n_assets {
                return Err(SimulationError::WidthMismatch {
                    t,
                    expected: n_assets,
                    found: current.len(),
                });
            }
            let prev: &[f64] = if i == 0 { &flat } else { &weights.weights[i - 1] };

            let gross: f64 = prev
                .iter()
                .enumerate()
                .filter(|(_, w)| **w != 0.0)
                .filter_map(|(a, w)| returns.get(a, t).map(|r| w * returns.kind().to_simple(r)))
                .sum();

            let turnover = if weights.rebalance[i] {
                current
                    .iter()
                    .zip(prev)
                    .map(|(w, p)| (w - p).abs())
                    .sum()
            } else {
                0.0
            };
            let cost = self.cost.cost(turnover);
            let net = gross - cost;
            equity *= 1.0 + net;

            bars.push(SleeveBar {
                timestamp: weights.timestamps[i],
                t,
                net_return: net,
                gross_return: gross,
                turnover,
                cost,
                equity,
            });
        }

        let result = SleeveResult {
            label: label.into(),
            fingerprint: None,
            bars,
            exclusions: Vec::new(),
            flat_rebalances: weights.flat.clone(),
            rebalance_count: weights.rebalance.iter().filter(|r| **r).count(),
        };
        debug!(
            label = %result.label,
            bars = result.len(),
            final_equity = result.final_equity(),
            total_cost = result.total_cost(),
            "simulated sleeve"
        );
        Ok(result)
    }
}
