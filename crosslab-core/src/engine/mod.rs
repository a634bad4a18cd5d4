//! Sleeve engine: signal, positions and simulation wired into one call.
//!
//! A sleeve run is three pure stages over a bar range:
//!
//! 1. `SignalBuilder` scores every rebalance bar
//! 2. `PositionConstructor` turns scores into a held weight path
//! 3. `SimulationEngine` applies the path to returns and charges costs

pub mod cost;
pub mod simulation;
pub mod sleeve;

pub use cost::CostModel;
pub use simulation::{SimulationEngine, SimulationError};
pub use sleeve::{rebase_equity, SleeveBar, SleeveResult};

use std::ops::Range;

use thiserror::Error;

use crate::data::ReturnPanel;
use crate::position::{PositionConfig, PositionConstructor};
use crate::schedule::Schedule;
use crate::signal::{SignalBuilder, SignalConfig, SignalError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Everything about a sleeve run except the signal parameters and the range.
#[derive(Debug, Clone, Default)]
pub struct SleeveRunner {
    pub builder: SignalBuilder,
    pub position: PositionConfig,
    pub cost: CostModel,
}

impl SleeveRunner {
    pub fn new(builder: SignalBuilder, position: PositionConfig, cost: CostModel) -> Self {
        Self {
            builder,
            position,
            cost,
        }
    }

    /// Run one sleeve over `range`, letting signals read history from
    /// `history_start` onward.
    pub fn run(
        &self,
        returns: &ReturnPanel,
        signal: &SignalConfig,
        range: Range<usize>,
        history_start: usize,
    ) -> Result<SleeveResult, EngineError> {
        let schedule = Schedule::new(range, signal.rebalance_every, history_start);
        let scores = self.builder.build(returns, signal, &schedule)?;
        let weights = PositionConstructor::new(self.position).construct(
            &scores,
            &schedule,
            returns.timestamps(),
        );
        let mut result =
            SimulationEngine::new(self.cost).simulate(&weights, returns, signal.label())?;
        result.fingerprint = Some(signal.fingerprint());
        result.exclusions = scores.exclusions;
        Ok(result)
    }

    /// Run over the full panel.
    pub fn run_full(
        &self,
        returns: &ReturnPanel,
        signal: &SignalConfig,
    ) -> Result<SleeveResult, EngineError> {
        self.run(returns, signal, 0..returns.n_bars(), 0)
    }
}
