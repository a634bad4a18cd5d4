//! Cost model: proportional transaction cost on turnover.

use serde::{Deserialize, Serialize};

/// Transaction cost charged per unit of turnover, in basis points.
///
/// One unit of turnover is a change of 1.0 in the sum of absolute weights
/// (e.g. moving 50% of equity from one asset to another is 1.0 of turnover).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub cost_bps: f64,
}

impl CostModel {
    pub fn new(cost_bps: f64) -> Self {
        Self { cost_bps }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0)
    }

    /// Cost as a fraction of equity per unit of turnover.
    pub fn rate(&self) -> f64 {
        self.cost_bps / 10_000.0
    }

    /// Cost incurred on a bar with the given turnover.
    pub fn cost(&self, turnover: f64) -> f64 {
        if self.cost_bps == 0.0 {
            return 0.0;
        }
        turnover * self.rate()
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(7.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bps_to_rate() {
        let m = CostModel::new(7.0);
        assert!((m.rate() - 0.0007).abs() < 1e-15);
        assert!((m.cost(2.0) - 0.0014).abs() < 1e-15);
    }

    #[test]
    fn frictionless_costs_nothing() {
        assert_eq!(CostModel::frictionless().cost(3.5), 0.0);
    }
}
