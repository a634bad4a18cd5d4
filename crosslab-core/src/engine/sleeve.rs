//! SleeveResult: the per-bar return record of one simulated sleeve.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::ConfigHash;
use crate::position::FlatRebalance;
use crate::signal::Exclusion;

/// One simulated bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleeveBar {
    pub timestamp: NaiveDateTime,
    /// Index of the bar on the panel grid.
    pub t: usize,
    pub net_return: f64,
    pub gross_return: f64,
    pub turnover: f64,
    pub cost: f64,
    /// Compounded net equity after this bar, starting from 1.0.
    pub equity: f64,
}

/// Ordered per-bar results of a sleeve plus the coverage metadata gathered
/// while producing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleeveResult {
    pub label: String,
    pub fingerprint: Option<ConfigHash>,
    pub bars: Vec<SleeveBar>,
    pub exclusions: Vec<Exclusion>,
    pub flat_rebalances: Vec<FlatRebalance>,
    pub rebalance_count: usize,
}

impl SleeveResult {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn net_returns(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.net_return).collect()
    }

    pub fn gross_returns(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.gross_return).collect()
    }

    pub fn turnover(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.turnover).collect()
    }

    pub fn equity_curve(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.equity).collect()
    }

    pub fn total_cost(&self) -> f64 {
        self.bars.iter().map(|b| b.cost).sum()
    }

    pub fn mean_turnover(&self) -> f64 {
        if self.bars.is_empty() {
            return 0.0;
        }
        self.bars.iter().map(|b| b.turnover).sum::<f64>() / self.bars.len() as f64
    }

    pub fn final_equity(&self) -> f64 {
        self.bars.last().map(|b| b.equity).unwrap_or(1.0)
    }

    /// Concatenate time-ordered, non-overlapping parts into one series.
    ///
    /// Equity is recompounded across the joined bars. Returns `None` if the
    /// parts overlap or are out of order.
    pub fn concat(label: impl Into<String>, parts: &[SleeveResult]) -> Option<SleeveResult> {
        let mut bars: Vec<SleeveBar> = Vec::new();
        let mut exclusions = Vec::new();
        let mut flat_rebalances = Vec::new();
        let mut rebalance_count = 0;
        for part in parts {
            if let (Some(last), Some(first)) = (bars.last(), part.bars.first()) {
                if first.t <= last.t {
                    return None;
                }
            }
            bars.extend(part.bars.iter().copied());
            exclusions.extend(part.exclusions.iter().cloned());
            flat_rebalances.extend(part.flat_rebalances.iter().cloned());
            rebalance_count += part.rebalance_count;
        }
        Some(SleeveResult {
            label: label.into(),
            fingerprint: None,
            bars: rebase_equity(bars),
            exclusions,
            flat_rebalances,
            rebalance_count,
        })
    }
}

/// Recompute the equity column from net returns, starting at 1.0.
pub fn rebase_equity(mut bars: Vec<SleeveBar>) -> Vec<SleeveBar> {
    let mut equity = 1.0;
    for b in &mut bars {
        equity *= 1.0 + b.net_return;
        b.equity = equity;
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bar(t: usize, net: f64) -> SleeveBar {
        SleeveBar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + Duration::hours(t as i64),
            t,
            net_return: net,
            gross_return: net,
            turnover: 0.0,
            cost: 0.0,
            equity: 0.0,
        }
    }

    fn result(bars: Vec<SleeveBar>) -> SleeveResult {
        SleeveResult {
            label: "x".into(),
            fingerprint: None,
            bars: rebase_equity(bars),
            exclusions: Vec::new(),
            flat_rebalances: Vec::new(),
            rebalance_count: 0,
        }
    }

    #[test]
    fn equity_compounds_multiplicatively() {
        let r = result(vec![bar(0, 0.10), bar(1, -0.10)]);
        assert!((r.final_equity() - 0.99).abs() < 1e-12);
    }

    #[test]
    fn concat_rejects_overlap() {
        let a = result(vec![bar(0, 0.01), bar(1, 0.01)]);
        let b = result(vec![bar(1, 0.01)]);
        assert!(SleeveResult::concat("oos", &[a.clone(), b]).is_none());
        let c = result(vec![bar(5, 0.02)]);
        let joined = SleeveResult::concat("oos", &[a, c]).unwrap();
        assert_eq!(joined.len(), 3);
        assert!((joined.final_equity() - 1.01 * 1.01 * 1.02).abs() < 1e-12);
    }

    #[test]
    fn concat_counts_rebalances_per_part() {
        let mut a = result((0..10).map(|t| bar(t, 0.0)).collect());
        a.rebalance_count = 1;
        let mut b = result((10..100).map(|t| bar(t, 0.0)).collect());
        b.rebalance_count = 9;
        let joined = SleeveResult::concat("oos", &[a.clone(), b]).unwrap();
        assert_eq!(joined.len(), 100);
        assert_eq!(joined.rebalance_count, 10);
        let single = SleeveResult::concat("oos", &[a]).unwrap();
        assert_eq!(single.rebalance_count, 1);
    }
}
