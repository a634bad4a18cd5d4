//! Bar: the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::AssetId;

/// OHLCV bar for a single asset at a single timestamp of the panel grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub asset: AssetId,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// A bar that only carries a close price. Used for close-only panels
    /// (wide CSV files, synthetic data) where OHLC collapse to the close.
    pub fn from_close(timestamp: NaiveDateTime, asset: AssetId, close: f64) -> Self {
        Self {
            timestamp,
            asset,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }
}
