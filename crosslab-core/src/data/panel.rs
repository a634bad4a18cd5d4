//! Point-in-time price panel and its cached return panel.
//!
//! A `PricePanel` holds one bar slot per (asset, timestamp) on a single,
//! strictly increasing timestamp grid shared by every asset. A missing bar is
//! an explicit gap (`None`); nothing is ever forward-filled. Returns are
//! derived once per `ReturnKind` and cached on the panel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AssetId, Bar, DatasetHash};

/// Errors raised while building a panel. All of them are fatal: a panel that
/// fails construction can never reach the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PanelError {
    #[error("panel has no timestamps")]
    Empty,
    #[error("panel has no assets")]
    NoAssets,
    #[error("timestamps not strictly increasing at index {index}: {prev} >= {next}")]
    NonMonotonic {
        index: usize,
        prev: NaiveDateTime,
        next: NaiveDateTime,
    },
    #[error("misaligned panel: asset '{asset}' {detail}")]
    Misaligned { asset: AssetId, detail: String },
    #[error("duplicate asset '{0}'")]
    DuplicateAsset(AssetId),
    #[error("invalid bar for '{asset}' at {timestamp}: {reason}")]
    InvalidBar {
        asset: AssetId,
        timestamp: NaiveDateTime,
        reason: String,
    },
}

/// Simple (`p_t / p_{t-1} - 1`) or log (`ln(p_t / p_{t-1})`) returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    #[default]
    Simple,
    Log,
}

impl ReturnKind {
    /// Convert a return of this kind to a simple return.
    pub fn to_simple(self, r: f64) -> f64 {
        match self {
            ReturnKind::Simple => r,
            ReturnKind::Log => r.exp_m1(),
        }
    }
}

/// Per-bar returns derived from a `PricePanel`.
///
/// The return at index `t` uses only the closes at `t` and `t - 1`. Index 0
/// is always a gap, as is any bar whose own close or previous close is missing.
#[derive(Debug, Clone)]
pub struct ReturnPanel {
    kind: ReturnKind,
    timestamps: Vec<NaiveDateTime>,
    assets: Vec<AssetId>,
    /// Asset-major: `values[asset][t]`.
    values: Vec<Vec<Option<f64>>>,
}

impl ReturnPanel {
    fn from_prices(panel: &PricePanel, kind: ReturnKind) -> Self {
        let values = panel
            .bars
            .iter()
            .map(|series| {
                let mut out = Vec::with_capacity(series.len());
                out.push(None);
                for w in series.windows(2) {
                    let r = match (&w[0], &w[1]) {
                        (Some(prev), Some(cur)) => Some(match kind {
                            ReturnKind::Simple => cur.close / prev.close - 1.0,
                            ReturnKind::Log => (cur.close / prev.close).ln(),
                        }),
                        _ => None,
                    };
                    out.push(r);
                }
                out
            })
            .collect();

        Self {
            kind,
            timestamps: panel.timestamps.clone(),
            assets: panel.assets.clone(),
            values,
        }
    }

    /// Build a return panel directly from return columns (asset-major).
    ///
    /// Intended for tests and for consumers that already hold returns; every
    /// column must match the grid length.
    pub fn from_columns(
        kind: ReturnKind,
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<(AssetId, Vec<Option<f64>>)>,
    ) -> Result<Self, PanelError> {
        validate_grid(&timestamps)?;
        if columns.is_empty() {
            return Err(PanelError::NoAssets);
        }
        let mut seen = BTreeSet::new();
        let mut assets = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (asset, col) in columns {
            if !seen.insert(asset.clone()) {
                return Err(PanelError::DuplicateAsset(asset));
            }
            if col.len() != timestamps.len() {
                return Err(PanelError::Misaligned {
                    detail: format!(
                        "has {} returns for a grid of {} timestamps",
                        col.len(),
                        timestamps.len()
                    ),
                    asset,
                });
            }
            assets.push(asset);
            values.push(col);
        }
        Ok(Self {
            kind,
            timestamps,
            assets,
            values,
        })
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn n_bars(&self) -> usize {
        self.timestamps.len()
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn asset_index(&self, asset: &AssetId) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Return of asset `a` for bar `t`, or `None` for a gap.
    pub fn get(&self, a: usize, t: usize) -> Option<f64> {
        self.values.get(a).and_then(|col| col.get(t).copied().flatten())
    }

    /// Full return column of asset `a`.
    pub fn column(&self, a: usize) -> &[Option<f64>] {
        &self.values[a]
    }
}

/// Immutable, point-in-time aligned store of bars per asset.
#[derive(Debug, Clone)]
pub struct PricePanel {
    timestamps: Vec<NaiveDateTime>,
    /// Sorted ascending for deterministic iteration.
    assets: Vec<AssetId>,
    /// Asset-major: `bars[asset][t]`, `None` marks an explicit gap.
    bars: Vec<Vec<Option<Bar>>>,
    simple: OnceLock<ReturnPanel>,
    log: OnceLock<ReturnPanel>,
}

impl PricePanel {
    /// Build a panel from a shared grid and per-asset bar slots.
    ///
    /// Every series must have exactly one slot per grid timestamp and every
    /// present bar must carry the grid timestamp of its slot. Void bars (NaN
    /// OHLC) are stored as gaps.
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        series: Vec<(AssetId, Vec<Option<Bar>>)>,
    ) -> Result<Self, PanelError> {
        validate_grid(&timestamps)?;
        if series.is_empty() {
            return Err(PanelError::NoAssets);
        }

        let mut by_asset: BTreeMap<AssetId, Vec<Option<Bar>>> = BTreeMap::new();
        for (asset, slots) in series {
            if slots.len() != timestamps.len() {
                return Err(PanelError::Misaligned {
                    detail: format!(
                        "has {} bar slots for a grid of {} timestamps",
                        slots.len(),
                        timestamps.len()
                    ),
                    asset,
                });
            }
            let mut cleaned = Vec::with_capacity(slots.len());
            for (slot, ts) in slots.into_iter().zip(&timestamps) {
                match slot {
                    None => cleaned.push(None),
                    Some(bar) if bar.is_void() => cleaned.push(None),
                    Some(bar) => {
                        if bar.timestamp != *ts {
                            return Err(PanelError::Misaligned {
                                detail: format!(
                                    "has a bar stamped {} in the {} slot",
                                    bar.timestamp, ts
                                ),
                                asset,
                            });
                        }
                        if bar.asset != asset {
                            return Err(PanelError::Misaligned {
                                detail: format!("contains a bar for '{}'", bar.asset),
                                asset,
                            });
                        }
                        if bar.close <= 0.0 || !bar.close.is_finite() {
                            return Err(PanelError::InvalidBar {
                                asset,
                                timestamp: *ts,
                                reason: format!("non-positive close {}", bar.close),
                            });
                        }
                        cleaned.push(Some(bar));
                    }
                }
            }
            if by_asset.insert(asset.clone(), cleaned).is_some() {
                return Err(PanelError::DuplicateAsset(asset));
            }
        }

        let (assets, bars) = by_asset.into_iter().unzip();
        Ok(Self {
            timestamps,
            assets,
            bars,
            simple: OnceLock::new(),
            log: OnceLock::new(),
        })
    }

    /// Strict construction from complete per-asset bar lists.
    ///
    /// Every asset must cover exactly the same timestamp sequence; any
    /// difference is a `PanelError::Misaligned`. Use
    /// [`align_bars`](super::align::align_bars) to build a panel from ragged
    /// histories with explicit gaps instead.
    pub fn from_bars(
        series: impl IntoIterator<Item = (AssetId, Vec<Bar>)>,
    ) -> Result<Self, PanelError> {
        let mut series: Vec<(AssetId, Vec<Bar>)> = series.into_iter().collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));
        let Some((first_asset, first_bars)) = series.first() else {
            return Err(PanelError::NoAssets);
        };
        let grid: Vec<NaiveDateTime> = first_bars.iter().map(|b| b.timestamp).collect();

        for (asset, bars) in series.iter().skip(1) {
            if bars.len() != grid.len() {
                return Err(PanelError::Misaligned {
                    asset: asset.clone(),
                    detail: format!(
                        "has {} bars but '{}' has {}",
                        bars.len(),
                        first_asset,
                        grid.len()
                    ),
                });
            }
            if let Some((i, bar)) = bars
                .iter()
                .enumerate()
                .find(|(i, bar)| bar.timestamp != grid[*i])
            {
                return Err(PanelError::Misaligned {
                    asset: asset.clone(),
                    detail: format!(
                        "bar {} is stamped {} but '{}' is stamped {}",
                        i, bar.timestamp, first_asset, grid[i]
                    ),
                });
            }
        }

        let series = series
            .into_iter()
            .map(|(asset, bars)| (asset, bars.into_iter().map(Some).collect()))
            .collect();
        Self::new(grid, series)
    }

    /// Build a close-only panel: each `Some(close)` becomes a bar whose OHLC
    /// equal the close, each `None` an explicit gap.
    pub fn from_closes(
        timestamps: Vec<NaiveDateTime>,
        closes: Vec<(AssetId, Vec<Option<f64>>)>,
    ) -> Result<Self, PanelError> {
        let series = closes
            .into_iter()
            .map(|(asset, col)| {
                let slots = col
                    .into_iter()
                    .zip(&timestamps)
                    .map(|(c, ts)| c.map(|c| Bar::from_close(*ts, asset.clone(), c)))
                    .collect();
                (asset, slots)
            })
            .collect();
        Self::new(timestamps, series)
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn n_bars(&self) -> usize {
        self.timestamps.len()
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn asset_index(&self, asset: &AssetId) -> Option<usize> {
        self.assets.binary_search(asset).ok()
    }

    pub fn bar(&self, a: usize, t: usize) -> Option<&Bar> {
        self.bars.get(a).and_then(|s| s.get(t)).and_then(|b| b.as_ref())
    }

    pub fn close(&self, a: usize, t: usize) -> Option<f64> {
        self.bar(a, t).map(|b| b.close)
    }

    /// Assets with a bar at `t` (the explicit presence set of that timestamp).
    pub fn present_at(&self, t: usize) -> Vec<usize> {
        (0..self.assets.len())
            .filter(|&a| self.bar(a, t).is_some())
            .collect()
    }

    /// Fraction of gap slots per asset, in asset order.
    pub fn gap_rates(&self) -> Vec<(AssetId, f64)> {
        let n = self.timestamps.len().max(1) as f64;
        self.assets
            .iter()
            .zip(&self.bars)
            .map(|(asset, s)| {
                let gaps = s.iter().filter(|b| b.is_none()).count();
                (asset.clone(), gaps as f64 / n)
            })
            .collect()
    }

    /// Derived returns, computed on first access and cached for the panel's lifetime.
    pub fn returns(&self, kind: ReturnKind) -> &ReturnPanel {
        match kind {
            ReturnKind::Simple => self
                .simple
                .get_or_init(|| ReturnPanel::from_prices(self, ReturnKind::Simple)),
            ReturnKind::Log => self
                .log
                .get_or_init(|| ReturnPanel::from_prices(self, ReturnKind::Log)),
        }
    }

    /// BLAKE3 over the canonical panel content (grid, asset ids, close bits).
    pub fn dataset_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        for ts in &self.timestamps {
            hasher.update(&ts.and_utc().timestamp().to_le_bytes());
        }
        for (asset, series) in self.assets.iter().zip(&self.bars) {
            hasher.update(asset.as_str().as_bytes());
            for slot in series {
                match slot {
                    Some(bar) => hasher.update(&bar.close.to_bits().to_le_bytes()),
                    None => hasher.update(b"gap"),
                };
            }
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }
}

fn validate_grid(timestamps: &[NaiveDateTime]) -> Result<(), PanelError> {
    if timestamps.is_empty() {
        return Err(PanelError::Empty);
    }
    for (i, w) in timestamps.windows(2).enumerate() {
        if w[1] <= w[0] {
            return Err(PanelError::NonMonotonic {
                index: i + 1,
                prev: w[0],
                next: w[1],
            });
        }
    }
    Ok(())
}
