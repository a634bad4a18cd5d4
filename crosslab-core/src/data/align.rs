//! Multi-asset time alignment.
//!
//! Given bars for multiple assets with ragged histories, align them to a
//! common timeline. Missing bars become explicit gaps (no forward-fill of
//! tradable price data).

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;

use super::panel::{PanelError, PricePanel};
use crate::domain::{AssetId, Bar};

/// Align multiple assets to the union of their timestamps.
///
/// For each timestamp in the union, each asset either has its real bar or an
/// explicit gap. Duplicate timestamps inside one asset's history are rejected
/// as misalignment because the slot they belong to is ambiguous.
pub fn align_bars(series: HashMap<AssetId, Vec<Bar>>) -> Result<PricePanel, PanelError> {
    let mut all: BTreeSet<NaiveDateTime> = BTreeSet::new();
    for bars in series.values() {
        for bar in bars {
            all.insert(bar.timestamp);
        }
    }
    let timestamps: Vec<NaiveDateTime> = all.into_iter().collect();
    let slot_of: HashMap<NaiveDateTime, usize> = timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| (*ts, i))
        .collect();

    let mut aligned = Vec::with_capacity(series.len());
    for (asset, bars) in series {
        let mut slots: Vec<Option<Bar>> = vec![None; timestamps.len()];
        for bar in bars {
            let i = slot_of[&bar.timestamp];
            if slots[i].is_some() {
                return Err(PanelError::Misaligned {
                    detail: format!("has two bars stamped {}", bar.timestamp),
                    asset,
                });
            }
            slots[i] = Some(bar);
        }
        aligned.push((asset, slots));
    }

    PricePanel::new(timestamps, aligned)
}
