//! Deterministic synthetic panels for tests, benchmarks and dry runs.
//!
//! Prices follow a one-factor model: every asset loads on a benchmark return
//! with its own beta, plus an idiosyncratic AR(1) shock. A negative AR
//! coefficient produces short-horizon reversal in the residuals, which gives
//! the reversal sleeve something to find.

use chrono::{Duration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::panel::{PanelError, PricePanel};
use crate::domain::AssetId;

/// Shape of a synthetic panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub n_assets: usize,
    pub n_bars: usize,
    pub start: NaiveDateTime,
    /// Minutes between grid timestamps (60 for hourly bars).
    pub bar_minutes: i64,
    /// Name of the benchmark asset, also included in the panel.
    pub benchmark: Option<AssetId>,
    /// Per-bar volatility of the benchmark factor.
    pub factor_vol: f64,
    /// Per-bar volatility of idiosyncratic shocks.
    pub idio_vol: f64,
    /// AR(1) coefficient of idiosyncratic returns (negative = reversal).
    pub ar_coef: f64,
    /// Probability that any single non-benchmark bar is a gap.
    pub gap_rate: f64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n_assets: 8,
            n_bars: 2_000,
            start: chrono::NaiveDate::from_ymd_opt(2023, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            bar_minutes: 60,
            benchmark: Some(AssetId::new("BTCUSDT")),
            factor_vol: 0.006,
            idio_vol: 0.008,
            ar_coef: -0.15,
            gap_rate: 0.0,
        }
    }
}

/// Generate a panel from `spec`. Same `(spec, seed)` always yields the same panel.
pub fn synthetic_panel(spec: &SyntheticSpec, seed: u64) -> Result<PricePanel, PanelError> {
    let timestamps: Vec<NaiveDateTime> = (0..spec.n_bars)
        .map(|i| spec.start + Duration::minutes(spec.bar_minutes * i as i64))
        .collect();

    let mut factor_rng = StdRng::seed_from_u64(sub_seed(seed, "__factor__"));
    let factor: Vec<f64> = (0..spec.n_bars)
        .map(|_| gaussian(&mut factor_rng) * spec.factor_vol)
        .collect();

    let mut columns = Vec::with_capacity(spec.n_assets + 1);
    if let Some(bench) = &spec.benchmark {
        let mut price = 20_000.0;
        let col = factor
            .iter()
            .map(|r| {
                price *= 1.0 + r;
                Some(price)
            })
            .collect();
        columns.push((bench.clone(), col));
    }

    for i in 0..spec.n_assets {
        let asset = AssetId::new(format!("SYN{i:02}"));
        let mut rng = StdRng::seed_from_u64(sub_seed(seed, asset.as_str()));
        let beta: f64 = rng.gen_range(0.6..1.4);
        let mut price: f64 = rng.gen_range(5.0..500.0);
        let mut prev_idio = 0.0;
        let mut col = Vec::with_capacity(spec.n_bars);
        for f in &factor {
            let idio = spec.ar_coef * prev_idio + gaussian(&mut rng) * spec.idio_vol;
            prev_idio = idio;
            price *= 1.0 + beta * f + idio;
            price = price.max(1e-6);
            if spec.gap_rate > 0.0 && rng.gen_bool(spec.gap_rate.min(1.0)) {
                col.push(None);
            } else {
                col.push(Some(price));
            }
        }
        columns.push((asset, col));
    }

    PricePanel::from_closes(timestamps, columns)
}

/// Per-asset seed derived with BLAKE3, independent of generation order.
fn sub_seed(master: u64, label: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master.to_le_bytes());
    hasher.update(label.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Standard normal draw via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
