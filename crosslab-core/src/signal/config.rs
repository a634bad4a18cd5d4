//! Signal configuration value object.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ConfigHash;

/// Direction of the cross-sectional signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Score = -(cumulative return over the lookback): buy recent losers.
    Reversal,
    /// Score = +(cumulative return over the lookback): buy recent winners.
    Momentum,
}

impl SignalKind {
    fn sign(self) -> f64 {
        match self {
            SignalKind::Reversal => -1.0,
            SignalKind::Momentum => 1.0,
        }
    }
}

/// Errors from `SignalConfig::validate`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignalConfigError {
    #[error("{field} must be >= {min}, got {value}")]
    WindowTooShort {
        field: &'static str,
        min: usize,
        value: usize,
    },
    #[error("band must be finite and >= 0, got {0}")]
    InvalidBand(f64),
}

/// Immutable signal configuration.
///
/// Windows are in bars. A score at bar `t` reads returns no later than `t - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub kind: SignalKind,
    /// Bars summed into the cumulative return.
    pub lookback: usize,
    /// Bars between the end of the lookback window and `t - 1`.
    #[serde(default)]
    pub skip: usize,
    /// Dead-zone on the absolute cross-sectional z-score. 0 disables banding.
    pub band: f64,
    /// Trailing OLS window for benchmark residualization. `None` disables it.
    #[serde(default)]
    pub residual_window: Option<usize>,
    /// Bars between rebalances.
    pub rebalance_every: usize,
    /// Trailing realized-volatility window. `None` or 1 disables vol scaling.
    #[serde(default)]
    pub vol_window: Option<usize>,
}

impl SignalConfig {
    /// Short-horizon reversal with benchmark residualization and vol scaling.
    pub fn reversal(lookback: usize) -> Self {
        Self {
            kind: SignalKind::Reversal,
            lookback,
            skip: 0,
            band: 2.5,
            residual_window: Some(168),
            rebalance_every: 24,
            vol_window: Some(24),
        }
    }

    /// Long-horizon momentum, lagged one day, on raw returns.
    pub fn momentum(lookback: usize) -> Self {
        Self {
            kind: SignalKind::Momentum,
            lookback,
            skip: 24,
            band: 2.5,
            residual_window: None,
            rebalance_every: 720,
            vol_window: None,
        }
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_band(mut self, band: f64) -> Self {
        self.band = band;
        self
    }

    pub fn with_residual_window(mut self, window: Option<usize>) -> Self {
        self.residual_window = window;
        self
    }

    pub fn with_rebalance_every(mut self, every: usize) -> Self {
        self.rebalance_every = every;
        self
    }

    pub fn with_vol_window(mut self, window: Option<usize>) -> Self {
        self.vol_window = window;
        self
    }

    pub fn validate(&self) -> Result<(), SignalConfigError> {
        check_window("lookback", self.lookback, 1)?;
        check_window("rebalance_every", self.rebalance_every, 1)?;
        if let Some(w) = self.residual_window {
            check_window("residual_window", w, 2)?;
        }
        if let Some(w) = self.vol_window {
            check_window("vol_window", w, 1)?;
        }
        if !self.band.is_finite() || self.band < 0.0 {
            return Err(SignalConfigError::InvalidBand(self.band));
        }
        Ok(())
    }

    /// Vol window actually applied (windows of one bar have no dispersion).
    pub fn effective_vol_window(&self) -> Option<usize> {
        self.vol_window.filter(|w| *w > 1)
    }

    /// Consecutive observed returns required before a score can be produced.
    pub fn warmup(&self) -> usize {
        [
            Some(self.lookback + self.skip),
            self.residual_window,
            self.effective_vol_window(),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(self.lookback)
    }

    pub(crate) fn direction(&self) -> f64 {
        self.kind.sign()
    }

    /// BLAKE3 of the canonical JSON encoding.
    pub fn fingerprint(&self) -> ConfigHash {
        let json = serde_json::to_string(self).unwrap_or_default();
        ConfigHash::from_bytes(json.as_bytes())
    }

    /// Compact human-readable label, e.g. `reversal(k=4,band=2.5,resid=168,every=24,vol=24)`.
    pub fn label(&self) -> String {
        let kind = match self.kind {
            SignalKind::Reversal => "reversal",
            SignalKind::Momentum => "momentum",
        };
        let mut s = format!("{kind}(k={}", self.lookback);
        if self.skip > 0 {
            s.push_str(&format!(",skip={}", self.skip));
        }
        s.push_str(&format!(",band={}", self.band));
        if let Some(w) = self.residual_window {
            s.push_str(&format!(",resid={w}"));
        }
        s.push_str(&format!(",every={}", self.rebalance_every));
        if let Some(w) = self.vol_window {
            s.push_str(&format!(",vol={w}"));
        }
        s.push(')');
        s
    }
}

fn check_window(field: &'static str, value: usize, min: usize) -> Result<(), SignalConfigError> {
    if value < min {
        return Err(SignalConfigError::WindowTooShort { field, min, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SignalConfig::reversal(4).validate().is_ok());
        assert!(SignalConfig::momentum(400).validate().is_ok());
    }

    #[test]
    fn zero_windows_rejected() {
        let err = SignalConfig::reversal(0).validate().unwrap_err();
        assert!(matches!(
            err,
            SignalConfigError::WindowTooShort { field: "lookback", .. }
        ));
        let err = SignalConfig::reversal(4)
            .with_rebalance_every(0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            SignalConfigError::WindowTooShort { field: "rebalance_every", .. }
        ));
        assert!(SignalConfig::reversal(4)
            .with_residual_window(Some(1))
            .validate()
            .is_err());
    }

    #[test]
    fn negative_band_rejected() {
        assert_eq!(
            SignalConfig::reversal(4).with_band(-1.0).validate(),
            Err(SignalConfigError::InvalidBand(-1.0))
        );
    }

    #[test]
    fn warmup_is_max_of_windows() {
        assert_eq!(SignalConfig::reversal(4).warmup(), 168);
        assert_eq!(SignalConfig::momentum(400).warmup(), 424);
        let c = SignalConfig::reversal(2)
            .with_residual_window(None)
            .with_vol_window(Some(1));
        assert_eq!(c.warmup(), 2);
        assert_eq!(c.effective_vol_window(), None);
    }

    #[test]
    fn fingerprint_tracks_parameters() {
        let a = SignalConfig::reversal(4);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), a.clone().with_band(2.0).fingerprint());
    }

    #[test]
    fn label_lists_active_parameters() {
        assert_eq!(
            SignalConfig::momentum(400).label(),
            "momentum(k=400,skip=24,band=2.5,every=720)"
        );
    }

    #[test]
    fn decoding_fills_optional_fields() {
        let cfg: SignalConfig = serde_json::from_str(
            r#"{"kind":"reversal","lookback":3,"band":0.0,"rebalance_every":1}"#,
        )
        .unwrap();
        assert_eq!(cfg.skip, 0);
        assert_eq!(cfg.residual_window, None);
        assert_eq!(cfg.vol_window, None);
    }
}
