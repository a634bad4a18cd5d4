//! Cross-sectional signals: configuration, scoring, score storage.

pub mod builder;
pub mod config;
pub mod score;

pub use builder::{SignalBuilder, SignalError};
pub use config::{SignalConfig, SignalConfigError, SignalKind};
pub use score::{AssetScore, CrossSection, Exclusion, ExclusionReason, ScorePanel, SectionStatus};
