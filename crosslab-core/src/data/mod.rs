//! Panel construction: alignment, returns, synthetic data.

pub mod align;
pub mod panel;
pub mod synthetic;

pub use align::align_bars;
pub use panel::{PanelError, PricePanel, ReturnKind, ReturnPanel};
pub use synthetic::{synthetic_panel, SyntheticSpec};
