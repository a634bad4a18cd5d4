//! Domain types for crosslab.

pub mod bar;
pub mod ids;

pub use bar::Bar;
pub use ids::{AssetId, ConfigHash, DatasetHash};
