//! Crosslab Core: panels, cross-sectional signals, positions, sleeve simulation.
//!
//! This crate contains the point-in-time backtesting pipeline:
//! - Domain types (bars, asset ids, hashes)
//! - Aligned price panels with explicit gaps and cached returns
//! - Reversal and momentum cross-sectional scoring with residualization
//! - Dollar-neutral position construction on a fixed rebalance schedule
//! - Per-bar sleeve simulation with turnover costs

pub mod data;
pub mod domain;
pub mod engine;
pub mod position;
pub mod schedule;
pub mod signal;
pub mod stats;
