//! Sliding-window statistics over the sample log
//!
//! This module provides the windowing/pruning primitives, the per-tick
//! throughput calculator, and the steady-state detector that together
//! turn the raw sample log into averaged per-media statistics.

pub mod steady_state;
pub mod throughput;
pub mod window;

pub use steady_state::is_steady;
pub use throughput::{average, publisher_stats, quality_stats};
pub use throughput::{PublisherWindowStats, TickStats, WindowAverages};
pub use window::{prune_to, windowed};
