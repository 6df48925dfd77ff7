//! # Quality-Core: Real-Time Call-Quality Scoring Engine
//!
//! This library ingests periodic transport-layer statistics from one
//! audio/video stream pair (outbound stats from a publisher, inbound
//! stats from a subscriber) and computes a continuously updated Mean
//! Opinion Score per media type, per-media throughput and packet-loss
//! averages, a steady-state detector used to end sampling early, and a
//! final supported/unsupported verdict with recommended capture settings.
//!
//! ## Architecture
//!
//! ```text
//! SampleSource ──► ScoringEngine ──► stats::{window, throughput, steady_state}
//!    (async)            │                       │
//!                       ├──► mos (E-model audio, log-power video)
//!                       └──► evaluator (ordered threshold tables)
//!
//! QualityTest drives the engine from a repeating tokio timer and races
//! the hard duration bound against steady-state detection.
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use precall_quality_core::{QualityTest, QualityTestConfig, TestKind};
//! use precall_quality_core::source::SampleSource;
//!
//! # async fn demo(source: Arc<dyn SampleSource>) -> precall_quality_core::Result<()> {
//! let handle = QualityTest::spawn(
//!     QualityTestConfig::default(),
//!     TestKind::AudioAndVideo,
//!     source,
//!     None,
//! )?;
//!
//! let results = handle.join().await?;
//! println!("audio MOS: {:?}", results.audio.mos);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod evaluator;
pub mod mos;
pub mod orchestrator;
pub mod source;
pub mod stats;
pub mod types;

// Re-export the main public surface
pub use config::{AudioThreshold, QualityTestConfig, VideoThreshold};
pub use error::{QualityError, Result};
pub use orchestrator::{
    QualityTest, ScoringEngine, TestHandle, TestKind, TestPhase, TestUpdate, TickOutcome,
};
pub use source::SampleSource;
pub use types::{
    AverageStats, Bandwidth, MediaType, PublisherSample, Resolution, Sample, SubscriberSample,
    TestResults, TrackCounters,
};
