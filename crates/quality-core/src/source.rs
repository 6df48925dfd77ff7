//! Sample source seam
//!
//! The scoring engine never talks to a media stack directly; it pulls one
//! [`Sample`](crate::types::Sample) per tick from an implementation of
//! [`SampleSource`]. Production implementations wrap a vendor getStats
//! call; tests script a fixed sequence of samples.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Sample;

/// Supplier of timestamped publisher/subscriber stat pairs.
///
/// A fetch failure is fatal for the current test run: the orchestrator
/// cancels its timer and surfaces the error through the completion path.
/// Retry policy, if any, belongs inside the implementation.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch both sides' current statistics as one sample.
    async fn fetch_sample(&self) -> Result<Sample>;
}
