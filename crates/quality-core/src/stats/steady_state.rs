//! Steady-state detection over the windowed sample log
//!
//! A test run can finish early once throughput has stabilized: within the
//! detection window, no per-tick bitrate may exceed the previous tick's
//! bitrate by more than the allowed fractional delta. The check is
//! asymmetric on purpose: a drop in bitrate does not restart convergence,
//! only growth does, since a still-climbing ramp means the bandwidth probe
//! has not found its ceiling yet.

use tracing::trace;

use crate::config::QualityTestConfig;
use crate::stats::throughput::quality_stats;
use crate::stats::window::windowed;
use crate::types::{MediaType, Sample};

/// Whether recent bitrate deltas have stabilized below the configured
/// tolerance.
///
/// Returns `false` whenever the windowed sample count is below
/// `minimum_sample_size`, regardless of stability. When `audio_only` is
/// set the video track is excluded from the check.
pub fn is_steady(log: &[Sample], config: &QualityTestConfig, audio_only: bool) -> bool {
    let window = windowed(log, config.steady_state_sample_window.as_millis() as u64);
    if window.len() < config.minimum_sample_size || window.len() < 2 {
        return false;
    }

    let media_types: &[MediaType] = if audio_only {
        &[MediaType::Audio]
    } else {
        &[MediaType::Audio, MediaType::Video]
    };

    for &media in media_types {
        let Ok(entries) = quality_stats(media, window) else {
            return false;
        };
        for pair in entries.windows(2) {
            let previous_kbps = pair[0].average_bitrate / 1000.0;
            let current_kbps = pair[1].average_bitrate / 1000.0;
            if current_kbps - previous_kbps > previous_kbps * config.steady_state_allowed_delta {
                trace!(
                    "steady-state broken by {}: {:.1} -> {:.1} kbps",
                    media,
                    previous_kbps,
                    current_kbps
                );
                return false;
            }
        }
    }
    true
}
