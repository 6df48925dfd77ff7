//! Test configuration and quality thresholds
//!
//! This module provides the configuration surface for a quality test run:
//! scheduling intervals and durations, log bounds, steady-state tuning,
//! and the ordered threshold tables that map measured throughput to a
//! supported/unsupported verdict with recommended capture settings.
//!
//! # Usage
//!
//! ```rust
//! use precall_quality_core::config::QualityTestConfig;
//! use std::time::Duration;
//!
//! let config = QualityTestConfig::default()
//!     .with_stats_interval(Duration::from_millis(500))
//!     .with_steady_state_allowed_delta(0.10);
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::error::{QualityError, Result};

/// One row of the video threshold table
///
/// Rows are scanned in descending `target_bitrate` order; the first row
/// whose bitrate and packet-loss requirements are met wins.
#[derive(Debug, Clone)]
pub struct VideoThreshold {
    /// Minimum sustained inbound bitrate in bits per second
    pub target_bitrate: f64,

    /// Maximum tolerated packet-loss ratio (0.0-1.0)
    pub plr: f64,

    /// Recommended capture setting, formatted as "WxH @ NFPS"
    pub recommended_setting: &'static str,
}

/// The single audio gate
#[derive(Debug, Clone, Copy)]
pub struct AudioThreshold {
    /// Minimum MOS for audio to be considered supported
    pub min_mos: f64,
}

/// Fixed user-facing reason strings for unsupported verdicts
#[derive(Debug, Clone)]
pub struct ReasonStrings {
    /// Throughput below every threshold row
    pub bandwidth_too_low: String,

    /// No audio track ever appeared in the samples
    pub no_microphone: String,

    /// No video track ever appeared in the samples
    pub no_camera: String,

    /// The test degraded to audio-only mode
    pub audio_only_fallback: String,
}

impl Default for ReasonStrings {
    fn default() -> Self {
        Self {
            bandwidth_too_low: "Bandwidth too low.".to_string(),
            no_microphone: "No microphone was found.".to_string(),
            no_camera: "No camera was found.".to_string(),
            audio_only_fallback:
                "Unable to sustain video. The test continued in audio-only mode.".to_string(),
        }
    }
}

/// Configuration for a quality test run
///
/// All defaults are overridable through the `with_*` builders.
#[derive(Debug, Clone)]
pub struct QualityTestConfig {
    /// Interval between stats ticks
    pub get_stats_interval: Duration,

    /// Hard duration bound for an audio+video test
    pub video_and_audio_test_duration: Duration,

    /// Hard duration bound once the test is audio-only
    pub audio_only_test_duration: Duration,

    /// Maximum number of entries retained in the sample and score logs
    pub max_log_length: usize,

    /// Minimum windowed sample count before steady state can be declared
    pub minimum_sample_size: usize,

    /// Width of the steady-state detection window
    pub steady_state_sample_window: Duration,

    /// Tolerated fractional per-tick bitrate increase before steadiness breaks
    pub steady_state_allowed_delta: f64,

    /// Scale applied to video bitrate thresholds when simulcast is active
    pub simulcast_bitrate_ratio: f64,

    /// One-way delay assumed when the publisher reports no round-trip time
    pub default_one_way_delay_ms: f64,

    /// Consecutive unsupported-video ticks before falling back to audio-only
    pub audio_only_fallback_ticks: usize,

    /// Ordered video threshold table (descending target bitrate)
    pub video_thresholds: Vec<VideoThreshold>,

    /// Audio MOS gate
    pub audio_threshold: AudioThreshold,

    /// Fixed user-facing reason strings
    pub reasons: ReasonStrings,
}

impl Default for QualityTestConfig {
    fn default() -> Self {
        Self {
            get_stats_interval: Duration::from_millis(1000),
            video_and_audio_test_duration: Duration::from_millis(30_000),
            audio_only_test_duration: Duration::from_millis(10_000),
            max_log_length: 1000,
            minimum_sample_size: 5,
            steady_state_sample_window: Duration::from_millis(5000),
            steady_state_allowed_delta: 0.05,
            simulcast_bitrate_ratio: 0.75,
            default_one_way_delay_ms: 150.0,
            audio_only_fallback_ticks: 3,
            video_thresholds: vec![
                VideoThreshold {
                    target_bitrate: 1_000_000.0,
                    plr: 0.005,
                    recommended_setting: "1280x720 @ 30FPS",
                },
                VideoThreshold {
                    target_bitrate: 600_000.0,
                    plr: 0.005,
                    recommended_setting: "640x480 @ 30FPS",
                },
                VideoThreshold {
                    target_bitrate: 300_000.0,
                    plr: 0.005,
                    recommended_setting: "352x288 @ 30FPS",
                },
                VideoThreshold {
                    target_bitrate: 150_000.0,
                    plr: 0.005,
                    recommended_setting: "320x240 @ 30FPS",
                },
            ],
            audio_threshold: AudioThreshold { min_mos: 2.4 },
            reasons: ReasonStrings::default(),
        }
    }
}

impl QualityTestConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval between stats ticks
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.get_stats_interval = interval;
        self
    }

    /// Set the hard duration bound for an audio+video test
    pub fn with_test_duration(mut self, duration: Duration) -> Self {
        self.video_and_audio_test_duration = duration;
        self
    }

    /// Set the hard duration bound for audio-only operation
    pub fn with_audio_only_duration(mut self, duration: Duration) -> Self {
        self.audio_only_test_duration = duration;
        self
    }

    /// Set the maximum sample/score log length
    pub fn with_max_log_length(mut self, max: usize) -> Self {
        self.max_log_length = max;
        self
    }

    /// Set the minimum windowed sample count for steady-state detection
    pub fn with_minimum_sample_size(mut self, size: usize) -> Self {
        self.minimum_sample_size = size;
        self
    }

    /// Set the steady-state detection window
    pub fn with_steady_state_window(mut self, window: Duration) -> Self {
        self.steady_state_sample_window = window;
        self
    }

    /// Set the tolerated per-tick bitrate increase
    pub fn with_steady_state_allowed_delta(mut self, delta: f64) -> Self {
        self.steady_state_allowed_delta = delta;
        self
    }

    /// Replace the video threshold table (must stay descending by bitrate)
    pub fn with_video_thresholds(mut self, thresholds: Vec<VideoThreshold>) -> Self {
        self.video_thresholds = thresholds;
        self
    }

    /// Set the audio MOS gate
    pub fn with_audio_min_mos(mut self, min_mos: f64) -> Self {
        self.audio_threshold = AudioThreshold { min_mos };
        self
    }

    /// Check the configuration invariants.
    ///
    /// The threshold ordering matters: a table that is not descending by
    /// `target_bitrate` silently changes which recommendation wins, so it
    /// is rejected here rather than trusted.
    pub fn validate(&self) -> Result<()> {
        if self.get_stats_interval.is_zero() {
            return Err(QualityError::InvalidConfig {
                detail: "get_stats_interval must be non-zero".to_string(),
            });
        }
        if self.max_log_length == 0 {
            return Err(QualityError::InvalidConfig {
                detail: "max_log_length must be at least 1".to_string(),
            });
        }
        if self.steady_state_allowed_delta < 0.0 {
            return Err(QualityError::InvalidConfig {
                detail: "steady_state_allowed_delta must be non-negative".to_string(),
            });
        }
        if self.simulcast_bitrate_ratio <= 0.0 {
            return Err(QualityError::InvalidConfig {
                detail: "simulcast_bitrate_ratio must be positive".to_string(),
            });
        }
        for pair in self.video_thresholds.windows(2) {
            if pair[1].target_bitrate >= pair[0].target_bitrate {
                return Err(QualityError::InvalidConfig {
                    detail: format!(
                        "video thresholds must be descending by bitrate ({} then {})",
                        pair[0].target_bitrate, pair[1].target_bitrate
                    ),
                });
            }
        }
        Ok(())
    }
}
