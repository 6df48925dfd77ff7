//! Threshold-based quality evaluation
//!
//! Maps averaged throughput/loss/MOS numbers onto a supported or
//! unsupported verdict. Video walks the ordered threshold table and
//! recommends the capture setting of the first row it can sustain; audio
//! is a single MOS gate.

use tracing::debug;

use crate::config::{QualityTestConfig, VideoThreshold};
use crate::error::{QualityError, Result};
use crate::types::{AverageStats, MediaType, Resolution};

/// Outcome of one threshold evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub supported: bool,
    pub reason: Option<String>,
    pub recommended_resolution: Option<String>,
    pub recommended_frame_rate: Option<u32>,
}

/// Parse a recommended setting of the form `"1280x720 @ 30FPS"` into a
/// resolution string and an integer frame rate.
fn parse_recommended_setting(setting: &str) -> Result<(Resolution, u32)> {
    let (res_part, fps_part) =
        setting
            .split_once('@')
            .ok_or_else(|| QualityError::InvalidThreshold {
                detail: format!("recommended setting '{setting}' missing '@'"),
            })?;
    let resolution: Resolution = res_part.trim().parse()?;
    let frame_rate = fps_part
        .trim()
        .trim_end_matches("FPS")
        .trim()
        .parse()
        .map_err(|_| QualityError::InvalidThreshold {
            detail: format!("recommended setting '{setting}' has a bad frame rate"),
        })?;
    Ok((resolution, frame_rate))
}

fn video_row_matches(
    row: &VideoThreshold,
    bitrate: f64,
    plr: f64,
    simulcast: bool,
    config: &QualityTestConfig,
) -> bool {
    let required = if simulcast {
        row.target_bitrate * config.simulcast_bitrate_ratio
    } else {
        row.target_bitrate
    };
    bitrate >= required && plr <= row.plr
}

/// Evaluate averaged stats for one media type against the configured
/// thresholds.
///
/// `track_present` distinguishes "bandwidth too low" from "no device";
/// `audio_only_fallback` overrides the video verdict with the fixed
/// fallback reason.
pub fn evaluate(
    stats: &AverageStats,
    media: MediaType,
    track_present: bool,
    audio_only_fallback: bool,
    config: &QualityTestConfig,
) -> Result<Evaluation> {
    match media {
        MediaType::Audio => {
            if !track_present {
                return Ok(Evaluation {
                    supported: false,
                    reason: Some(config.reasons.no_microphone.clone()),
                    ..Default::default()
                });
            }
            let mos = stats.mos.unwrap_or(0.0);
            if mos >= config.audio_threshold.min_mos {
                Ok(Evaluation {
                    supported: true,
                    ..Default::default()
                })
            } else {
                Ok(Evaluation {
                    supported: false,
                    reason: Some(config.reasons.bandwidth_too_low.clone()),
                    ..Default::default()
                })
            }
        }
        MediaType::Video => {
            if !track_present {
                return Ok(Evaluation {
                    supported: false,
                    reason: Some(config.reasons.no_camera.clone()),
                    ..Default::default()
                });
            }
            if audio_only_fallback {
                return Ok(Evaluation {
                    supported: false,
                    reason: Some(config.reasons.audio_only_fallback.clone()),
                    ..Default::default()
                });
            }

            let bitrate = stats.bitrate.unwrap_or(0.0);
            let plr = stats.packet_loss_ratio.unwrap_or(0.0);
            let simulcast = stats.simulcast.unwrap_or(false);

            for row in &config.video_thresholds {
                if video_row_matches(row, bitrate, plr, simulcast, config) {
                    let (resolution, frame_rate) = parse_recommended_setting(row.recommended_setting)?;
                    debug!(
                        "video supported at {:.0} bps, recommending {} @ {}fps",
                        bitrate, resolution, frame_rate
                    );
                    return Ok(Evaluation {
                        supported: true,
                        reason: None,
                        recommended_resolution: Some(resolution.to_string()),
                        recommended_frame_rate: Some(frame_rate),
                    });
                }
            }
            Ok(Evaluation {
                supported: false,
                reason: Some(config.reasons.bandwidth_too_low.clone()),
                ..Default::default()
            })
        }
    }
}
