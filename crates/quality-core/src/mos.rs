//! Mean Opinion Score estimation
//!
//! Audio is scored with an ITU-T G.107 (E-model) approximation driven by
//! one-way delay and packet loss; video with a log-power bitrate model
//! against a resolution-dependent target bitrate. Both scores live on the
//! 1.0-4.5 scale, and the combined score for a stream pair is the worse
//! of the two.

use crate::config::QualityTestConfig;
use crate::types::{MediaType, Resolution, Sample};

/// Lower bound of the MOS scale
pub const MIN_MOS: f64 = 1.0;

/// Upper bound of the MOS scale (narrowband E-model ceiling)
pub const MAX_MOS: f64 = 4.5;

/// Bitrate floor below which video is scored as unusable, bits per second
pub const MIN_VIDEO_BITRATE: f64 = 30_000.0;

/// Fixed local capture/render frame delay added to the transport delay, ms
const LOCAL_FRAME_DELAY_MS: f64 = 30.0;

/// E-model equipment impairment coefficients for the deployed codec family
const EQUIPMENT_B: f64 = 19.8;
const EQUIPMENT_C: f64 = 29.7;

/// Audio MOS from one-way packet-loss ratio and one-way delay.
///
/// R starts from 93.2 and is reduced by a delay impairment (with the
/// 177.3 ms interactivity knee) and an equipment impairment driven by
/// loss, then mapped through the standard cubic onto the MOS scale.
pub fn audio_mos(packet_loss_ratio: f64, one_way_delay_ms: f64) -> f64 {
    let d = one_way_delay_ms + LOCAL_FRAME_DELAY_MS;
    let knee = if d - 177.3 < 0.0 { 0.0 } else { 1.0 };
    let delay_impairment = 0.024 * d + 0.11 * (d - 177.3) * knee;
    let equipment_impairment = EQUIPMENT_B * (1.0 + EQUIPMENT_C * packet_loss_ratio).ln();

    let r = 93.2 - delay_impairment - equipment_impairment;
    if r < 0.0 {
        MIN_MOS
    } else if r > 100.0 {
        MAX_MOS
    } else {
        let mos = 1.0 + 0.035 * r + r * (r - 60.0) * (100.0 - r) * 7e-6;
        mos.clamp(MIN_MOS, MAX_MOS)
    }
}

/// Target bitrate for a frame of `pixel_count` pixels, bits per second.
fn target_bitrate(pixel_count: u64) -> f64 {
    let log_pixels = (pixel_count as f64).log10();
    10f64.powf(2.069_924_867 * log_pixels.powf(0.625_022_377_1))
}

/// Video MOS from the measured bitrate and the current frame geometry.
pub fn video_mos(bitrate_bps: f64, resolution: Resolution) -> f64 {
    if bitrate_bps < MIN_VIDEO_BITRATE {
        return MIN_MOS;
    }
    let target = target_bitrate(resolution.pixel_count());
    let bitrate = bitrate_bps.min(target);
    let score = 4.0 * (bitrate / MIN_VIDEO_BITRATE).ln() / (target / MIN_VIDEO_BITRATE).ln() + 1.0;
    score.clamp(MIN_MOS, MAX_MOS)
}

/// This tick's audio score from the two most recent samples.
///
/// Returns the worst score when fewer than two samples exist or the audio
/// track is absent. One-way delay is half the publisher's reported
/// round-trip time when present, otherwise the configured default.
pub fn audio_tick_score(log: &[Sample], config: &QualityTestConfig) -> f64 {
    let [.., prev, curr] = log else {
        return MIN_MOS;
    };
    let (Some(p), Some(c)) = (prev.track(MediaType::Audio), curr.track(MediaType::Audio)) else {
        return MIN_MOS;
    };

    let lost = (c.packets_lost - p.packets_lost).max(0) as f64;
    let received = (c.packets_received - p.packets_received).max(0) as f64;
    let plr = if lost + received > 0.0 {
        (lost / (lost + received)).max(0.0)
    } else {
        0.0
    };

    let delay_ms = curr
        .publisher
        .current_round_trip_time
        .map(|rtt_secs| rtt_secs * 1000.0 / 2.0)
        .unwrap_or(config.default_one_way_delay_ms);

    audio_mos(plr, delay_ms)
}

/// This tick's video score from the two most recent samples.
///
/// Returns the worst score when fewer than two samples exist, the video
/// track is absent, or no active publisher stream reports its geometry.
pub fn video_tick_score(log: &[Sample]) -> f64 {
    let [.., prev, curr] = log else {
        return MIN_MOS;
    };
    let (Some(p), Some(c)) = (prev.track(MediaType::Video), curr.track(MediaType::Video)) else {
        return MIN_MOS;
    };
    let Some(resolution) = curr.publisher.active_resolution() else {
        return MIN_MOS;
    };

    let interval_secs = curr.timestamp_ms.saturating_sub(prev.timestamp_ms) as f64 / 1000.0;
    if interval_secs <= 0.0 {
        return MIN_MOS;
    }
    let bitrate = (c.bytes_received - p.bytes_received).max(0) as f64 * 8.0 / interval_secs;
    video_mos(bitrate, resolution)
}

/// Combined score for the stream pair: the worse of the two when both
/// tracks are present, the present one's score when only one is, zero
/// when neither is.
pub fn combined_mos(audio: Option<f64>, video: Option<f64>) -> f64 {
    match (audio, video) {
        (Some(a), Some(v)) => a.min(v),
        (Some(a), None) => a,
        (None, Some(v)) => v,
        (None, None) => 0.0,
    }
}
