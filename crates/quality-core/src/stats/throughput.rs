//! Per-tick throughput and packet-loss computation
//!
//! Converts consecutive sample deltas into bitrate and packet-loss
//! entries, averages them over a window, and folds the publisher-side
//! outbound numbers into the same view.
//!
//! Packet-loss ratio is computed from counter deltas between consecutive
//! samples, the same semantics the MOS path uses. (The cumulative-counter
//! variant skews the ratio toward zero as a call ages, which defeats
//! threshold evaluation on long windows.)

use std::collections::HashMap;

use crate::error::{QualityError, Result};
use crate::types::{MediaType, Sample};

/// Throughput numbers derived from one consecutive sample pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickStats {
    /// Bitrate over the pair's interval, bits per second
    pub average_bitrate: f64,

    /// Packet-loss ratio over the pair's interval (0.0-1.0)
    pub packet_loss_ratio: f64,

    /// Decoder frame rate at the later sample (video only)
    pub frame_rate: Option<f64>,
}

/// Arithmetic means of [`TickStats`] entries across a window
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowAverages {
    pub bitrate: f64,
    pub packet_loss_ratio: f64,
    pub frame_rate: Option<f64>,
}

/// Publisher-side numbers merged over a window
#[derive(Debug, Clone, Default)]
pub struct PublisherWindowStats {
    /// Mean outbound bitrate across consecutive pairs, bits per second
    pub outgoing_bitrate: Option<f64>,

    /// Mean sender-side bandwidth estimate, bits per second
    pub available_outgoing_bitrate: Option<f64>,

    /// Whether any sample in the window had simulcast enabled
    pub simulcast: bool,

    /// Most frequent non-"none" encoder limitation in the window
    pub quality_limitation_reason: Option<String>,
}

/// Compute one [`TickStats`] entry per consecutive sample pair for the
/// given media type.
///
/// Requires at least two samples; pairs where either sample lacks the
/// track are skipped, so the result may be shorter than `len - 1` (or
/// empty when the track never appears).
pub fn quality_stats(media: MediaType, samples: &[Sample]) -> Result<Vec<TickStats>> {
    if samples.len() < 2 {
        return Err(QualityError::insufficient(2, samples.len()));
    }

    let mut entries = Vec::with_capacity(samples.len() - 1);
    for pair in samples.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let (Some(p), Some(c)) = (prev.track(media), curr.track(media)) else {
            continue;
        };

        let interval_secs = curr.timestamp_ms.saturating_sub(prev.timestamp_ms) as f64 / 1000.0;
        let bytes_increased = (c.bytes_received - p.bytes_received).max(0) as f64;
        let average_bitrate = if interval_secs > 0.0 {
            bytes_increased * 8.0 / interval_secs
        } else {
            0.0
        };

        let lost = (c.packets_lost - p.packets_lost).max(0) as f64;
        let received = (c.packets_received - p.packets_received).max(0) as f64;
        let expected = lost + received;
        let packet_loss_ratio = if expected > 0.0 && lost > 0.0 {
            lost / expected
        } else {
            0.0
        };

        let frame_rate = match media {
            MediaType::Video => curr.subscriber.video.map(|v| v.frame_rate),
            MediaType::Audio => None,
        };

        entries.push(TickStats {
            average_bitrate,
            packet_loss_ratio,
            frame_rate,
        });
    }
    Ok(entries)
}

/// Arithmetic means over a set of tick entries. Returns `None` when the
/// set is empty (nothing to average is "not computed", not zero).
pub fn average(entries: &[TickStats]) -> Option<WindowAverages> {
    if entries.is_empty() {
        return None;
    }
    let n = entries.len() as f64;
    let bitrate = entries.iter().map(|e| e.average_bitrate).sum::<f64>() / n;
    let packet_loss_ratio = entries.iter().map(|e| e.packet_loss_ratio).sum::<f64>() / n;

    let rates: Vec<f64> = entries.iter().filter_map(|e| e.frame_rate).collect();
    let frame_rate = if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    };

    Some(WindowAverages {
        bitrate,
        packet_loss_ratio,
        frame_rate,
    })
}

/// Per-pair outbound bitrate from cumulative publisher byte counters,
/// summed across all streams of the media type.
fn outgoing_bitrates(media: MediaType, samples: &[Sample]) -> Vec<f64> {
    let sent_bytes = |sample: &Sample| -> i64 {
        match media {
            MediaType::Video => sample.publisher.video_streams.iter().map(|s| s.bytes_sent).sum(),
            MediaType::Audio => sample.publisher.audio_streams.iter().map(|s| s.bytes_sent).sum(),
        }
    };

    samples
        .windows(2)
        .filter_map(|pair| {
            let interval_secs =
                pair[1].timestamp_ms.saturating_sub(pair[0].timestamp_ms) as f64 / 1000.0;
            if interval_secs <= 0.0 {
                return None;
            }
            let delta = (sent_bytes(&pair[1]) - sent_bytes(&pair[0])).max(0) as f64;
            Some(delta * 8.0 / interval_secs)
        })
        .collect()
}

/// Merge publisher-side numbers over a window of samples.
pub fn publisher_stats(media: MediaType, samples: &[Sample]) -> PublisherWindowStats {
    let bitrates = outgoing_bitrates(media, samples);
    let outgoing_bitrate = if bitrates.is_empty() {
        None
    } else {
        Some(bitrates.iter().sum::<f64>() / bitrates.len() as f64)
    };

    let estimates: Vec<f64> = samples
        .iter()
        .filter_map(|s| s.publisher.available_outgoing_bitrate)
        .collect();
    let available_outgoing_bitrate = if estimates.is_empty() {
        None
    } else {
        Some(estimates.iter().sum::<f64>() / estimates.len() as f64)
    };

    let simulcast = samples.iter().any(|s| s.publisher.simulcast_enabled);

    // Dominant non-"none" limitation across the window, if any.
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for sample in samples {
        for stream in &sample.publisher.video_streams {
            if let Some(reason) = stream.quality_limitation_reason.as_deref() {
                if reason != "none" {
                    *counts.entry(reason).or_insert(0) += 1;
                }
            }
        }
    }
    let quality_limitation_reason = counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(reason, _)| reason.to_string());

    PublisherWindowStats {
        outgoing_bitrate,
        available_outgoing_bitrate,
        simulcast,
        quality_limitation_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        PublisherSample, SubscriberSample, TrackCounters, VideoStreamCounters, VideoTrackCounters,
    };

    fn video_sample(timestamp_ms: u64, bytes: i64, lost: i64, received: i64) -> Sample {
        Sample {
            timestamp_ms,
            subscriber: SubscriberSample {
                audio: None,
                video: Some(VideoTrackCounters {
                    counters: TrackCounters {
                        bytes_received: bytes,
                        packets_lost: lost,
                        packets_received: received,
                    },
                    frame_rate: 30.0,
                }),
            },
            publisher: PublisherSample::default(),
        }
    }

    #[test]
    fn test_insufficient_samples_rejected() {
        let one = vec![video_sample(0, 0, 0, 0)];
        assert!(matches!(
            quality_stats(MediaType::Video, &one),
            Err(QualityError::InsufficientSamples { needed: 2, got: 1 })
        ));
        assert!(quality_stats(MediaType::Video, &[]).is_err());
    }

    #[test]
    fn test_bitrate_from_byte_delta() {
        // 12500 bytes over 1000ms => 100_000 bps.
        let samples = vec![video_sample(0, 0, 0, 0), video_sample(1000, 12_500, 0, 0)];
        let entries = quality_stats(MediaType::Video, &samples).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].average_bitrate, 100_000.0);
        assert_eq!(entries[0].frame_rate, Some(30.0));
    }

    #[test]
    fn test_counter_reset_clamps_to_zero() {
        let samples = vec![video_sample(0, 50_000, 0, 100), video_sample(1000, 10, 0, 101)];
        let entries = quality_stats(MediaType::Video, &samples).unwrap();
        assert_eq!(entries[0].average_bitrate, 0.0);
    }

    #[test]
    fn test_packet_loss_ratio_from_deltas() {
        let samples = vec![video_sample(0, 0, 0, 0), video_sample(1000, 1000, 5, 95)];
        let entries = quality_stats(MediaType::Video, &samples).unwrap();
        assert!((entries[0].packet_loss_ratio - 0.05).abs() < 1e-9);

        // No packets expected in the interval => ratio 0, not NaN.
        let idle = vec![video_sample(0, 0, 0, 100), video_sample(1000, 0, 0, 100)];
        let entries = quality_stats(MediaType::Video, &idle).unwrap();
        assert_eq!(entries[0].packet_loss_ratio, 0.0);
    }

    #[test]
    fn test_absent_track_pairs_skipped() {
        let mut absent = video_sample(1000, 100, 0, 10);
        absent.subscriber.video = None;
        let samples = vec![video_sample(0, 0, 0, 0), absent, video_sample(2000, 200, 0, 20)];
        let entries = quality_stats(MediaType::Video, &samples).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_window_averaging() {
        let entries = vec![
            TickStats {
                average_bitrate: 100_000.0,
                packet_loss_ratio: 0.02,
                frame_rate: Some(30.0),
            },
            TickStats {
                average_bitrate: 200_000.0,
                packet_loss_ratio: 0.04,
                frame_rate: Some(24.0),
            },
        ];
        let avg = average(&entries).unwrap();
        assert_eq!(avg.bitrate, 150_000.0);
        assert!((avg.packet_loss_ratio - 0.03).abs() < 1e-9);
        assert_eq!(avg.frame_rate, Some(27.0));

        assert!(average(&[]).is_none());
    }

    #[test]
    fn test_publisher_window_merge() {
        let stream = |bytes: i64, reason: &str| VideoStreamCounters {
            ssrc: 1,
            bytes_sent: bytes,
            quality_limitation_reason: Some(reason.to_string()),
            resolution: None,
            frame_rate: 30.0,
            active: true,
        };
        let mut first = video_sample(0, 0, 0, 0);
        first.publisher.video_streams = vec![stream(0, "none")];
        first.publisher.available_outgoing_bitrate = Some(800_000.0);
        first.publisher.simulcast_enabled = true;

        let mut second = video_sample(1000, 0, 0, 0);
        second.publisher.video_streams = vec![stream(12_500, "bandwidth")];
        second.publisher.available_outgoing_bitrate = Some(1_000_000.0);

        let stats = publisher_stats(MediaType::Video, &[first, second]);
        assert_eq!(stats.outgoing_bitrate, Some(100_000.0));
        assert_eq!(stats.available_outgoing_bitrate, Some(900_000.0));
        assert!(stats.simulcast);
        assert_eq!(stats.quality_limitation_reason.as_deref(), Some("bandwidth"));
    }
}
