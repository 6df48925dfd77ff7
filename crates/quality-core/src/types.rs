//! Shared data model for the quality scoring engine
//!
//! Samples are one timestamped observation of the subscriber (inbound)
//! and publisher (outbound) side of a stream pair. Tracks may be absent
//! from a sample; absence is meaningful (no device / no track) and is
//! represented with `Option`, not zeroed counters. Counters are signed
//! because the stats arrive from a vendor layer that reports doubles and
//! has been observed to go negative on reset; a negative counter aborts
//! the run rather than poisoning the score logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{QualityError, Result};

/// Media type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Audio,
    Video,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
        }
    }
}

/// Cumulative inbound counters for one track
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrackCounters {
    /// Total bytes received since the track was opened
    pub bytes_received: i64,

    /// Total packets lost since the track was opened
    pub packets_lost: i64,

    /// Total packets received since the track was opened
    pub packets_received: i64,
}

impl TrackCounters {
    fn validate(&self, media: MediaType) -> Result<()> {
        if self.bytes_received < 0 || self.packets_lost < 0 || self.packets_received < 0 {
            return Err(QualityError::MalformedSample {
                detail: format!(
                    "negative {} counter (bytes={}, lost={}, received={})",
                    media, self.bytes_received, self.packets_lost, self.packets_received
                ),
            });
        }
        Ok(())
    }
}

/// Inbound video counters, including the decoder frame rate
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VideoTrackCounters {
    /// Cumulative byte/packet counters
    pub counters: TrackCounters,

    /// Frames per second currently being decoded
    pub frame_rate: f64,
}

/// One subscriber-side observation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriberSample {
    /// Audio track counters, absent when no audio track exists
    pub audio: Option<TrackCounters>,

    /// Video track counters, absent when no video track exists
    pub video: Option<VideoTrackCounters>,
}

/// Video frame geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count used by the video MOS model
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s.split_once('x').ok_or_else(|| QualityError::InvalidThreshold {
            detail: format!("bad resolution string '{s}'"),
        })?;
        let width = w.trim().parse().map_err(|_| QualityError::InvalidThreshold {
            detail: format!("bad resolution width in '{s}'"),
        })?;
        let height = h.trim().parse().map_err(|_| QualityError::InvalidThreshold {
            detail: format!("bad resolution height in '{s}'"),
        })?;
        Ok(Resolution { width, height })
    }
}

/// Outbound counters for one published video stream (one simulcast layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamCounters {
    /// Synchronization source of the stream
    pub ssrc: u32,

    /// Total bytes sent on this stream
    pub bytes_sent: i64,

    /// Encoder limitation reported by the stack ("cpu", "bandwidth", "none", ...)
    pub quality_limitation_reason: Option<String>,

    /// Encoded frame geometry, when known
    pub resolution: Option<Resolution>,

    /// Frames per second currently being encoded
    pub frame_rate: f64,

    /// Whether the encoder is actively sending this layer
    pub active: bool,
}

/// Outbound counters for one published audio stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioStreamCounters {
    /// Total bytes sent on this stream
    pub bytes_sent: i64,
}

/// One publisher-side observation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherSample {
    /// Sender-side bandwidth estimate in bits per second, when available
    pub available_outgoing_bitrate: Option<f64>,

    /// Whether the publisher is sending simulcast layers
    pub simulcast_enabled: bool,

    /// Per-layer outbound video counters
    pub video_streams: Vec<VideoStreamCounters>,

    /// Outbound audio counters
    pub audio_streams: Vec<AudioStreamCounters>,

    /// Most recent round-trip time in seconds, when measured
    pub current_round_trip_time: Option<f64>,
}

impl PublisherSample {
    /// Geometry of the active video layer, preferring the largest one.
    pub fn active_resolution(&self) -> Option<Resolution> {
        self.video_streams
            .iter()
            .filter(|s| s.active)
            .filter_map(|s| s.resolution)
            .max_by_key(|r| r.pixel_count())
    }
}

/// One timestamped observation pair from the sample source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Capture time in milliseconds since an arbitrary epoch; strictly
    /// non-decreasing across the log
    pub timestamp_ms: u64,

    /// Inbound (subscriber) side
    pub subscriber: SubscriberSample,

    /// Outbound (publisher) side
    pub publisher: PublisherSample,
}

impl Sample {
    /// Reject samples with negative counters. A failure here aborts the
    /// running test with best-effort partial results.
    pub fn validate(&self) -> Result<()> {
        if let Some(audio) = &self.subscriber.audio {
            audio.validate(MediaType::Audio)?;
        }
        if let Some(video) = &self.subscriber.video {
            video.counters.validate(MediaType::Video)?;
        }
        for stream in &self.publisher.video_streams {
            if stream.bytes_sent < 0 {
                return Err(QualityError::MalformedSample {
                    detail: format!("negative bytes_sent on video ssrc {}", stream.ssrc),
                });
            }
        }
        for stream in &self.publisher.audio_streams {
            if stream.bytes_sent < 0 {
                return Err(QualityError::MalformedSample {
                    detail: "negative bytes_sent on audio stream".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Cumulative counters for the requested media type, if the track exists.
    pub fn track(&self, media: MediaType) -> Option<TrackCounters> {
        match media {
            MediaType::Audio => self.subscriber.audio,
            MediaType::Video => self.subscriber.video.map(|v| v.counters),
        }
    }
}

/// Averaged statistics for one media type
///
/// A partially populated record: `None` means "not computed" (for example
/// before two samples exist), never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AverageStats {
    /// Mean inbound bitrate over the window, bits per second
    pub bitrate: Option<f64>,

    /// Mean packet-loss ratio over the window (0.0-1.0)
    pub packet_loss_ratio: Option<f64>,

    /// Mean decoder frame rate over the window (video only)
    pub frame_rate: Option<f64>,

    /// Mean Opinion Score for this media type (1.0-4.5)
    pub mos: Option<f64>,

    /// Verdict from the threshold evaluation
    pub supported: Option<bool>,

    /// Human-readable reason when unsupported
    pub reason: Option<String>,

    /// Recommended capture resolution (video only), e.g. "1280x720"
    pub recommended_resolution: Option<String>,

    /// Recommended capture frame rate (video only)
    pub recommended_frame_rate: Option<u32>,

    /// Mean publisher outbound bitrate over the window, summed across
    /// simulcast layers, bits per second
    pub outgoing_bitrate: Option<f64>,

    /// Mean sender-side bandwidth estimate over the window, bits per second
    pub available_outgoing_bitrate: Option<f64>,

    /// Whether the publisher was sending simulcast during the window
    pub simulcast: Option<bool>,

    /// Dominant non-"none" encoder limitation seen in the window
    pub quality_limitation_reason: Option<String>,
}

/// Per-media throughput summary in kilobits per second
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Bandwidth {
    pub audio_kbps: f64,
    pub video_kbps: f64,
}

/// Final outcome of a quality test run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestResults {
    /// Final audio statistics, including the mean MOS over the run
    pub audio: AverageStats,

    /// Final video statistics, including the mean MOS over the run
    pub video: AverageStats,
}

impl TestResults {
    /// Measured throughput for both media types in kbps.
    pub fn bandwidth(&self) -> Bandwidth {
        Bandwidth {
            audio_kbps: self.audio.bitrate.unwrap_or(0.0) / 1000.0,
            video_kbps: self.video.bitrate.unwrap_or(0.0) / 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse_and_pixels() {
        let res: Resolution = "1280x720".parse().unwrap();
        assert_eq!(res, Resolution::new(1280, 720));
        assert_eq!(res.pixel_count(), 921_600);
        assert_eq!(res.to_string(), "1280x720");

        assert!("1280by720".parse::<Resolution>().is_err());
        assert!("x720".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_sample_validation_rejects_negative_counters() {
        let mut sample = Sample {
            timestamp_ms: 0,
            subscriber: SubscriberSample {
                audio: Some(TrackCounters {
                    bytes_received: 100,
                    packets_lost: 0,
                    packets_received: 10,
                }),
                video: None,
            },
            publisher: PublisherSample::default(),
        };
        assert!(sample.validate().is_ok());

        sample.subscriber.audio = Some(TrackCounters {
            bytes_received: -1,
            packets_lost: 0,
            packets_received: 10,
        });
        assert!(matches!(
            sample.validate(),
            Err(crate::error::QualityError::MalformedSample { .. })
        ));
    }

    #[test]
    fn test_active_resolution_prefers_largest_layer() {
        let publisher = PublisherSample {
            simulcast_enabled: true,
            video_streams: vec![
                VideoStreamCounters {
                    ssrc: 1,
                    bytes_sent: 0,
                    quality_limitation_reason: None,
                    resolution: Some(Resolution::new(320, 180)),
                    frame_rate: 30.0,
                    active: true,
                },
                VideoStreamCounters {
                    ssrc: 2,
                    bytes_sent: 0,
                    quality_limitation_reason: None,
                    resolution: Some(Resolution::new(1280, 720)),
                    frame_rate: 30.0,
                    active: true,
                },
                VideoStreamCounters {
                    ssrc: 3,
                    bytes_sent: 0,
                    quality_limitation_reason: None,
                    resolution: Some(Resolution::new(1920, 1080)),
                    frame_rate: 30.0,
                    active: false,
                },
            ],
            ..Default::default()
        };
        assert_eq!(publisher.active_resolution(), Some(Resolution::new(1280, 720)));
    }
}
