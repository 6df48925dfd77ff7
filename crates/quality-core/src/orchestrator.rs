//! Test orchestration: sample ingestion, scoring, and scheduling
//!
//! Two layers:
//!
//! - [`ScoringEngine`] owns all mutable test state (sample log, score
//!   logs, current averages, fallback flag) and advances it one sample at
//!   a time. It is synchronous and fully deterministic, so every state
//!   transition is unit-testable without a runtime.
//! - [`QualityTest`] drives the engine from a repeating tokio timer,
//!   pulling one sample per tick from the [`SampleSource`], emitting
//!   incremental updates over a channel, and racing the hard duration
//!   bound against steady-state detection. A [`TestHandle`] stops the run
//!   (idempotently) and yields the final results.
//!
//! Ticks are strictly sequential: the next tick does not start until the
//! prior tick's stats fetch has resolved.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::QualityTestConfig;
use crate::error::{QualityError, Result};
use crate::evaluator::{evaluate, Evaluation};
use crate::mos::{audio_tick_score, video_tick_score};
use crate::stats::{average, is_steady, prune_to, publisher_stats, quality_stats};
use crate::source::SampleSource;
use crate::types::{AverageStats, MediaType, Sample, TestResults};

/// What kind of test is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    /// Score audio only; the shorter duration bound applies throughout
    AudioOnly,
    /// Score audio and video; may fall back to audio-only mid-run
    AudioAndVideo,
}

/// Lifecycle phase of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestPhase {
    /// Created but not yet ticking
    Idle,
    /// Ticking and accumulating samples
    Sampling,
    /// Throughput stabilized; sampling ended early
    SteadyStateReached,
    /// The hard duration bound fired
    DurationElapsed,
    /// Stopped by the caller
    Stopped,
    /// A malformed sample forced an early end
    Aborted,
    /// Terminal: timer cancelled, final results computed
    Finalized,
}

/// Incremental update emitted once per tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestUpdate {
    /// Phase at the time of the update
    pub phase: TestPhase,

    /// Current averaged audio statistics (partial until enough samples)
    pub audio: AverageStats,

    /// Current averaged video statistics (partial until enough samples)
    pub video: AverageStats,

    /// Timestamp of the sample that produced this update
    pub timestamp_ms: u64,
}

/// Outcome of ingesting one sample
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Keep sampling
    Continue,
    /// Recent throughput is steady; the run may finish early
    SteadyState,
    /// The sample was malformed; finish with partial results
    Abort(String),
}

/// The stateful scoring core: owns the logs and advances them one sample
/// per tick.
pub struct ScoringEngine {
    config: QualityTestConfig,
    kind: TestKind,
    sample_log: Vec<Sample>,
    audio_scores: Vec<f64>,
    video_scores: Vec<f64>,
    audio_stats: AverageStats,
    video_stats: AverageStats,
    audio_seen: bool,
    video_seen: bool,
    audio_only_fallback: bool,
    unsupported_video_streak: usize,
}

impl ScoringEngine {
    /// Create an engine for a new test run.
    pub fn new(config: QualityTestConfig, kind: TestKind) -> Self {
        Self {
            config,
            kind,
            sample_log: Vec::new(),
            audio_scores: Vec::new(),
            video_scores: Vec::new(),
            audio_stats: AverageStats::default(),
            video_stats: AverageStats::default(),
            audio_seen: false,
            video_seen: false,
            audio_only_fallback: false,
            unsupported_video_streak: 0,
        }
    }

    /// Whether the run is currently scoring audio only (either by test
    /// kind or because video collapsed mid-run).
    pub fn audio_only(&self) -> bool {
        self.kind == TestKind::AudioOnly || self.audio_only_fallback
    }

    /// The duration bound currently in force.
    pub fn duration_bound(&self) -> Duration {
        if self.audio_only() {
            self.config.audio_only_test_duration
        } else {
            self.config.video_and_audio_test_duration
        }
    }

    /// Current averaged statistics for both media types.
    pub fn current_stats(&self) -> (AverageStats, AverageStats) {
        (self.audio_stats.clone(), self.video_stats.clone())
    }

    /// Ingest one sample: validate, append, recompute averages and MOS,
    /// prune the logs, and report whether sampling can end.
    pub fn ingest(&mut self, sample: Sample) -> Result<TickOutcome> {
        if let Err(e) = sample.validate() {
            warn!("aborting test run on malformed sample: {e}");
            return Ok(TickOutcome::Abort(e.to_string()));
        }
        if let Some(last) = self.sample_log.last() {
            if sample.timestamp_ms < last.timestamp_ms {
                let detail = format!(
                    "timestamp went backwards ({} after {})",
                    sample.timestamp_ms, last.timestamp_ms
                );
                warn!("aborting test run: {detail}");
                return Ok(TickOutcome::Abort(detail));
            }
        }

        self.audio_seen |= sample.subscriber.audio.is_some();
        self.video_seen |= sample.subscriber.video.is_some();
        self.sample_log.push(sample);

        if self.sample_log.len() >= 2 {
            self.audio_scores
                .push(audio_tick_score(&self.sample_log, &self.config));
            self.video_scores.push(video_tick_score(&self.sample_log));
            self.recompute()?;
        }

        prune_to(&mut self.sample_log, self.config.max_log_length);
        prune_to(&mut self.audio_scores, self.config.max_log_length);
        prune_to(&mut self.video_scores, self.config.max_log_length);

        if is_steady(&self.sample_log, &self.config, self.audio_only()) {
            return Ok(TickOutcome::SteadyState);
        }
        Ok(TickOutcome::Continue)
    }

    /// Recompute both media types' averaged stats over the bounded log.
    /// Requires at least two samples; callers guard.
    fn recompute(&mut self) -> Result<()> {
        for media in [MediaType::Audio, MediaType::Video] {
            let entries = quality_stats(media, &self.sample_log)?;
            let averages = average(&entries);
            let publisher = publisher_stats(media, &self.sample_log);

            let stats = match media {
                MediaType::Audio => &mut self.audio_stats,
                MediaType::Video => &mut self.video_stats,
            };
            if let Some(avg) = averages {
                stats.bitrate = Some(avg.bitrate);
                stats.packet_loss_ratio = Some(avg.packet_loss_ratio);
                stats.frame_rate = avg.frame_rate;
            }
            stats.outgoing_bitrate = publisher.outgoing_bitrate;
            stats.available_outgoing_bitrate = publisher.available_outgoing_bitrate;
            if media == MediaType::Video {
                stats.simulcast = Some(publisher.simulcast);
                stats.quality_limitation_reason = publisher.quality_limitation_reason;
            }
        }

        self.audio_stats.mos = mean(&self.audio_scores);
        self.video_stats.mos = mean(&self.video_scores);

        let audio_eval = evaluate(
            &self.audio_stats,
            MediaType::Audio,
            self.audio_seen,
            false,
            &self.config,
        )?;
        apply_evaluation(&mut self.audio_stats, audio_eval);

        let video_eval = evaluate(
            &self.video_stats,
            MediaType::Video,
            self.video_seen,
            self.audio_only_fallback,
            &self.config,
        )?;
        let video_supported = video_eval.supported;
        apply_evaluation(&mut self.video_stats, video_eval);

        self.update_fallback(video_supported);
        Ok(())
    }

    /// Track consecutive unsupported-video ticks and flip to audio-only
    /// once the streak exceeds the configured bound.
    fn update_fallback(&mut self, video_supported: bool) {
        if self.kind != TestKind::AudioAndVideo || self.audio_only_fallback {
            return;
        }
        if self.video_seen && !video_supported {
            self.unsupported_video_streak += 1;
            if self.unsupported_video_streak >= self.config.audio_only_fallback_ticks {
                info!(
                    "video unsupported for {} consecutive ticks, continuing audio-only",
                    self.unsupported_video_streak
                );
                self.audio_only_fallback = true;
            }
        } else {
            self.unsupported_video_streak = 0;
        }
    }

    /// Compute the final results: per-media MOS is the mean of that
    /// media's score log, and the verdicts are re-evaluated against it.
    pub fn finalize(mut self) -> Result<TestResults> {
        self.audio_stats.mos = mean(&self.audio_scores);
        self.video_stats.mos = mean(&self.video_scores);

        let audio_eval = evaluate(
            &self.audio_stats,
            MediaType::Audio,
            self.audio_seen,
            false,
            &self.config,
        )?;
        apply_evaluation(&mut self.audio_stats, audio_eval);

        let video_eval = evaluate(
            &self.video_stats,
            MediaType::Video,
            self.video_seen,
            self.audio_only_fallback,
            &self.config,
        )?;
        apply_evaluation(&mut self.video_stats, video_eval);

        Ok(TestResults {
            audio: self.audio_stats,
            video: self.video_stats,
        })
    }

    /// Number of samples currently retained (bounded by `max_log_length`).
    pub fn sample_count(&self) -> usize {
        self.sample_log.len()
    }

    /// Number of scores currently retained for a media type.
    pub fn score_count(&self, media: MediaType) -> usize {
        match media {
            MediaType::Audio => self.audio_scores.len(),
            MediaType::Video => self.video_scores.len(),
        }
    }

    /// Timestamp of the most recent sample, if any.
    pub fn latest_timestamp(&self) -> Option<u64> {
        self.sample_log.last().map(|s| s.timestamp_ms)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn apply_evaluation(stats: &mut AverageStats, eval: Evaluation) {
    stats.supported = Some(eval.supported);
    stats.reason = eval.reason;
    stats.recommended_resolution = eval.recommended_resolution;
    stats.recommended_frame_rate = eval.recommended_frame_rate;
}

/// Handle to a running quality test.
///
/// Dropping the handle aborts the run. `stop` is idempotent and always
/// wins over internal termination: once it is observed, no further sample
/// is appended to the logs.
pub struct TestHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<TestResults>>,
}

impl TestHandle {
    /// Request the run to stop. Safe to call more than once, and safe to
    /// call after the run has already finished.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the run to finish and take its final results.
    pub async fn join(self) -> Result<TestResults> {
        self.task.await.map_err(|e| QualityError::TestAborted {
            reason: format!("test task failed: {e}"),
        })?
    }
}

/// The scheduled test runner.
pub struct QualityTest;

impl QualityTest {
    /// Validate the configuration and start the repeating tick task.
    ///
    /// One sample is fetched per `get_stats_interval`; an update is sent
    /// on `updates` (when provided) after every successful tick. The run
    /// ends on steady state, on the duration bound, on [`TestHandle::stop`],
    /// or on a malformed sample, and in all four cases `join` yields the
    /// best-effort final results. A sample-source fetch failure instead
    /// surfaces as an error from `join`.
    pub fn spawn(
        config: QualityTestConfig,
        kind: TestKind,
        source: Arc<dyn SampleSource>,
        updates: Option<mpsc::Sender<TestUpdate>>,
    ) -> Result<TestHandle> {
        config.validate()?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_test(config, kind, source, updates, stop_rx));
        Ok(TestHandle { stop_tx, task })
    }
}

async fn run_test(
    config: QualityTestConfig,
    kind: TestKind,
    source: Arc<dyn SampleSource>,
    updates: Option<mpsc::Sender<TestUpdate>>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<TestResults> {
    let mut engine = ScoringEngine::new(config.clone(), kind);
    let started = Instant::now();

    let mut interval = time::interval(config.get_stats_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("quality test started ({kind:?})");
    let mut phase = TestPhase::Sampling;

    loop {
        // The bound shrinks when the run falls back to audio-only.
        let deadline = started + engine.duration_bound();

        tokio::select! {
            biased;

            _ = stop_rx.changed() => {
                debug!("quality test stopped by caller");
                phase = TestPhase::Stopped;
                break;
            }

            _ = time::sleep_until(deadline) => {
                debug!("quality test duration bound reached");
                phase = TestPhase::DurationElapsed;
                break;
            }

            _ = interval.tick() => {
                // The fetch must not outlive the run: a stalled source
                // loses the race against the stop flag and the duration
                // bound, and a stop that lands while the fetch is in
                // flight wins outright (the sample is discarded, the
                // logs stay untouched).
                let sample = tokio::select! {
                    biased;

                    _ = stop_rx.changed() => {
                        debug!("quality test stopped during stats fetch");
                        phase = TestPhase::Stopped;
                        break;
                    }

                    _ = time::sleep_until(deadline) => {
                        debug!("quality test duration bound reached during stats fetch");
                        phase = TestPhase::DurationElapsed;
                        break;
                    }

                    fetched = source.fetch_sample() => fetched?,
                };

                let timestamp_ms = sample.timestamp_ms;
                match engine.ingest(sample)? {
                    TickOutcome::Continue => {
                        send_update(&updates, &engine, TestPhase::Sampling, timestamp_ms);
                    }
                    TickOutcome::SteadyState => {
                        send_update(&updates, &engine, TestPhase::SteadyStateReached, timestamp_ms);
                        phase = TestPhase::SteadyStateReached;
                        break;
                    }
                    TickOutcome::Abort(reason) => {
                        warn!("quality test aborted: {reason}");
                        phase = TestPhase::Aborted;
                        break;
                    }
                }
            }
        }
    }

    info!(
        "quality test finalizing after {:?} ({} samples, phase {:?})",
        started.elapsed(),
        engine.sample_count(),
        phase
    );
    let results = engine.finalize()?;
    if let Ok(json) = serde_json::to_string(&results) {
        debug!("final results: {json}");
    }
    Ok(results)
}

/// Updates are best-effort: a full or closed channel drops the update
/// rather than stalling the tick loop behind a slow consumer.
fn send_update(
    updates: &Option<mpsc::Sender<TestUpdate>>,
    engine: &ScoringEngine,
    phase: TestPhase,
    timestamp_ms: u64,
) {
    if let Some(tx) = updates {
        let (audio, video) = engine.current_stats();
        let update = TestUpdate {
            phase,
            audio,
            video,
            timestamp_ms,
        };
        if let Err(e) = tx.try_send(update) {
            debug!("dropping update ({e}), continuing without it");
        }
    }
}
