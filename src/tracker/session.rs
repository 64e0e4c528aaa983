//! Tracking session: the per-client context passed into every tracking call.

use ndarray::ArrayView2;
use tracing::{info, warn};

use crate::config::{StrategyKind, TrackerConfig};
use crate::error::{Error, Result};
use crate::tracker::alert_gate::AlertGate;
use crate::tracker::matching::Detection;
use crate::tracker::strategy::{self, FrameInput, TrackedDetection, TrackingStrategy};
use crate::tracker::tracked_object::{TrackMap, TrackedObject};

/// Everything the caller needs to render or alert on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// 1-based index of the frame within the session
    pub frame_id: u64,
    /// Whether any detection cleared the confidence threshold
    pub has_detections: bool,
    /// Accepted detections with their identifiers, in input order
    pub detections: Vec<TrackedDetection>,
    /// Identifiers observed for the first time in this session (in this
    /// frame under per-frame numbering)
    pub newly_seen_ids: Vec<u64>,
    /// Tracks after this frame, in insertion order
    pub tracks: Vec<TrackedObject>,
}

impl FrameReport {
    /// Detections whose identifier is seen for the first time.
    pub fn new_objects(&self) -> impl Iterator<Item = &TrackedDetection> {
        self.detections
            .iter()
            .filter(|d| self.newly_seen_ids.contains(&d.id))
    }

    pub fn should_alert(&self) -> bool {
        !self.newly_seen_ids.is_empty()
    }
}

/// Running totals over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub frames_with_detections: u64,
    pub total_detections: u64,
    /// Number of first-sighting events raised
    pub objects_alerted: u64,
}

impl SessionStats {
    /// Fraction of frames with at least one accepted detection.
    pub fn detection_rate(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.frames_with_detections as f64 / self.frames_processed as f64
        }
    }

    pub fn mean_detections_per_frame(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.total_detections as f64 / self.frames_processed as f64
        }
    }
}

/// Tracker state for one client or one video stream.
///
/// Each session owns its identifier counter, its tracks and its set of
/// already-alerted identifiers. Concurrent streams need one session each.
pub struct TrackingSession {
    config: TrackerConfig,
    strategy: Box<dyn TrackingStrategy>,
    gate: AlertGate,
    stats: SessionStats,
    frame_id: u64,
}

impl Default for TrackingSession {
    fn default() -> Self {
        let config = TrackerConfig::default();
        let strategy = strategy::from_config(&config);
        Self::from_parts(config, strategy)
    }
}

impl std::fmt::Debug for TrackingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSession")
            .field("strategy", &self.strategy.kind())
            .field("frame_id", &self.frame_id)
            .field("tracks", &self.strategy.tracks().len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl TrackingSession {
    /// Start a session with the strategy selected by `config`.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let strategy = strategy::from_config(&config);
        Self::with_strategy(config, strategy)
    }

    /// Start a session with a caller-provided strategy.
    ///
    /// `config.strategy` is ignored; the remaining fields still apply and
    /// are validated.
    pub fn with_strategy(
        config: TrackerConfig,
        strategy: Box<dyn TrackingStrategy>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, strategy))
    }

    fn from_parts(config: TrackerConfig, strategy: Box<dyn TrackingStrategy>) -> Self {
        Self {
            gate: AlertGate::with_expiry(config.max_frames_unseen),
            config,
            strategy,
            stats: SessionStats::default(),
            frame_id: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Number of frames processed so far.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn tracks(&self) -> &TrackMap {
        self.strategy.tracks()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn alert_gate(&self) -> &AlertGate {
        &self.gate
    }

    /// Process the detections of one frame.
    ///
    /// `gray` is the grayscale frame, only used by motion-aware strategies.
    /// A detection with a non-finite box or a confidence outside [0, 1]
    /// rejects the whole frame with [`Error::InvalidDetection`] and leaves
    /// the session untouched.
    pub fn process_frame(
        &mut self,
        detections: &[Detection],
        gray: Option<ArrayView2<'_, u8>>,
    ) -> Result<FrameReport> {
        if let Some((index, reason)) = detections
            .iter()
            .enumerate()
            .find_map(|(i, d)| d.contract_violation().map(|r| (i, r)))
        {
            warn!(index, %reason, "rejecting frame with invalid detection");
            return Err(Error::InvalidDetection { index, reason });
        }

        self.frame_id += 1;
        let threshold = self.config.confidence_threshold;
        let accepted: Vec<Detection> = detections
            .iter()
            .filter(|d| d.score >= threshold)
            .copied()
            .collect();
        let has_detections = !accepted.is_empty();

        let tracked = self.strategy.update(FrameInput {
            frame_id: self.frame_id,
            detections: &accepted,
            gray: gray.map(|g| g.reborrow()),
        });

        // Per-frame numbering reuses ids for unrelated objects, so only the
        // current frame counts as seen.
        if self.strategy.kind() == StrategyKind::PerFrame {
            self.gate.clear();
        }
        let newly_seen_ids = self
            .gate
            .observe_frame(tracked.iter().map(|d| d.id), self.frame_id);
        self.gate.expire(self.frame_id);

        self.stats.frames_processed += 1;
        if has_detections {
            self.stats.frames_with_detections += 1;
        }
        self.stats.total_detections += tracked.len() as u64;
        self.stats.objects_alerted += newly_seen_ids.len() as u64;

        Ok(FrameReport {
            frame_id: self.frame_id,
            has_detections,
            detections: tracked,
            newly_seen_ids,
            tracks: self.strategy.tracks().to_vec(),
        })
    }

    /// Start over as a new session with the same configuration.
    pub fn reset(&mut self) {
        self.strategy.reset();
        self.gate.clear();
        self.stats = SessionStats::default();
        self.frame_id = 0;
    }

    /// End the session and return its statistics.
    pub fn finish(self) -> SessionStats {
        info!(
            frames = self.stats.frames_processed,
            frames_with_detections = self.stats.frames_with_detections,
            detections = self.stats.total_detections,
            alerted = self.stats.objects_alerted,
            detection_rate = self.stats.detection_rate(),
            "tracking session finished"
        );
        self.stats
    }
}
