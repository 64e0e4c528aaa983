//! Per-frame tracker update strategies.
//!
//! A strategy turns the accepted detections of one frame into identified
//! detections and keeps whatever track state it needs between frames.

use ndarray::{Array2, ArrayView2};
use tracing::{debug, trace, warn};

use crate::config::{MatchPolicy, StrategyKind, TrackerConfig};
use crate::tracker::matching::{Detection, assign_best_match, match_or_create};
use crate::tracker::optical_flow::{FlowEstimator, PyramidalLk};
use crate::tracker::rect::Rect;
use crate::tracker::tracked_object::{IdAllocator, TrackMap, TrackedObject};

/// A detection with the identifier the tracker gave it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedDetection {
    pub id: u64,
    pub bbox: Rect,
    pub confidence: f32,
    /// True when this detection opened a new track in this frame.
    pub is_new_track: bool,
}

/// Input of one strategy update.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub frame_id: u64,
    /// Detections that cleared the confidence threshold, in model order.
    pub detections: &'a [Detection],
    /// Grayscale frame, used by motion-aware strategies.
    pub gray: Option<ArrayView2<'a, u8>>,
}

pub trait TrackingStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Assign identifiers to this frame's detections, in input order.
    fn update(&mut self, input: FrameInput<'_>) -> Vec<TrackedDetection>;

    /// Current tracks, in insertion order.
    fn tracks(&self) -> &TrackMap;

    /// Drop all state, including the identifier counter.
    fn reset(&mut self);
}

/// Build the strategy selected by `config`.
pub fn from_config(config: &TrackerConfig) -> Box<dyn TrackingStrategy> {
    match config.strategy {
        StrategyKind::PerFrame => Box::new(PerFrameStrategy::new()),
        StrategyKind::Persistent => Box::new(PersistentStrategy::new(config)),
        StrategyKind::FlowAssisted => Box::new(FlowAssistedStrategy::new(config)),
    }
}

/// Numbers the accepted detections of every frame 1, 2, 3, ...
///
/// Nothing survives from one frame to the next, so identifiers are not
/// stable: the first detection of every frame is always id 1 and always a
/// new track.
#[derive(Debug, Clone, Default)]
pub struct PerFrameStrategy {
    tracks: TrackMap,
}

impl PerFrameStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackingStrategy for PerFrameStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PerFrame
    }

    fn update(&mut self, input: FrameInput<'_>) -> Vec<TrackedDetection> {
        self.tracks.clear();
        let mut out = Vec::with_capacity(input.detections.len());
        for (idx, det) in input.detections.iter().enumerate() {
            let id = idx as u64 + 1;
            let (cx, cy) = det.bbox.center();
            self.tracks.insert(TrackedObject {
                history: vec![(cx.floor(), cy.floor())],
                ..TrackedObject::new(id, det.bbox, det.score, input.frame_id)
            });
            out.push(TrackedDetection {
                id,
                bbox: det.bbox,
                confidence: det.score,
                is_new_track: true,
            });
        }
        out
    }

    fn tracks(&self) -> &TrackMap {
        &self.tracks
    }

    fn reset(&mut self) {
        self.tracks.clear();
    }
}

/// Keeps tracks across frames and reuses an identifier when a detection
/// overlaps a known track by more than the IoU threshold.
#[derive(Debug, Clone)]
pub struct PersistentStrategy {
    tracks: TrackMap,
    ids: IdAllocator,
    iou_threshold: f32,
    policy: MatchPolicy,
    max_frames_unseen: Option<u32>,
    max_history: Option<usize>,
}

impl PersistentStrategy {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            tracks: TrackMap::new(),
            ids: IdAllocator::new(),
            iou_threshold: config.match_iou_threshold,
            policy: config.match_policy,
            max_frames_unseen: config.max_frames_unseen,
            max_history: config.max_history,
        }
    }

    /// The identifier the next new track will get.
    pub fn next_id(&self) -> u64 {
        self.ids.peek()
    }

    fn tracks_mut(&mut self) -> &mut TrackMap {
        &mut self.tracks
    }

    fn associate(&mut self, input: &FrameInput<'_>) -> Vec<TrackedDetection> {
        match self.policy {
            MatchPolicy::FirstMatch => input
                .detections
                .iter()
                .map(|det| {
                    let assignment =
                        match_or_create(&det.bbox, &self.tracks, &mut self.ids, self.iou_threshold);
                    self.record(assignment.id, det, input.frame_id, assignment.created)
                })
                .collect(),
            MatchPolicy::BestIou => {
                let track_ids = self.tracks.ids();
                let det_boxes: Vec<Rect> = input.detections.iter().map(|d| d.bbox).collect();
                let assigned = assign_best_match(&self.tracks.rects(), &det_boxes, self.iou_threshold);
                input
                    .detections
                    .iter()
                    .zip(assigned)
                    .map(|(det, slot)| match slot {
                        Some(idx) => self.record(track_ids[idx], det, input.frame_id, false),
                        None => {
                            let id = self.ids.allocate();
                            self.record(id, det, input.frame_id, true)
                        }
                    })
                    .collect()
            }
        }
    }

    fn record(&mut self, id: u64, det: &Detection, frame_id: u64, created: bool) -> TrackedDetection {
        if created {
            debug!(id, frame_id, "new track");
            self.tracks
                .insert(TrackedObject::new(id, det.bbox, det.score, frame_id));
        } else if let Some(track) = self.tracks.get_mut(id) {
            track.update(det.bbox, det.score, frame_id, self.max_history);
        }
        TrackedDetection {
            id,
            bbox: det.bbox,
            confidence: det.score,
            is_new_track: created,
        }
    }

    fn evict_stale(&mut self, frame_id: u64) {
        let Some(limit) = self.max_frames_unseen else {
            return;
        };
        self.tracks.retain(|track| {
            let keep = track.frames_unseen(frame_id) <= u64::from(limit);
            if !keep {
                debug!(id = track.id, last_seen = track.last_seen, "evicting stale track");
            }
            keep
        });
    }
}

impl TrackingStrategy for PersistentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Persistent
    }

    fn update(&mut self, input: FrameInput<'_>) -> Vec<TrackedDetection> {
        let out = self.associate(&input);
        self.evict_stale(input.frame_id);
        out
    }

    fn tracks(&self) -> &TrackMap {
        &self.tracks
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.ids.reset();
    }
}

/// Persistent IoU tracking with an optical-flow prediction step.
///
/// Before matching, every track's box is moved by the flow of its center
/// between the previous and the current grayscale frame. A track whose
/// point cannot be followed keeps its last box and can still be matched by
/// IoU. Without a grayscale frame the prediction step is skipped.
#[derive(Debug)]
pub struct FlowAssistedStrategy<E = PyramidalLk> {
    inner: PersistentStrategy,
    estimator: E,
    previous: Option<Array2<u8>>,
}

impl FlowAssistedStrategy<PyramidalLk> {
    pub fn new(config: &TrackerConfig) -> Self {
        Self::with_estimator(config, PyramidalLk::new(config.flow))
    }
}

impl<E: FlowEstimator> FlowAssistedStrategy<E> {
    pub fn with_estimator(config: &TrackerConfig, estimator: E) -> Self {
        Self {
            inner: PersistentStrategy::new(config),
            estimator,
            previous: None,
        }
    }

    fn predict(&mut self, gray: ArrayView2<'_, u8>) {
        let Some(previous) = self.previous.replace(gray.to_owned()) else {
            return;
        };
        if previous.dim() != gray.dim() {
            warn!(
                expected = ?previous.dim(),
                got = ?gray.dim(),
                "frame shape changed, skipping motion prediction"
            );
            return;
        }

        let tracks = self.inner.tracks_mut();
        let centers: Vec<_> = tracks.iter().map(|t| t.rect.center()).collect();
        let moved = self
            .estimator
            .track_points(previous.view(), gray, &centers);
        for ((track, (cx, cy)), new_center) in tracks.iter_mut().zip(centers).zip(moved) {
            match new_center {
                Some((nx, ny)) => track.shift(nx - cx, ny - cy),
                None => trace!(id = track.id, "no flow for track, keeping last box"),
            }
        }
    }
}

impl<E: FlowEstimator + Send> TrackingStrategy for FlowAssistedStrategy<E> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FlowAssisted
    }

    fn update(&mut self, input: FrameInput<'_>) -> Vec<TrackedDetection> {
        if let Some(gray) = input.gray {
            self.predict(gray);
        }
        self.inner.update(input)
    }

    fn tracks(&self) -> &TrackMap {
        self.inner.tracks()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.previous = None;
    }
}
