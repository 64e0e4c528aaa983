//! Multi-object tracking and new-object alert gating for cutting-object detection.
//!
//! Detections come from an external inference model once per frame. The
//! tracker assigns each one an identifier, keeps the last known position of
//! every tracked object and reports which identifiers are seen for the first
//! time so the caller can raise an alert exactly once per object.
//!
//! # Example
//!
//! ```rust
//! use knifetrack_rs::{Detection, TrackerConfig, TrackingSession};
//!
//! let mut session = TrackingSession::new(TrackerConfig::default()).unwrap();
//! let report = session
//!     .process_frame(&[Detection::new(10.0, 10.0, 60.0, 60.0, 0.9)], None)
//!     .unwrap();
//! assert!(report.has_detections);
//! assert_eq!(report.newly_seen_ids, vec![1]);
//! ```

pub mod config;
pub mod error;
pub mod integration;
pub mod tracker;

pub use config::{MatchPolicy, StrategyKind, TrackerConfig};
pub use error::{Error, Result};
pub use integration::{
    AlertSink, DetectionBuilder, DetectionSource, IntoDetections, PipelineError, TrackerPipeline,
};
pub use tracker::{
    AlertGate, Detection, FlowEstimator, FlowPropagator, FrameReport, LkParams, Rect,
    SessionStats, TrackMap, TrackedDetection, TrackedObject, TrackingSession, TrackingStrategy,
};
