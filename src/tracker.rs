mod alert_gate;
mod matching;
mod optical_flow;
mod rect;
mod session;
mod strategy;
mod tracked_object;

pub use alert_gate::AlertGate;
pub use matching::{
    Assignment, AssignmentResult, Detection, assign_best_match, iou_distance, linear_assignment,
    match_or_create,
};
pub use optical_flow::{
    FlowEstimator, FlowPropagator, LkParams, PyramidalLk, gray_from_bgr, propagate_tracks,
};
pub use rect::{Rect, iou_batch};
pub use session::{FrameReport, SessionStats, TrackingSession};
pub use strategy::{
    FlowAssistedStrategy, FrameInput, PerFrameStrategy, PersistentStrategy, TrackedDetection,
    TrackingStrategy, from_config as strategy_from_config,
};
pub use tracked_object::{IdAllocator, Point, TrackMap, TrackedObject};
