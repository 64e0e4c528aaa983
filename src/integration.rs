//! Integration module for connecting detection backends and alert channels
//! with the tracker.
//!
//! The inference model, the frame source and the notification transports
//! live outside this crate; these traits are the seams they plug into.

mod alert;
mod builder;
mod detector;
mod pipeline;

pub use alert::{AlertSink, LogAlertSink, dispatch_alerts};
pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, IntoDetections};
pub use pipeline::{PipelineError, TrackerPipeline};
