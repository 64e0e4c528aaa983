//! Hand-off of first-sighting events to notification channels.

use std::convert::Infallible;

use tracing::warn;

use crate::tracker::{FrameReport, TrackedDetection};

/// Receives one event per newly seen object.
///
/// Implement this for whatever delivers the alert: an overlay, a saved
/// crop, an e-mail, SMS, push or text-to-speech message.
pub trait AlertSink {
    type Error;

    fn alert(&mut self, frame_id: u64, detection: &TrackedDetection) -> Result<(), Self::Error>;
}

/// Send every newly seen object of `report` to `sink`.
///
/// Returns the number of alerts delivered. Stops at the first sink error.
pub fn dispatch_alerts<A: AlertSink + ?Sized>(
    report: &FrameReport,
    sink: &mut A,
) -> Result<usize, A::Error> {
    let mut sent = 0;
    for detection in report.new_objects() {
        sink.alert(report.frame_id, detection)?;
        sent += 1;
    }
    Ok(sent)
}

/// Emits each alert as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    type Error = Infallible;

    fn alert(&mut self, frame_id: u64, detection: &TrackedDetection) -> Result<(), Self::Error> {
        warn!(
            frame_id,
            id = detection.id,
            confidence = detection.confidence,
            bbox = ?detection.bbox.to_tlbr(),
            "cutting object detected"
        );
        Ok(())
    }
}
