//! TrackerPipeline for combining detection with tracking.

use thiserror::Error;

use crate::config::TrackerConfig;
use crate::tracker::{FrameReport, TrackingSession, gray_from_bgr};

use super::DetectionSource;

/// Failure of one pipeline step.
#[derive(Error, Debug)]
pub enum PipelineError<E> {
    #[error("Detection failed: {0}")]
    Detector(#[source] E),

    #[error(transparent)]
    Tracker(#[from] crate::Error),
}

/// Bundles a detection backend with a tracking session.
///
/// One pipeline serves one stream; create one per webcam client or video.
pub struct TrackerPipeline<D: DetectionSource> {
    detector: D,
    session: TrackingSession,
}

impl<D: DetectionSource> TrackerPipeline<D> {
    pub fn new(detector: D, config: TrackerConfig) -> crate::Result<Self> {
        Ok(Self {
            detector,
            session: TrackingSession::new(config)?,
        })
    }

    pub fn with_default_config(detector: D) -> Self {
        Self {
            detector,
            session: TrackingSession::default(),
        }
    }

    /// Run detection on one frame and track the result.
    ///
    /// No grayscale frame is available on this path, so flow-assisted
    /// sessions fall back to plain IoU matching.
    pub fn process_frame(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<FrameReport, PipelineError<D::Error>> {
        let detections = self
            .detector
            .detect(input, width, height)
            .map_err(PipelineError::Detector)?;
        Ok(self.session.process_frame(&detections, None)?)
    }

    /// Run detection on an interleaved BGR frame and track the result,
    /// passing its grayscale version to the session.
    pub fn process_bgr_frame(
        &mut self,
        bgr: &[u8],
        width: u32,
        height: u32,
    ) -> Result<FrameReport, PipelineError<D::Error>> {
        let gray = gray_from_bgr(bgr, width as usize, height as usize)?;
        let detections = self
            .detector
            .detect(bgr, width, height)
            .map_err(PipelineError::Detector)?;
        Ok(self.session.process_frame(&detections, Some(gray.view()))?)
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TrackingSession {
        &mut self.session
    }

    /// Consume the pipeline, returning the detector and the session.
    pub fn into_parts(self) -> (D, TrackingSession) {
        (self.detector, self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::tracker::Detection;

    struct MockDetector {
        frames: Vec<Vec<Detection>>,
    }

    impl DetectionSource for MockDetector {
        type Error = std::io::Error;

        fn detect(
            &mut self,
            _input: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<Detection>, Self::Error> {
            if self.frames.is_empty() {
                return Err(std::io::Error::other("stream ended"));
            }
            Ok(self.frames.remove(0))
        }
    }

    #[test]
    fn test_tracker_pipeline() {
        let detector = MockDetector {
            frames: vec![
                vec![Detection::new(10.0, 20.0, 50.0, 80.0, 0.9)],
                vec![Detection::new(12.0, 21.0, 52.0, 81.0, 0.9)],
            ],
        };

        let mut pipeline = TrackerPipeline::with_default_config(detector);
        let first = pipeline.process_frame(&[], 640, 480).unwrap();
        assert_eq!(first.newly_seen_ids, vec![1]);

        let second = pipeline.process_frame(&[], 640, 480).unwrap();
        assert_eq!(second.detections[0].id, 1);
        assert!(second.newly_seen_ids.is_empty());

        let err = pipeline.process_frame(&[], 640, 480).unwrap_err();
        assert!(matches!(err, PipelineError::Detector(_)));
        assert_eq!(pipeline.session().frame_id(), 2);
    }

    #[test]
    fn test_bgr_frame_is_validated() {
        let detector = MockDetector {
            frames: vec![vec![Detection::new(0.0, 0.0, 2.0, 2.0, 0.9)]],
        };
        let config = TrackerConfig::with_strategy(StrategyKind::FlowAssisted);
        let mut pipeline = TrackerPipeline::new(detector, config).unwrap();

        let err = pipeline.process_bgr_frame(&[0; 5], 2, 2).unwrap_err();
        assert!(matches!(err, PipelineError::Tracker(crate::Error::InvalidFrame(_))));

        let report = pipeline.process_bgr_frame(&[0; 12], 2, 2).unwrap();
        assert_eq!(report.detections.len(), 1);
    }
}
