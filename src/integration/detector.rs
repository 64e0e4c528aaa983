//! Trait for object detection inference backends.

use crate::tracker::Detection;

/// Trait for object detection inference backends.
///
/// Implement this trait to connect a knife detection model to the tracker.
///
/// # Example
///
/// ```ignore
/// use knifetrack_rs::{DetectionSource, Detection};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, input: &[u8], width: u32, height: u32) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error;

    /// Run inference on raw image data and return detections.
    ///
    /// # Arguments
    /// * `input` - Raw image bytes (format depends on implementation)
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    fn detect(
        &mut self,
        input: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, Self::Error>;
}

/// Helper trait for converting model-specific outputs to `Detection`.
pub trait IntoDetections {
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

/// `(x1, y1, x2, y2, confidence)` tuples, the shape most YOLO exports
/// produce after non-maximum suppression.
impl IntoDetections for Vec<(f32, f32, f32, f32, f32)> {
    fn into_detections(self) -> Vec<Detection> {
        self.into_iter()
            .map(|(x1, y1, x2, y2, score)| Detection::new(x1, y1, x2, y2, score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuples_into_detections() {
        let dets = vec![(1.0, 2.0, 3.0, 4.0, 0.5)].into_detections();
        assert_eq!(dets, vec![Detection::new(1.0, 2.0, 3.0, 4.0, 0.5)]);
    }
}
