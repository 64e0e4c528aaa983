//! Builder for creating Detection objects from various box conventions.

use crate::tracker::{Detection, Rect};

/// Builder for creating `Detection` objects from model outputs.
///
/// Whatever convention the model reports, the resulting detection holds a
/// TLBR box.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: Rect,
    score: f32,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::new(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_tlwh(x, y, w, h);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_xywh(cx, cy, w, h);
        self
    }

    /// Set the bounding box from integer pixel corners, as emitted by
    /// detectors that round their output.
    pub fn pixels(self, x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        self.tlbr(x1 as f32, y1 as f32, x2 as f32, y2 as f32)
    }

    /// Set the confidence score.
    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn build(self) -> Detection {
        Detection::from_rect(self.bbox, self.score)
    }
}
