//! Sparse optical flow (pyramidal Lucas-Kanade) over grayscale frames.
//!
//! Frames are `ndarray` views of shape `(height, width)` holding 8-bit luma.

use nalgebra::{Matrix2, Vector2};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::tracker::tracked_object::{Point, TrackMap};

/// Parameters of the Lucas-Kanade search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LkParams {
    /// Side of the square integration window, in pixels (odd).
    pub window_size: usize,
    /// Number of pyramid levels above the full-resolution image.
    pub max_level: usize,
    /// Iteration cap per pyramid level.
    pub max_iterations: usize,
    /// Stop iterating once the update step is shorter than this.
    pub epsilon: f32,
    /// Minimum eigenvalue of the gradient matrix divided by the window
    /// area, with gradients as central differences in intensity units.
    /// Below it the window has too little texture: a coarse pyramid level
    /// is skipped, a full-resolution failure reports the point lost.
    pub min_eigen_threshold: f32,
}

impl Default for LkParams {
    fn default() -> Self {
        Self {
            window_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
            // OpenCV's 1e-4 is taken on Scharr gradients scaled by 2^-20,
            // which is 1/1024 of this scale.
            min_eigen_threshold: 0.1,
        }
    }
}

impl LkParams {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 3 || self.window_size % 2 == 0 {
            return Err(Error::InvalidConfig(format!(
                "flow window_size must be odd and at least 3, got {}",
                self.window_size
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "flow max_iterations must be positive".to_string(),
            ));
        }
        if !(self.epsilon > 0.0) || !(self.min_eigen_threshold >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "flow epsilon must be positive and min_eigen_threshold non-negative, got {} and {}",
                self.epsilon, self.min_eigen_threshold
            )));
        }
        Ok(())
    }
}

/// Estimates where points of one frame moved to in the next.
///
/// Implement this to plug in an external flow backend.
pub trait FlowEstimator {
    /// Track each point from `prev` to `next`. `None` marks a point that
    /// could not be tracked.
    fn track_points(
        &self,
        prev: ArrayView2<'_, u8>,
        next: ArrayView2<'_, u8>,
        points: &[Point],
    ) -> Vec<Option<Point>>;
}

/// Built-in pyramidal Lucas-Kanade estimator.
#[derive(Debug, Clone, Default)]
pub struct PyramidalLk {
    params: LkParams,
}

impl PyramidalLk {
    pub fn new(params: LkParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LkParams {
        &self.params
    }

    fn track_one(&self, prev: &[Array2<f32>], next: &[Array2<f32>], point: Point) -> Option<Point> {
        let (height, width) = prev[0].dim();
        if !in_bounds(point, width, height) {
            return None;
        }

        let half = (self.params.window_size / 2) as isize;
        let window_area = (self.params.window_size * self.params.window_size) as f32;
        let mut guess = Vector2::<f32>::zeros();

        for level in (0..prev.len()).rev() {
            let scale = (1u32 << level) as f32;
            let p = Vector2::new(point.0 / scale, point.1 / scale);
            let prev_img = &prev[level];
            let next_img = &next[level];

            let mut gxx = 0.0f32;
            let mut gxy = 0.0f32;
            let mut gyy = 0.0f32;
            let mut samples = Vec::with_capacity(self.params.window_size * self.params.window_size);
            for dy in -half..=half {
                for dx in -half..=half {
                    let x = p.x + dx as f32;
                    let y = p.y + dy as f32;
                    let ix = (sample(prev_img, x + 1.0, y) - sample(prev_img, x - 1.0, y)) / 2.0;
                    let iy = (sample(prev_img, x, y + 1.0) - sample(prev_img, x, y - 1.0)) / 2.0;
                    gxx += ix * ix;
                    gxy += ix * iy;
                    gyy += iy * iy;
                    samples.push((x, y, ix, iy, sample(prev_img, x, y)));
                }
            }

            let g = Matrix2::new(gxx, gxy, gxy, gyy);
            let trace = gxx + gyy;
            let det_term = ((gxx - gyy) * (gxx - gyy) + 4.0 * gxy * gxy).sqrt();
            let min_eigen = (trace - det_term) / 2.0 / window_area;
            let Some(g_inv) = (min_eigen >= self.params.min_eigen_threshold)
                .then(|| g.try_inverse())
                .flatten()
            else {
                if level == 0 {
                    return None;
                }
                trace!(level, min_eigen, "window too flat, skipping pyramid level");
                guess *= 2.0;
                continue;
            };

            let mut v = Vector2::<f32>::zeros();
            for _ in 0..self.params.max_iterations {
                let mut b = Vector2::<f32>::zeros();
                for &(x, y, ix, iy, value) in &samples {
                    let it = value - sample(next_img, x + guess.x + v.x, y + guess.y + v.y);
                    b.x += it * ix;
                    b.y += it * iy;
                }
                let eta = g_inv * b;
                v += eta;
                if eta.norm() < self.params.epsilon {
                    break;
                }
            }

            guess = if level > 0 { (guess + v) * 2.0 } else { guess + v };
        }

        let tracked = (point.0 + guess.x, point.1 + guess.y);
        (tracked.0.is_finite() && tracked.1.is_finite() && in_bounds(tracked, width, height))
            .then_some(tracked)
    }
}

impl FlowEstimator for PyramidalLk {
    fn track_points(
        &self,
        prev: ArrayView2<'_, u8>,
        next: ArrayView2<'_, u8>,
        points: &[Point],
    ) -> Vec<Option<Point>> {
        if prev.dim() != next.dim() {
            return vec![None; points.len()];
        }
        let prev_pyramid = build_pyramid(prev, self.params.max_level);
        let next_pyramid = build_pyramid(next, self.params.max_level);
        points
            .iter()
            .map(|&p| self.track_one(&prev_pyramid, &next_pyramid, p))
            .collect()
    }
}

/// Moves tracked points along the optical flow between consecutive frames.
///
/// Tracks are only ever carried forward or dropped: a track whose point is
/// lost is removed and never comes back through this component, and no new
/// identifiers are created here.
#[derive(Debug)]
pub struct FlowPropagator<E = PyramidalLk> {
    estimator: E,
    previous: Option<Array2<u8>>,
    max_history: Option<usize>,
}

impl FlowPropagator<PyramidalLk> {
    pub fn new(params: LkParams) -> Self {
        Self::with_estimator(PyramidalLk::new(params))
    }
}

impl<E: FlowEstimator> FlowPropagator<E> {
    pub fn with_estimator(estimator: E) -> Self {
        Self {
            estimator,
            previous: None,
            max_history: None,
        }
    }

    pub fn with_max_history(mut self, max_history: Option<usize>) -> Self {
        self.max_history = max_history;
        self
    }

    /// Forget the stored frame; the next call only records its frame.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Propagate `tracks` from the previously seen frame into `gray`.
    ///
    /// Every track with at least one point gets its last point tracked; on
    /// success the new point is appended, on failure the track is dropped.
    /// The first frame after construction or reset has nothing to compare
    /// against and returns the tracks unchanged. A frame with a different
    /// shape than the previous one resets the stored frame and is reported
    /// as an error.
    pub fn propagate(&mut self, tracks: &TrackMap, gray: ArrayView2<'_, u8>) -> Result<TrackMap> {
        let current = gray.to_owned();
        let Some(previous) = self.previous.replace(current) else {
            return Ok(tracks.clone());
        };
        if previous.dim() != gray.dim() {
            warn!(
                expected = ?previous.dim(),
                got = ?gray.dim(),
                "frame shape changed, restarting optical flow"
            );
            return Err(Error::FrameShapeMismatch {
                expected: previous.dim(),
                got: gray.dim(),
            });
        }
        Ok(propagate_tracks(
            &self.estimator,
            previous.view(),
            gray,
            tracks.clone(),
            self.max_history,
        ))
    }
}

/// Propagate each track's last point from `prev` to `next`.
pub fn propagate_tracks<E: FlowEstimator + ?Sized>(
    estimator: &E,
    prev: ArrayView2<'_, u8>,
    next: ArrayView2<'_, u8>,
    tracks: TrackMap,
    max_history: Option<usize>,
) -> TrackMap {
    let candidates: Vec<_> = tracks
        .into_iter()
        .filter_map(|t| t.last_point().map(|p| (t, p)))
        .collect();
    let points: Vec<Point> = candidates.iter().map(|(_, p)| *p).collect();
    let tracked = estimator.track_points(prev, next, &points);

    candidates
        .into_iter()
        .zip(tracked)
        .filter_map(|((mut track, last), new_point)| match new_point {
            Some(point) => {
                track.push_point(point, max_history);
                track.shift(point.0 - last.0, point.1 - last.1);
                Some(track)
            }
            None => {
                debug!(id = track.id, "optical flow lost track");
                None
            }
        })
        .collect()
}

/// Convert an interleaved BGR buffer to 8-bit luma using BT.601 weights.
pub fn gray_from_bgr(pixels: &[u8], width: usize, height: usize) -> Result<Array2<u8>> {
    let expected = width * height * 3;
    if pixels.len() != expected {
        return Err(Error::InvalidFrame(format!(
            "expected {expected} bytes for {width}x{height} BGR, got {}",
            pixels.len()
        )));
    }
    let luma = pixels
        .chunks_exact(3)
        .map(|bgr| {
            let value = 0.114 * bgr[0] as f32 + 0.587 * bgr[1] as f32 + 0.299 * bgr[2] as f32;
            value.round().clamp(0.0, 255.0) as u8
        })
        .collect();
    Array2::from_shape_vec((height, width), luma)
        .map_err(|e| Error::InvalidFrame(e.to_string()))
}

fn in_bounds(point: Point, width: usize, height: usize) -> bool {
    width > 0
        && height > 0
        && point.0 >= 0.0
        && point.1 >= 0.0
        && point.0 <= (width - 1) as f32
        && point.1 <= (height - 1) as f32
}

fn build_pyramid(image: ArrayView2<'_, u8>, max_level: usize) -> Vec<Array2<f32>> {
    let mut levels = vec![image.mapv(f32::from)];
    for _ in 0..max_level {
        let Some(last) = levels.last() else { break };
        let (h, w) = last.dim();
        if h < 2 || w < 2 {
            break;
        }
        let down = Array2::from_shape_fn((h / 2, w / 2), |(y, x)| {
            (last[[2 * y, 2 * x]]
                + last[[2 * y, 2 * x + 1]]
                + last[[2 * y + 1, 2 * x]]
                + last[[2 * y + 1, 2 * x + 1]])
                / 4.0
        });
        levels.push(down);
    }
    levels
}

/// Bilinear sample with border replication.
fn sample(image: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = image.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = image[[y0, x0]] * (1.0 - fx) + image[[y0, x1]] * fx;
    let bottom = image[[y1, x0]] * (1.0 - fx) + image[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
