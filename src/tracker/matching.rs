//! Association of detections with tracked objects.

use ndarray::Array2;
use tracing::trace;

use crate::tracker::rect::{Rect, iou_batch};
use crate::tracker::tracked_object::{IdAllocator, TrackMap};

/// Detection input for the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Bounding box (internally TLBR)
    pub bbox: Rect,
    /// Detection confidence score in [0, 1]
    pub score: f32,
}

impl Detection {
    /// Create a detection from TLBR coordinates (x1, y1, x2, y2).
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            bbox: Rect::new(x1, y1, x2, y2),
            score,
        }
    }

    /// Create a detection from TLWH coordinates (x, y, width, height).
    pub fn from_tlwh(x: f32, y: f32, width: f32, height: f32, score: f32) -> Self {
        Self {
            bbox: Rect::from_tlwh(x, y, width, height),
            score,
        }
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self { bbox, score }
    }

    /// Reason this detection violates the input contract, if it does.
    pub(crate) fn contract_violation(&self) -> Option<String> {
        if !self.bbox.is_finite() {
            return Some(format!("non-finite bounding box {:?}", self.bbox.to_tlbr()));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Some(format!("confidence {} outside [0, 1]", self.score));
        }
        None
    }
}

/// Identifier chosen for one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub id: u64,
    /// True when no existing track matched and a fresh id was allocated.
    pub created: bool,
}

/// Reuse the id of the first track whose IoU with `bbox` exceeds
/// `iou_threshold`, or allocate a new one.
///
/// Tracks are checked in insertion order and the scan stops at the first
/// match, so with several overlapping tracks the oldest wins even if a later
/// one overlaps more. The map itself is not modified.
pub fn match_or_create(
    bbox: &Rect,
    tracks: &TrackMap,
    ids: &mut IdAllocator,
    iou_threshold: f32,
) -> Assignment {
    for track in tracks {
        let iou = bbox.iou(&track.rect);
        if iou > iou_threshold {
            trace!(id = track.id, iou, "detection matched existing track");
            return Assignment {
                id: track.id,
                created: false,
            };
        }
    }
    let id = ids.allocate();
    trace!(id, "detection opened new track");
    Assignment { id, created: true }
}

/// One-to-one assignment of detections to tracks maximizing total IoU.
///
/// Returns, for each box in `det_boxes`, the index into `track_boxes` it was
/// assigned to. Pairs whose IoU does not exceed `iou_threshold` are left
/// unassigned.
pub fn assign_best_match(
    track_boxes: &[Rect],
    det_boxes: &[Rect],
    iou_threshold: f32,
) -> Vec<Option<usize>> {
    let dists = iou_distance(track_boxes, det_boxes);
    let AssignmentResult { matches, .. } = linear_assignment(&dists, 1.0 - iou_threshold);

    let mut assigned = vec![None; det_boxes.len()];
    for (itrack, idet) in matches {
        // The cost gate is inclusive, the IoU gate is strict.
        if track_boxes[itrack].iou(&det_boxes[idet]) > iou_threshold {
            assigned[idet] = Some(itrack);
        }
    }
    assigned
}

/// Compute IoU distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(track_boxes, det_boxes).mapv(|iou| 1.0 - iou)
}

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Solve the assignment problem on `cost_matrix`, keeping pairs whose cost is
/// at most `thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for ((i, j), &cost) in cost_matrix.indexed_iter() {
        padded[[i, j]] = cost as f64;
    }

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(_) => {
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| u.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
