//! Persistent object identities kept by the tracker.

use crate::tracker::rect::Rect;

/// A 2-D point in pixel coordinates.
pub type Point = (f32, f32);

/// Hands out track identifiers.
///
/// Identifiers start at 1, increase by one per allocation and are never
/// reused within a session. Each session owns its own allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next_id: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// The identifier the next allocation will return.
    pub fn peek(&self) -> u64 {
        self.next_id
    }

    pub fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Start numbering from 1 again.
    pub fn reset(&mut self) {
        self.next_id = 1;
    }
}

/// Single tracked object.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    /// Unique track identifier
    pub id: u64,
    /// Last known bounding box
    pub rect: Rect,
    /// Positions of the box center, oldest first
    pub history: Vec<Point>,
    /// Confidence of the last matched detection
    pub score: f32,
    /// Frame the track was created in
    pub first_seen: u64,
    /// Last frame a detection was matched to this track
    pub last_seen: u64,
    /// Number of frames a detection was matched to this track
    pub hits: u32,
}

impl TrackedObject {
    pub fn new(id: u64, rect: Rect, score: f32, frame_id: u64) -> Self {
        Self {
            id,
            rect,
            history: vec![rect.center()],
            score,
            first_seen: frame_id,
            last_seen: frame_id,
            hits: 1,
        }
    }

    /// Create a track holding only a history of points, with a zero-size box
    /// at the last point.
    pub fn from_history(id: u64, history: Vec<Point>, frame_id: u64) -> Self {
        let (x, y) = history.last().copied().unwrap_or_default();
        Self {
            id,
            rect: Rect::new(x, y, x, y),
            history,
            score: 0.0,
            first_seen: frame_id,
            last_seen: frame_id,
            hits: 1,
        }
    }

    /// Last recorded point, if any.
    pub fn last_point(&self) -> Option<Point> {
        self.history.last().copied()
    }

    /// Record a matched detection.
    pub fn update(&mut self, rect: Rect, score: f32, frame_id: u64, max_history: Option<usize>) {
        self.rect = rect;
        self.score = score;
        self.last_seen = frame_id;
        self.hits += 1;
        self.push_point(rect.center(), max_history);
    }

    /// Move the box by `(dx, dy)` without counting it as a sighting.
    pub fn shift(&mut self, dx: f32, dy: f32) {
        self.rect = self.rect.translate(dx, dy);
    }

    pub fn push_point(&mut self, point: Point, max_history: Option<usize>) {
        self.history.push(point);
        if let Some(max) = max_history
            && self.history.len() > max
        {
            let excess = self.history.len() - max;
            self.history.drain(..excess);
        }
    }

    pub fn frames_unseen(&self, frame_id: u64) -> u64 {
        frame_id.saturating_sub(self.last_seen)
    }
}

/// Insertion-ordered map from track id to tracked object.
///
/// Iteration order is the order tracks were inserted, which makes
/// first-match association deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMap {
    objects: Vec<TrackedObject>,
}

impl TrackMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackedObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, TrackedObject> {
        self.objects.iter_mut()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.objects.iter().map(|o| o.id).collect()
    }

    pub fn rects(&self) -> Vec<Rect> {
        self.objects.iter().map(|o| o.rect).collect()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut TrackedObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// Insert an object, replacing any existing entry with the same id in place.
    pub fn insert(&mut self, object: TrackedObject) {
        match self.get_mut(object.id) {
            Some(existing) => *existing = object,
            None => self.objects.push(object),
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<TrackedObject> {
        let pos = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(pos))
    }

    pub fn retain<F: FnMut(&TrackedObject) -> bool>(&mut self, f: F) {
        self.objects.retain(f);
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn to_vec(&self) -> Vec<TrackedObject> {
        self.objects.clone()
    }
}

impl FromIterator<TrackedObject> for TrackMap {
    fn from_iter<I: IntoIterator<Item = TrackedObject>>(iter: I) -> Self {
        let mut map = TrackMap::new();
        for object in iter {
            map.insert(object);
        }
        map
    }
}

impl<'a> IntoIterator for &'a TrackMap {
    type Item = &'a TrackedObject;
    type IntoIter = std::slice::Iter<'a, TrackedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

impl IntoIterator for TrackMap {
    type Item = TrackedObject;
    type IntoIter = std::vec::IntoIter<TrackedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}
