//! Decides which identifiers deserve an alert.

use std::collections::HashMap;

use tracing::debug;

/// Remembers every identifier observed during a session.
///
/// An identifier is "new" the first time it is observed; every later
/// observation is a repeat. With an expiry configured, identifiers not
/// observed for more than that many frames are forgotten and will alert
/// again if they come back.
#[derive(Debug, Clone, Default)]
pub struct AlertGate {
    /// id -> last frame it was observed in
    seen: HashMap<u64, u64>,
    expire_after: Option<u32>,
}

impl AlertGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expiry(expire_after: Option<u32>) -> Self {
        Self {
            seen: HashMap::new(),
            expire_after,
        }
    }

    /// Record an observation of `id` in `frame_id`. Returns true if the id
    /// had not been seen before.
    pub fn observe(&mut self, id: u64, frame_id: u64) -> bool {
        self.seen.insert(id, frame_id).is_none()
    }

    /// Record every id of one frame and return the new ones in input order.
    pub fn observe_frame<I: IntoIterator<Item = u64>>(&mut self, ids: I, frame_id: u64) -> Vec<u64> {
        let mut fresh = Vec::new();
        for id in ids {
            if self.observe(id, frame_id) {
                fresh.push(id);
            }
        }
        fresh
    }

    pub fn has_seen(&self, id: u64) -> bool {
        self.seen.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget identifiers unseen for longer than the configured expiry.
    /// Returns how many were dropped.
    pub fn expire(&mut self, frame_id: u64) -> usize {
        let Some(limit) = self.expire_after else {
            return 0;
        };
        let before = self.seen.len();
        self.seen
            .retain(|_, last| frame_id.saturating_sub(*last) <= u64::from(limit));
        let dropped = before - self.seen.len();
        if dropped > 0 {
            debug!(dropped, frame_id, "expired alert identifiers");
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
