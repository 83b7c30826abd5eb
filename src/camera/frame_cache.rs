//! Most recent frame handed to the live preview.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::Frame;

/// Holds nothing until the first frame arrives, then the latest one stored.
///
/// Only successful captures (or the placeholder produced by a failed start)
/// are stored; a failed read never touches the cache. Nothing clears it.
#[derive(Debug, Default)]
pub struct FrameCache {
    latest: Mutex<Option<Frame>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Frame) {
        *self.slot() = Some(frame);
    }

    pub fn latest(&self) -> Option<Frame> {
        self.slot().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Frame>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
