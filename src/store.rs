//! Process-wide slot holding the latest successful reading.

use crate::reading::Reading;
use std::sync::{Arc, PoisonError, RwLock};

/// Latest-reading store shared between the serial supervisor and query handlers.
///
/// Cloning is cheap and every clone refers to the same slot. The slot starts
/// empty and each [`update`](Self::update) replaces it wholesale; no history
/// is kept.
#[derive(Debug, Clone, Default)]
pub struct LatestReading {
    slot: Arc<RwLock<Option<Reading>>>,
}

impl LatestReading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held reading unconditionally.
    pub fn update(&self, reading: Reading) {
        // The guarded value is only ever assigned whole, so a poisoned lock
        // still holds a complete reading.
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(reading);
    }

    /// The most recently stored reading, or `None` before the first update.
    pub fn current(&self) -> Option<Reading> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
