//! Preset cycling state
//!
//! Repeated presses of the same control step through a preset list. Pressing
//! any other control in between breaks the chain: the next press on the
//! first control reuses its stored index instead of advancing.

use std::collections::HashMap;
use tracing::trace;

/// Identity of one cycling control on one device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CycleKey {
    pub device: String,
    pub match_signature: String,
}

impl CycleKey {
    pub fn new(device: impl Into<String>, match_signature: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            match_signature: match_signature.into(),
        }
    }
}

/// Per-key preset index plus the single most recently used key
///
/// `last_key` is shared by every device and rule: only one control can be
/// the last one touched.
#[derive(Debug, Default)]
pub struct CycleTracker {
    indices: HashMap<CycleKey, usize>,
    last_key: Option<CycleKey>,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index to use for this press of `key`
    ///
    /// Advances (with wraparound) only when `key` was also the previous
    /// invocation. A `preset_count` of zero returns 0 and leaves all state
    /// untouched.
    pub fn advance(&mut self, key: &CycleKey, preset_count: usize) -> usize {
        if preset_count == 0 {
            return 0;
        }

        let consecutive = self.last_key.as_ref() == Some(key);
        let index = self.indices.entry(key.clone()).or_insert(0);

        if consecutive {
            *index = (*index + 1) % preset_count;
        }
        // Stored index may come from a longer preset list before a reload
        let current = *index % preset_count;

        trace!(
            device = %key.device,
            signature = %key.match_signature,
            index = current,
            consecutive,
            "Cycle advance"
        );

        self.last_key = Some(key.clone());
        current
    }

    /// Stored index for `key`, if it has been used
    pub fn index_of(&self, key: &CycleKey) -> Option<usize> {
        self.indices.get(key).copied()
    }

    /// Most recently advanced key
    pub fn last_key(&self) -> Option<&CycleKey> {
        self.last_key.as_ref()
    }

    /// Forget the stored index for one key
    pub fn reset(&mut self, key: &CycleKey) {
        self.indices.remove(key);
    }

    /// Forget everything, including the last-used key
    pub fn clear(&mut self) {
        self.indices.clear();
        self.last_key = None;
    }
}
