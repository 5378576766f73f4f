use std::sync::atomic::{AtomicU32, Ordering};

/// Watermarks accumulated while a chunk is resolved.
///
/// `max_timestamp_seen` covers every non-padding record, including those past
/// the cutoff. The `used` counters only cover records the cutoff admitted.
#[derive(Debug, Default)]
pub struct ProgressBounds {
    requested_cutoff_ms: u32,
    max_timestamp_seen: AtomicU32,
    max_timestamp_used: AtomicU32,
    // position + 1, zero while nothing was used
    max_position_used: AtomicU32,
}

impl ProgressBounds {
    pub fn new(requested_cutoff_ms: u32) -> Self {
        Self {
            requested_cutoff_ms,
            ..Self::default()
        }
    }

    pub fn requested_cutoff_ms(&self) -> u32 {
        self.requested_cutoff_ms
    }

    pub fn reset(&mut self, requested_cutoff_ms: u32) {
        *self = Self::new(requested_cutoff_ms);
    }

    pub fn admits(&self, timestamp_ms: u32) -> bool {
        timestamp_ms <= self.requested_cutoff_ms
    }

    pub fn observe_seen(&self, timestamp_ms: u32) {
        self.max_timestamp_seen.fetch_max(timestamp_ms, Ordering::Relaxed);
    }

    pub fn observe_used(&self, timestamp_ms: u32, position: u32) {
        self.max_timestamp_used.fetch_max(timestamp_ms, Ordering::Relaxed);
        self.max_position_used.fetch_max(position.saturating_add(1), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::from_raw(
            self.requested_cutoff_ms,
            self.max_timestamp_seen.load(Ordering::Relaxed),
            self.max_timestamp_used.load(Ordering::Relaxed),
            self.max_position_used.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressSnapshot {
    pub requested_cutoff_ms: u32,
    pub max_timestamp_seen: u32,
    pub max_timestamp_used: u32,
    pub max_position_used: Option<u32>,
}

impl ProgressSnapshot {
    /// Builds a snapshot from the raw accumulator words, where the position
    /// word holds `position + 1` and zero means "nothing used".
    pub fn from_raw(
        requested_cutoff_ms: u32,
        max_timestamp_seen: u32,
        max_timestamp_used: u32,
        max_position_used_plus_one: u32,
    ) -> Self {
        Self {
            requested_cutoff_ms,
            max_timestamp_seen,
            max_timestamp_used,
            max_position_used: max_position_used_plus_one.checked_sub(1),
        }
    }

    /// True when no record of the chunk lies beyond the cutoff.
    pub fn chunk_exhausted(&self) -> bool {
        self.max_timestamp_seen <= self.requested_cutoff_ms
    }

    pub fn is_consistent(&self) -> bool {
        self.max_timestamp_used <= self.max_timestamp_seen
            && self.max_timestamp_used <= self.requested_cutoff_ms
    }
}
