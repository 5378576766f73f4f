use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use model::CanvasSize;

pub const EMPTY_SLOT: u64 = 0;
/// Exclusive upper bound on record positions; `position + 1` must fit a 32-bit slot.
pub const MAX_POSITION: u32 = u32::MAX;

/// How competing records for one tile are ranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResolveOrdering {
    /// Highest log position wins. Correct only while the log is appended in
    /// non-decreasing timestamp order, which producers must guarantee.
    #[default]
    Position,
    /// Highest timestamp wins, ties broken by position. Independent of append order.
    TimestampThenPosition,
}

/// Value stored in a winner slot. Never equal to [`EMPTY_SLOT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WinnerKey(u64);

impl WinnerKey {
    /// `position` must be below `u32::MAX`; the stored form is `position + 1`.
    pub fn new(ordering: ResolveOrdering, position: u32, timestamp_ms: u32) -> Self {
        debug_assert!(position < MAX_POSITION, "record position {position} out of range");
        let position_key = u64::from(position) + 1;
        match ordering {
            ResolveOrdering::Position => Self(position_key),
            ResolveOrdering::TimestampThenPosition => {
                Self((u64::from(timestamp_ms) << 32) | position_key)
            }
        }
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn position(self) -> u32 {
        let position_key = self.0 & u64::from(u32::MAX);
        u32::try_from(position_key - 1).expect("winner key position exceeds u32")
    }
}

/// Per-tile atomic "winning record" slots.
#[derive(Debug)]
pub struct TileWinnerTable {
    canvas: CanvasSize,
    slots: Box<[AtomicU64]>,
}

impl TileWinnerTable {
    pub fn new(canvas: CanvasSize) -> Self {
        let slots = (0..canvas.tile_count())
            .map(|_| AtomicU64::new(EMPTY_SLOT))
            .collect();
        Self { canvas, slots }
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Raises the slot to `key`; returns the previous raw slot value.
    ///
    /// Relaxed is enough: readers only look at the table after the pass has
    /// joined, and the join publishes every write.
    pub fn claim(&self, tile: usize, key: WinnerKey) -> u64 {
        self.slots[tile].fetch_max(key.raw(), Ordering::Relaxed)
    }

    pub fn get(&self, tile: usize) -> Option<WinnerKey> {
        match self.slots[tile].load(Ordering::Relaxed) {
            EMPTY_SLOT => None,
            raw => Some(WinnerKey(raw)),
        }
    }

    pub fn winning_position(&self, tile: usize) -> Option<u32> {
        self.get(tile).map(WinnerKey::position)
    }

    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot.get_mut() = EMPTY_SLOT;
        }
    }
}

/// Per-tile "latest timestamp claimed" used by the single-pass update mode.
#[derive(Debug)]
pub struct TileTimestampTable {
    slots: Box<[AtomicU32]>,
}

impl TileTimestampTable {
    pub fn new(canvas: CanvasSize) -> Self {
        let slots = (0..canvas.tile_count()).map(|_| AtomicU32::new(0)).collect();
        Self { slots }
    }

    pub fn raise(&self, tile: usize, timestamp_ms: u32) -> u32 {
        self.slots[tile].fetch_max(timestamp_ms, Ordering::Relaxed)
    }

    pub fn get(&self, tile: usize) -> u32 {
        self.slots[tile].load(Ordering::Relaxed)
    }

    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot.get_mut() = 0;
        }
    }
}
