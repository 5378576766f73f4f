//! Binary layout of tile placement records and the canvas they target.
//!
//! A placement log is a dense byte buffer of fixed-width little-endian records:
//! `x: u16, y: u16, color_index: u8, timestamp_ms: u32`. Records are consumed
//! as a contract; nothing in this crate validates their contents beyond field
//! extraction.

mod decode;
mod palette;

pub use decode::{ByteLog, RecordSource, WordLog, bytes_to_words};
pub use palette::{PALETTE_LEN, Palette};

use static_assertions::const_assert_eq;

pub const RECORD_SIZE: usize = 9;
pub const PADDING_COLOR_INDEX: u8 = 255;
/// Records are dispatched in groups of four: 36 bytes, exactly nine 32-bit words.
pub const RECORDS_PER_DISPATCH_UNIT: usize = 4;
pub const DISPATCH_UNIT_BYTES: usize = RECORD_SIZE * RECORDS_PER_DISPATCH_UNIT;

const_assert_eq!(DISPATCH_UNIT_BYTES % 4, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePlacement {
    pub x: u16,
    pub y: u16,
    pub color_index: u8,
    pub timestamp_ms: u32,
}

impl TilePlacement {
    pub const fn padding() -> Self {
        Self {
            x: 0,
            y: 0,
            color_index: PADDING_COLOR_INDEX,
            timestamp_ms: 0,
        }
    }

    pub const fn is_padding(&self) -> bool {
        self.color_index == PADDING_COLOR_INDEX
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0..2].copy_from_slice(&self.x.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.y.to_le_bytes());
        bytes[4] = self.color_index;
        bytes[5..9].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        bytes
    }

    pub fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bytes());
    }
}

/// Appends padding records until `bytes` holds a whole number of dispatch units.
///
/// A trailing partial record (fewer than [`RECORD_SIZE`] bytes) is dropped first;
/// it would never decode as an in-bounds record anyway.
pub fn pad_to_dispatch_unit(bytes: &mut Vec<u8>) {
    let whole_records = bytes.len() / RECORD_SIZE;
    bytes.truncate(whole_records * RECORD_SIZE);
    let mut record_count = whole_records;
    while record_count % RECORDS_PER_DISPATCH_UNIT != 0 {
        TilePlacement::padding().write_into(bytes);
        record_count += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanvasSize {
    pub width: u16,
    pub height: u16,
}

impl CanvasSize {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub const fn tile_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Row-major slot of a tile: `x + y * width`. `None` outside the canvas.
    pub fn tile_index(self, x: u16, y: u16) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(x as usize + y as usize * self.width as usize)
    }

    pub fn tile_coords(self, index: usize) -> Option<(u16, u16)> {
        if index >= self.tile_count() {
            return None;
        }
        let width = self.width as usize;
        Some(((index % width) as u16, (index / width) as u16))
    }
}
