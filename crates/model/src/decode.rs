use crate::{RECORD_SIZE, TilePlacement};

/// Random access to the records of one chunk.
///
/// `decode` is total over `0..len()`; callers guard the index, the same way an
/// inactive dispatch lane checks its logical index before touching memory.
pub trait RecordSource: Sync {
    fn len(&self) -> usize;

    fn decode(&self, index: usize) -> TilePlacement;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ByteLog<'a> {
    bytes: &'a [u8],
}

impl<'a> ByteLog<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl RecordSource for ByteLog<'_> {
    fn len(&self) -> usize {
        self.bytes.len() / RECORD_SIZE
    }

    fn decode(&self, index: usize) -> TilePlacement {
        let base = index * RECORD_SIZE;
        let record = &self.bytes[base..base + RECORD_SIZE];
        TilePlacement {
            x: u16::from_le_bytes([record[0], record[1]]),
            y: u16::from_le_bytes([record[2], record[3]]),
            color_index: record[4],
            timestamp_ms: u32::from_le_bytes([record[5], record[6], record[7], record[8]]),
        }
    }
}

/// Records packed into 32-bit words, the layout the GPU kernels read.
///
/// Fields are rebuilt from single byte reads so a record may straddle word
/// boundaries freely.
#[derive(Debug, Clone, Copy)]
pub struct WordLog<'a> {
    words: &'a [u32],
    record_count: usize,
}

impl<'a> WordLog<'a> {
    pub fn new(words: &'a [u32], record_count: usize) -> Self {
        assert!(
            record_count * RECORD_SIZE <= words.len() * 4,
            "record count {record_count} exceeds packed word storage of {} words",
            words.len()
        );
        Self {
            words,
            record_count,
        }
    }

    fn read_u8(&self, byte_offset: usize) -> u32 {
        let word = self.words[byte_offset / 4];
        (word >> ((byte_offset % 4) * 8)) & 0xff
    }

    /// Little-endian unsigned value of `width_bits` (8, 16 or 32) bits.
    pub fn read_uint(&self, byte_offset: usize, width_bits: u32) -> u32 {
        assert!(
            matches!(width_bits, 8 | 16 | 32),
            "unsupported field width {width_bits}"
        );
        let byte_count = (width_bits / 8) as usize;
        (0..byte_count).fold(0u32, |value, byte| {
            value | (self.read_u8(byte_offset + byte) << (byte * 8))
        })
    }
}

impl RecordSource for WordLog<'_> {
    fn len(&self) -> usize {
        self.record_count
    }

    fn decode(&self, index: usize) -> TilePlacement {
        let base = index * RECORD_SIZE;
        TilePlacement {
            x: self.read_uint(base, 16) as u16,
            y: self.read_uint(base + 2, 16) as u16,
            color_index: self.read_uint(base + 4, 8) as u8,
            timestamp_ms: self.read_uint(base + 5, 32),
        }
    }
}

/// Packs bytes into little-endian words, zero-filling the last partial word.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}
