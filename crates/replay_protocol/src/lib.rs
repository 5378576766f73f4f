//! On-disk replay format.
//!
//! A replay is a directory with two files:
//! - `manifest.json`: canvas size, palette and the chunk table.
//! - `placements.bin`: every record, 9 bytes each, chunks back to back in log
//!   order.
//!
//! Chunks are cut at a fixed record count and never reordered, so a record's
//! byte offset divided by 9 is its log position.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use model::{CanvasSize, PADDING_COLOR_INDEX, Palette, RECORD_SIZE, TilePlacement};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u16 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const PLACEMENTS_FILE: &str = "placements.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCanvas {
    pub width: u16,
    pub height: u16,
}

impl From<CanvasSize> for ManifestCanvas {
    fn from(canvas: CanvasSize) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
        }
    }
}

impl From<ManifestCanvas> for CanvasSize {
    fn from(canvas: ManifestCanvas) -> Self {
        CanvasSize::new(canvas.width, canvas.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescription {
    pub id: u32,
    /// Log position of the chunk's first record.
    pub first_position: u32,
    pub num_records: u32,
    /// Largest timestamp of any record in the chunk.
    pub up_to_ms: u32,
}

impl ChunkDescription {
    pub fn byte_range(&self) -> Range<usize> {
        let start = self.first_position as usize * RECORD_SIZE;
        start..start + self.num_records as usize * RECORD_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayManifest {
    pub schema_version: u16,
    pub canvas: ManifestCanvas,
    pub palette: BTreeMap<u8, [u8; 4]>,
    pub chunks: Vec<ChunkDescription>,
}

impl ReplayManifest {
    pub fn canvas_size(&self) -> CanvasSize {
        self.canvas.into()
    }

    pub fn palette(&self) -> Palette {
        Palette::from_map(&self.palette)
    }

    pub fn record_count(&self) -> u64 {
        self.chunks
            .iter()
            .map(|chunk| u64::from(chunk.num_records))
            .sum()
    }

    /// Largest timestamp in the whole log, if it holds any record.
    pub fn last_timestamp_ms(&self) -> Option<u32> {
        self.chunks.iter().map(|chunk| chunk.up_to_ms).max()
    }

    /// Checks the manifest against itself and against the size of
    /// `placements.bin`.
    pub fn validate(&self, placements_len: u64) -> Result<(), ManifestError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ManifestError::SchemaVersion {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        if self.canvas_size().is_empty() {
            return Err(ManifestError::EmptyCanvas {
                width: self.canvas.width,
                height: self.canvas.height,
            });
        }
        if self.palette.contains_key(&PADDING_COLOR_INDEX) {
            return Err(ManifestError::ReservedPaletteIndex {
                index: PADDING_COLOR_INDEX,
            });
        }

        let mut next_position = 0u32;
        for chunk in &self.chunks {
            if chunk.num_records == 0 {
                return Err(ManifestError::EmptyChunk { id: chunk.id });
            }
            if chunk.first_position != next_position {
                return Err(ManifestError::ChunkNotContiguous {
                    id: chunk.id,
                    expected: next_position,
                    found: chunk.first_position,
                });
            }
            next_position = next_position
                .checked_add(chunk.num_records)
                .ok_or(ManifestError::PositionOverflow { id: chunk.id })?;
        }

        let expected = self.record_count() * RECORD_SIZE as u64;
        if placements_len != expected {
            return Err(ManifestError::PlacementLengthMismatch {
                expected,
                actual: placements_len,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema version {found}, expected {expected}")]
    SchemaVersion { found: u16, expected: u16 },
    #[error("canvas {width}x{height} has no tiles")]
    EmptyCanvas { width: u16, height: u16 },
    #[error("palette defines index {index}, which is reserved for padding")]
    ReservedPaletteIndex { index: u8 },
    #[error("palette is full; every index below {PADDING_COLOR_INDEX} is taken")]
    PaletteFull,
    #[error("chunk {id} is empty")]
    EmptyChunk { id: u32 },
    #[error("chunk {id} starts at position {found}, expected {expected}")]
    ChunkNotContiguous { id: u32, expected: u32, found: u32 },
    #[error("chunk {id} runs past the position range")]
    PositionOverflow { id: u32 },
    #[error("placements hold {actual} bytes, chunks describe {expected}")]
    PlacementLengthMismatch { expected: u64, actual: u64 },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ManifestError + '_ {
    move |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A manifest together with the record bytes it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub manifest: ReplayManifest,
    pub placements: Vec<u8>,
}

impl Replay {
    pub fn load(dir: &Path) -> Result<Self, ManifestError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_json = std::fs::read(&manifest_path).map_err(io_error(&manifest_path))?;
        let manifest: ReplayManifest = serde_json::from_slice(&manifest_json)?;

        let placements_path = dir.join(PLACEMENTS_FILE);
        let placements = std::fs::read(&placements_path).map_err(io_error(&placements_path))?;
        manifest.validate(placements.len() as u64)?;
        Ok(Self {
            manifest,
            placements,
        })
    }

    pub fn save(&self, dir: &Path) -> Result<(), ManifestError> {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_json = serde_json::to_vec_pretty(&self.manifest)?;
        std::fs::write(&manifest_path, manifest_json).map_err(io_error(&manifest_path))?;

        let placements_path = dir.join(PLACEMENTS_FILE);
        std::fs::write(&placements_path, &self.placements).map_err(io_error(&placements_path))
    }

    pub fn chunk_bytes(&self, chunk: &ChunkDescription) -> &[u8] {
        &self.placements[chunk.byte_range()]
    }
}

/// Appends records in the order given and cuts them into fixed-size chunks.
#[derive(Debug)]
pub struct ReplayWriter {
    canvas: CanvasSize,
    records_per_chunk: u32,
    palette: BTreeMap<u8, [u8; 4]>,
    color_indices: BTreeMap<[u8; 4], u8>,
    placements: Vec<u8>,
    chunks: Vec<ChunkDescription>,
}

impl ReplayWriter {
    pub fn new(canvas: CanvasSize, records_per_chunk: u32) -> Self {
        assert!(records_per_chunk > 0, "chunks must hold at least one record");
        Self {
            canvas,
            records_per_chunk,
            palette: BTreeMap::new(),
            color_indices: BTreeMap::new(),
            placements: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Registers `rgba` under an explicit index.
    pub fn define_color(&mut self, index: u8, rgba: [u8; 4]) -> Result<(), ManifestError> {
        if index == PADDING_COLOR_INDEX {
            return Err(ManifestError::ReservedPaletteIndex { index });
        }
        self.palette.insert(index, rgba);
        self.color_indices.entry(rgba).or_insert(index);
        Ok(())
    }

    /// Appends a record whose color index is already assigned.
    ///
    /// # Panics
    ///
    /// If the log already holds `u32::MAX` records.
    pub fn push(&mut self, placement: TilePlacement) {
        debug_assert!(!placement.is_padding(), "padding is not part of a replay");
        let position = position_after(self.placements.len());
        placement.write_into(&mut self.placements);
        match self.chunks.last_mut() {
            Some(chunk) if chunk.num_records < self.records_per_chunk => {
                chunk.num_records += 1;
                chunk.up_to_ms = chunk.up_to_ms.max(placement.timestamp_ms);
            }
            _ => self.chunks.push(ChunkDescription {
                id: u32::try_from(self.chunks.len()).expect("chunk count exceeds u32"),
                first_position: position,
                num_records: 1,
                up_to_ms: placement.timestamp_ms,
            }),
        }
    }

    /// Appends a record by color, assigning the next free palette index to
    /// colors not seen before.
    pub fn push_color(
        &mut self,
        x: u16,
        y: u16,
        rgba: [u8; 4],
        timestamp_ms: u32,
    ) -> Result<(), ManifestError> {
        let color_index = match self.color_indices.get(&rgba) {
            Some(index) => *index,
            None => {
                let index = (0..PADDING_COLOR_INDEX)
                    .find(|index| !self.palette.contains_key(index))
                    .ok_or(ManifestError::PaletteFull)?;
                self.define_color(index, rgba)?;
                index
            }
        };
        self.push(TilePlacement {
            x,
            y,
            color_index,
            timestamp_ms,
        });
        Ok(())
    }

    pub fn finish(self) -> Replay {
        Replay {
            manifest: ReplayManifest {
                schema_version: SCHEMA_VERSION,
                canvas: self.canvas.into(),
                palette: self.palette,
                chunks: self.chunks,
            },
            placements: self.placements,
        }
    }
}

/// Position of the record appended after `log_bytes` bytes of records.
fn position_after(log_bytes: usize) -> u32 {
    u32::try_from(log_bytes / RECORD_SIZE)
        .ok()
        .filter(|position| *position < u32::MAX)
        .expect("replay log exceeds the u32 position range")
}
