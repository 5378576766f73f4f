//! Tile update resolution engine.
//!
//! Resolves, for every tile of a canvas, which placement record is authoritative
//! as of a time cutoff and composites the winners into an image:
//! - `passes`: the data-parallel resolve, composite and single-pass kernels.
//! - `cpu`: a backend that owns the run scratch and drives the passes on rayon.
//!
//! [`ChunkResolver`] is the seam every backend implements so the caller-side
//! replay loop does not care where the passes execute.

mod cpu;
mod passes;

pub use cpu::{CpuResolverError, CpuTileResolver};
pub use passes::{composite_winners, resolve_winners, single_pass_update};

use image::RgbaImage;
use model::CanvasSize;
pub use tiles::{ProgressSnapshot, ResolveOrdering};

/// How winners reach the output image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    /// Resolve every winner first, then composite behind a full barrier.
    #[default]
    TwoPass,
    /// One pass racing on a per-tile timestamp. Records sharing a timestamp on
    /// the same tile may both write; the surviving color is unspecified.
    BestEffortSinglePass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub canvas: CanvasSize,
    pub ordering: ResolveOrdering,
    pub mode: CompositeMode,
}

impl ResolverConfig {
    pub fn new(canvas: CanvasSize) -> Self {
        Self {
            canvas,
            ordering: ResolveOrdering::default(),
            mode: CompositeMode::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ResolverConfigError> {
        if self.canvas.is_empty() {
            return Err(ResolverConfigError::EmptyCanvas {
                width: self.canvas.width,
                height: self.canvas.height,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolverConfigError {
    #[error("canvas {width}x{height} has no tiles")]
    EmptyCanvas { width: u16, height: u16 },
}

/// Per-run inputs shared by both passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParams {
    /// Log position of the chunk's first record.
    pub base_position: u32,
    /// Inclusive upper bound on accepted timestamps.
    pub cutoff_ms: u32,
    pub ordering: ResolveOrdering,
}

/// True when `record_count` records starting at `base_position` all get a
/// position below [`tiles::MAX_POSITION`].
pub fn chunk_fits_positions(base_position: u32, record_count: usize) -> bool {
    u32::try_from(record_count)
        .ok()
        .and_then(|count| base_position.checked_add(count))
        .is_some_and(|end| end <= tiles::MAX_POSITION)
}

/// A backend able to resolve and composite one chunk of the placement log.
///
/// Scratch state is never reset implicitly: call [`ChunkResolver::reset`]
/// before each independent chunk/cutoff combination. The image persists across
/// resets so successive chunks accumulate.
pub trait ChunkResolver {
    type Error: std::error::Error + Send + Sync + 'static;

    fn config(&self) -> ResolverConfig;

    /// Empties the winner table and bounds and sets the cutoff for the next run.
    fn reset(&mut self, cutoff_ms: u32) -> Result<(), Self::Error>;

    /// Resolves and composites the records in `chunk` (9 bytes each).
    fn run_chunk(
        &mut self,
        chunk: &[u8],
        base_position: u32,
    ) -> Result<ProgressSnapshot, Self::Error>;

    /// Claims winners for `chunk` with two-pass semantics and leaves the image
    /// alone. Winners and bounds accumulate over calls until the next reset,
    /// so a log can be resolved chunk by chunk in position order.
    fn resolve_chunk(
        &mut self,
        chunk: &[u8],
        base_position: u32,
    ) -> Result<ProgressSnapshot, Self::Error>;

    /// Writes the color of each record in `chunk` that holds its tile's winner
    /// slot. Call once every chunk of the run has been resolved.
    fn composite_chunk(&mut self, chunk: &[u8], base_position: u32) -> Result<(), Self::Error>;

    fn clear_image(&mut self, rgba: [u8; 4]) -> Result<(), Self::Error>;

    fn snapshot_image(&mut self) -> Result<RgbaImage, Self::Error>;
}
