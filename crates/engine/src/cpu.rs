use image::RgbaImage;
use model::{ByteLog, Palette, RecordSource};
use tiles::{CanvasImage, ProgressBounds, ProgressSnapshot, TileTimestampTable, TileWinnerTable};

use crate::{
    ChunkResolver, CompositeMode, ResolverConfig, ResolverConfigError, RunParams,
    chunk_fits_positions, composite_winners, resolve_winners, single_pass_update,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CpuResolverError {
    #[error(transparent)]
    Config(#[from] ResolverConfigError),
    #[error("chunk of {record_count} records at position {base_position} exceeds the position range")]
    PositionOverflow {
        base_position: u32,
        record_count: usize,
    },
}

/// Runs the passes on the rayon pool and owns the scratch they share.
#[derive(Debug)]
pub struct CpuTileResolver {
    config: ResolverConfig,
    palette: Palette,
    winners: TileWinnerTable,
    timestamps: TileTimestampTable,
    bounds: ProgressBounds,
    image: CanvasImage,
}

impl CpuTileResolver {
    pub fn new(
        config: ResolverConfig,
        palette: Palette,
        background: [u8; 4],
    ) -> Result<Self, CpuResolverError> {
        config.validate()?;
        Ok(Self {
            config,
            palette,
            winners: TileWinnerTable::new(config.canvas),
            timestamps: TileTimestampTable::new(config.canvas),
            bounds: ProgressBounds::new(0),
            image: CanvasImage::new(config.canvas, background),
        })
    }

    pub fn winners(&self) -> &TileWinnerTable {
        &self.winners
    }

    pub fn bounds(&self) -> ProgressSnapshot {
        self.bounds.snapshot()
    }

    pub fn image(&self) -> &CanvasImage {
        &self.image
    }

    fn params(&self, base_position: u32) -> RunParams {
        RunParams {
            base_position,
            cutoff_ms: self.bounds.requested_cutoff_ms(),
            ordering: self.config.ordering,
        }
    }

    fn run_source<S: RecordSource>(&self, source: &S, base_position: u32) {
        let params = self.params(base_position);
        match self.config.mode {
            CompositeMode::TwoPass => {
                resolve_winners(source, params, &self.winners, &self.bounds);
                composite_winners(source, params, &self.winners, &self.palette, &self.image);
            }
            CompositeMode::BestEffortSinglePass => single_pass_update(
                source,
                params,
                &self.timestamps,
                &self.bounds,
                &self.palette,
                &self.image,
            ),
        }
    }
}

fn checked_source(chunk: &[u8], base_position: u32) -> Result<ByteLog<'_>, CpuResolverError> {
    let source = ByteLog::new(chunk);
    if !chunk_fits_positions(base_position, source.len()) {
        return Err(CpuResolverError::PositionOverflow {
            base_position,
            record_count: source.len(),
        });
    }
    Ok(source)
}

impl ChunkResolver for CpuTileResolver {
    type Error = CpuResolverError;

    fn config(&self) -> ResolverConfig {
        self.config
    }

    fn reset(&mut self, cutoff_ms: u32) -> Result<(), Self::Error> {
        self.winners.reset();
        self.timestamps.reset();
        self.bounds.reset(cutoff_ms);
        Ok(())
    }

    fn run_chunk(
        &mut self,
        chunk: &[u8],
        base_position: u32,
    ) -> Result<ProgressSnapshot, Self::Error> {
        let source = checked_source(chunk, base_position)?;
        self.run_source(&source, base_position);
        let snapshot = self.bounds.snapshot();
        tracing::debug!(
            records = source.len(),
            base_position,
            cutoff_ms = snapshot.requested_cutoff_ms,
            max_timestamp_seen = snapshot.max_timestamp_seen,
            max_timestamp_used = snapshot.max_timestamp_used,
            "cpu chunk resolved"
        );
        Ok(snapshot)
    }

    fn resolve_chunk(
        &mut self,
        chunk: &[u8],
        base_position: u32,
    ) -> Result<ProgressSnapshot, Self::Error> {
        let source = checked_source(chunk, base_position)?;
        resolve_winners(
            &source,
            self.params(base_position),
            &self.winners,
            &self.bounds,
        );
        Ok(self.bounds.snapshot())
    }

    fn composite_chunk(&mut self, chunk: &[u8], base_position: u32) -> Result<(), Self::Error> {
        let source = checked_source(chunk, base_position)?;
        composite_winners(
            &source,
            self.params(base_position),
            &self.winners,
            &self.palette,
            &self.image,
        );
        Ok(())
    }

    fn clear_image(&mut self, rgba: [u8; 4]) -> Result<(), Self::Error> {
        self.image.clear(rgba);
        Ok(())
    }

    fn snapshot_image(&mut self) -> Result<RgbaImage, Self::Error> {
        Ok(self.image.to_rgba_image())
    }
}
