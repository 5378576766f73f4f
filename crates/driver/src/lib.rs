//! Caller-side replay loop.
//!
//! The resolver only ever sees one chunk and one cutoff at a time. The driver
//! walks the replay's chunks in log order, moving past a chunk only once every
//! record in it was at or before the cutoff, and re-runs a partially applied
//! chunk when the cutoff advances.
//!
//! Under two-pass timestamp ordering the log's append order says nothing about
//! recency, so every advance resolves all chunks before compositing any.

use engine::{ChunkResolver, CompositeMode, ProgressSnapshot, ResolveOrdering, ResolverConfig};
use image::RgbaImage;
use model::CanvasSize;
use replay_protocol::Replay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceReport {
    pub cutoff_ms: u32,
    /// The cutoff moved backwards and the image was rebuilt from scratch.
    pub restarted: bool,
    pub chunks_run: usize,
    /// Chunks fully applied so far.
    pub chunks_completed: usize,
    /// Bounds of the last chunk run by this advance.
    pub last_bounds: Option<ProgressSnapshot>,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError<E: std::error::Error + 'static> {
    #[error("replay canvas {replay:?} does not match resolver canvas {resolver:?}")]
    CanvasMismatch {
        replay: CanvasSize,
        resolver: CanvasSize,
    },
    #[error(transparent)]
    Resolver(E),
}

pub struct ReplayDriver<R: ChunkResolver> {
    resolver: R,
    replay: Replay,
    background: [u8; 4],
    next_chunk: usize,
    applied_cutoff_ms: Option<u32>,
    partial_bounds: Option<ProgressSnapshot>,
}

impl<R: ChunkResolver> ReplayDriver<R> {
    pub fn new(
        mut resolver: R,
        replay: Replay,
        background: [u8; 4],
    ) -> Result<Self, DriverError<R::Error>> {
        let replay_canvas = replay.manifest.canvas_size();
        let resolver_canvas = resolver.config().canvas;
        if replay_canvas != resolver_canvas {
            return Err(DriverError::CanvasMismatch {
                replay: replay_canvas,
                resolver: resolver_canvas,
            });
        }
        resolver
            .clear_image(background)
            .map_err(DriverError::Resolver)?;
        Ok(Self {
            resolver,
            replay,
            background,
            next_chunk: 0,
            applied_cutoff_ms: None,
            partial_bounds: None,
        })
    }

    pub fn replay(&self) -> &Replay {
        &self.replay
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn into_resolver(self) -> R {
        self.resolver
    }

    /// True once every chunk has been fully applied.
    pub fn is_caught_up(&self) -> bool {
        self.next_chunk >= self.replay.manifest.chunks.len()
    }

    /// Largest timestamp seen by the last advance, if it stopped short of the
    /// end of the log.
    pub fn next_cutoff_hint(&self) -> Option<u32> {
        self.partial_bounds
            .map(|bounds| bounds.max_timestamp_seen)
    }

    /// Brings the image up to `cutoff_ms`.
    pub fn advance_to(&mut self, cutoff_ms: u32) -> Result<AdvanceReport, DriverError<R::Error>> {
        let restarted = self
            .applied_cutoff_ms
            .is_some_and(|applied| cutoff_ms < applied);
        if restarted {
            self.restart()?;
        }
        if self.applied_cutoff_ms == Some(cutoff_ms) {
            return Ok(self.report(cutoff_ms, false, 0, self.partial_bounds));
        }

        let (chunks_run, last_bounds) = if ranks_whole_log(self.resolver.config()) {
            self.resolve_whole_log(cutoff_ms)?
        } else {
            self.apply_chunks_in_order(cutoff_ms)?
        };
        self.applied_cutoff_ms = Some(cutoff_ms);

        let report = self.report(cutoff_ms, restarted, chunks_run, last_bounds);
        tracing::info!(
            cutoff_ms,
            restarted,
            chunks_run,
            chunks_completed = report.chunks_completed,
            caught_up = self.is_caught_up(),
            "replay advanced"
        );
        Ok(report)
    }

    /// Runs chunks from the first one not fully applied, stopping in the first
    /// chunk holding a record past the cutoff.
    fn apply_chunks_in_order(
        &mut self,
        cutoff_ms: u32,
    ) -> Result<(usize, Option<ProgressSnapshot>), DriverError<R::Error>> {
        let mut chunks_run = 0;
        let mut last_bounds = None;
        while let Some(chunk) = self.replay.manifest.chunks.get(self.next_chunk).copied() {
            self.resolver
                .reset(cutoff_ms)
                .map_err(DriverError::Resolver)?;
            let bounds = self
                .resolver
                .run_chunk(self.replay.chunk_bytes(&chunk), chunk.first_position)
                .map_err(DriverError::Resolver)?;
            chunks_run += 1;
            last_bounds = Some(bounds);
            tracing::debug!(
                chunk = chunk.id,
                cutoff_ms,
                max_timestamp_seen = bounds.max_timestamp_seen,
                max_timestamp_used = bounds.max_timestamp_used,
                max_position_used = ?bounds.max_position_used,
                "chunk applied"
            );

            if !bounds.chunk_exhausted() {
                self.partial_bounds = Some(bounds);
                break;
            }
            self.partial_bounds = None;
            self.next_chunk += 1;
        }
        Ok((chunks_run, last_bounds))
    }

    /// Resolves every chunk into one winner table, then composites them all.
    ///
    /// A newer record may sit in any chunk, so nothing is skipped and a chunk
    /// holding a future record does not hold back the ones after it.
    fn resolve_whole_log(
        &mut self,
        cutoff_ms: u32,
    ) -> Result<(usize, Option<ProgressSnapshot>), DriverError<R::Error>> {
        let chunks = &self.replay.manifest.chunks;
        self.resolver
            .reset(cutoff_ms)
            .map_err(DriverError::Resolver)?;
        let mut bounds = None;
        for chunk in chunks {
            let snapshot = self
                .resolver
                .resolve_chunk(self.replay.chunk_bytes(chunk), chunk.first_position)
                .map_err(DriverError::Resolver)?;
            bounds = Some(snapshot);
        }
        for chunk in chunks {
            self.resolver
                .composite_chunk(self.replay.chunk_bytes(chunk), chunk.first_position)
                .map_err(DriverError::Resolver)?;
        }
        tracing::debug!(
            chunks = chunks.len(),
            cutoff_ms,
            max_timestamp_seen = ?bounds.map(|bounds| bounds.max_timestamp_seen),
            "log resolved by timestamp"
        );

        self.next_chunk = chunks
            .iter()
            .take_while(|chunk| chunk.up_to_ms <= cutoff_ms)
            .count();
        self.partial_bounds = bounds.filter(|bounds| !bounds.chunk_exhausted());
        Ok((chunks.len(), bounds))
    }

    pub fn snapshot_image(&mut self) -> Result<RgbaImage, DriverError<R::Error>> {
        self.resolver
            .snapshot_image()
            .map_err(DriverError::Resolver)
    }

    fn restart(&mut self) -> Result<(), DriverError<R::Error>> {
        self.resolver
            .clear_image(self.background)
            .map_err(DriverError::Resolver)?;
        self.next_chunk = 0;
        self.applied_cutoff_ms = None;
        self.partial_bounds = None;
        Ok(())
    }

    fn report(
        &self,
        cutoff_ms: u32,
        restarted: bool,
        chunks_run: usize,
        last_bounds: Option<ProgressSnapshot>,
    ) -> AdvanceReport {
        AdvanceReport {
            cutoff_ms,
            restarted,
            chunks_run,
            chunks_completed: self.next_chunk,
            last_bounds,
        }
    }
}

/// Timestamp ranking ignores append order, so chunks cannot be applied one
/// at a time. The single-pass mode keeps racing chunk by chunk.
fn ranks_whole_log(config: ResolverConfig) -> bool {
    config.ordering == ResolveOrdering::TimestampThenPosition
        && config.mode == CompositeMode::TwoPass
}

#[cfg(test)]
mod tests;
