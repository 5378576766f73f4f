//! Chunk batching and phase submission.

use std::ops::Range;

use engine::{CompositeMode, ResolveOrdering, ResolverConfig};
use model::{RECORD_SIZE, pad_to_dispatch_unit};

use crate::{GpuTileResolver, RunParamsGpu, WORKGROUP_SIZE};

/// One kernel entry point of `tile_resolve.wgsl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ResolvePhase {
    ResolvePositions,
    ClaimTimestamps,
    ClaimPositions,
    CompositeWinners,
    SinglePassUpdate,
}

impl ResolvePhase {
    pub(crate) const ALL: [Self; 5] = [
        Self::ResolvePositions,
        Self::ClaimTimestamps,
        Self::ClaimPositions,
        Self::CompositeWinners,
        Self::SinglePassUpdate,
    ];

    pub(crate) fn entry_point(self) -> &'static str {
        match self {
            Self::ResolvePositions => "resolve_positions",
            Self::ClaimTimestamps => "claim_timestamps",
            Self::ClaimPositions => "claim_positions",
            Self::CompositeWinners => "composite_winners",
            Self::SinglePassUpdate => "single_pass_update",
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::ResolvePositions => "renderer.tile_resolve.resolve_positions",
            Self::ClaimTimestamps => "renderer.tile_resolve.claim_timestamps",
            Self::ClaimPositions => "renderer.tile_resolve.claim_positions",
            Self::CompositeWinners => "renderer.tile_resolve.composite_winners",
            Self::SinglePassUpdate => "renderer.tile_resolve.single_pass_update",
        }
    }

    fn pipeline_index(self) -> usize {
        Self::ALL
            .iter()
            .position(|phase| *phase == self)
            .expect("every phase is listed in ALL")
    }

    /// Phases a chunk runs through, in submission order.
    pub(crate) fn sequence(config: ResolverConfig) -> &'static [Self] {
        match (config.mode, config.ordering) {
            (CompositeMode::TwoPass, ResolveOrdering::Position) => {
                &[Self::ResolvePositions, Self::CompositeWinners]
            }
            (CompositeMode::TwoPass, ResolveOrdering::TimestampThenPosition) => &[
                Self::ClaimTimestamps,
                Self::ClaimPositions,
                Self::CompositeWinners,
            ],
            (CompositeMode::BestEffortSinglePass, _) => &[Self::SinglePassUpdate],
        }
    }

    /// Two-pass phases up to, but excluding, the composite.
    pub(crate) fn resolve_sequence(ordering: ResolveOrdering) -> &'static [Self] {
        match ordering {
            ResolveOrdering::Position => &[Self::ResolvePositions],
            ResolveOrdering::TimestampThenPosition => {
                &[Self::ClaimTimestamps, Self::ClaimPositions]
            }
        }
    }
}

/// Splits `record_count` records into consecutive batches of at most
/// `batch_limit` records.
pub(crate) fn plan_batches(
    record_count: usize,
    batch_limit: usize,
) -> impl Iterator<Item = Range<usize>> {
    assert!(batch_limit > 0, "batch limit must be positive");
    (0..record_count)
        .step_by(batch_limit)
        .map(move |start| start..(start + batch_limit).min(record_count))
}

pub(crate) fn workgroup_count(lanes: usize) -> u32 {
    u32::try_from(lanes.div_ceil(WORKGROUP_SIZE as usize))
        .expect("batch workgroup count exceeds u32")
}

impl GpuTileResolver {
    /// Runs `phases` in order over every batch of `chunk`.
    ///
    /// A phase is submitted for all batches before the next phase starts, so a
    /// composite lane never observes a partially resolved winner table.
    pub(crate) fn dispatch_chunk(
        &mut self,
        chunk: &[u8],
        base_position: u32,
        phases: &[ResolvePhase],
    ) {
        let record_count = chunk.len() / RECORD_SIZE;
        if record_count == 0 {
            return;
        }
        let batches: Vec<Range<usize>> = plan_batches(record_count, self.batch_limit).collect();
        let _span = tracing::debug_span!(
            "gpu_dispatch_chunk",
            records = record_count,
            batches = batches.len(),
            phases = phases.len()
        )
        .entered();

        let mut resident_batch = None;
        for &phase in phases {
            for (batch_index, batch) in batches.iter().enumerate() {
                if resident_batch != Some(batch_index) {
                    let bytes = batch.start * RECORD_SIZE..batch.end * RECORD_SIZE;
                    self.upload_batch(&chunk[bytes]);
                    resident_batch = Some(batch_index);
                }
                let offset =
                    u32::try_from(batch.start).expect("batch start fits the position range");
                self.submit_phase(phase, batch.len(), base_position + offset);
            }
        }
    }

    fn upload_batch(&mut self, records: &[u8]) {
        let mut staged = records.to_vec();
        pad_to_dispatch_unit(&mut staged);
        self.ensure_record_capacity(staged.len() / RECORD_SIZE);
        self.gpu_state
            .queue
            .write_buffer(&self.buffers.records, 0, &staged);
    }

    fn submit_phase(&self, phase: ResolvePhase, record_count: usize, base_position: u32) {
        let canvas = self.config.resolver.canvas;
        let params = RunParamsGpu {
            record_count: u32::try_from(record_count).expect("batch record count exceeds u32"),
            base_position,
            cutoff_ms: self.requested_cutoff_ms,
            canvas_width: u32::from(canvas.width),
            canvas_height: u32::from(canvas.height),
            _padding: [0; 3],
        };
        self.gpu_state
            .queue
            .write_buffer(&self.buffers.params, 0, bytemuck::bytes_of(&params));

        let mut encoder =
            self.gpu_state
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("renderer.tile_resolve.encoder"),
                });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(phase.label()),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipelines[phase.pipeline_index()]);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroup_count(record_count), 1, 1);
        }
        self.gpu_state.queue.submit(Some(encoder.finish()));
        tracing::trace!(
            phase = phase.entry_point(),
            records = record_count,
            base_position,
            "phase submitted"
        );
    }
}
