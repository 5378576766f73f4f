//! GPU backend for placement resolution.
//!
//! Runs the resolve and composite passes as compute kernels writing an
//! `rgba8unorm` storage texture:
//! - `resolver_init`: device resources, pipelines and the bind group.
//! - `resolver_dispatch`: batching a chunk and submitting each phase.
//! - `readback`: copying bounds and the output image back to the host.
//!
//! Every phase of a chunk is a separate queue submission, so all resolve work
//! has landed before the first composite lane reads the winner table.

mod readback;
mod resolver_dispatch;
mod resolver_init;

use engine::{ChunkResolver, ResolverConfig, ResolverConfigError, chunk_fits_positions};
use image::RgbaImage;
use model::RECORD_SIZE;
use resolver_dispatch::ResolvePhase;
use tiles::ProgressSnapshot;

pub const WORKGROUP_SIZE: u32 = 64;
const INITIAL_RECORD_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuResolverConfig {
    pub resolver: ResolverConfig,
    /// Caps the records per submission below what the device limits allow.
    pub max_records_per_batch: Option<usize>,
}

impl GpuResolverConfig {
    pub fn new(resolver: ResolverConfig) -> Self {
        Self {
            resolver,
            max_records_per_batch: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GpuResolverError {
    #[error(transparent)]
    Config(#[from] ResolverConfigError),
    #[error("canvas {width}x{height} exceeds the device texture limit of {limit}")]
    CanvasExceedsTextureLimit { width: u16, height: u16, limit: u32 },
    #[error("tile tables need {required} bytes, the device binds at most {limit}")]
    TileTableExceedsBindingLimit { required: u64, limit: u64 },
    #[error("chunk of {record_count} records at position {base_position} exceeds the position range")]
    PositionOverflow {
        base_position: u32,
        record_count: usize,
    },
    #[error("no usable GPU adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),
    #[error("GPU device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("readback buffer map failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("readback map callback dropped before completing")]
    MapCallbackDropped,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
struct RunParamsGpu {
    record_count: u32,
    base_position: u32,
    cutoff_ms: u32,
    canvas_width: u32,
    canvas_height: u32,
    _padding: [u32; 3],
}

struct GpuState {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

struct ResolveBuffers {
    params: wgpu::Buffer,
    records: wgpu::Buffer,
    record_capacity: usize,
    palette: wgpu::Buffer,
    winners: wgpu::Buffer,
    timestamps: wgpu::Buffer,
    bounds: wgpu::Buffer,
    bounds_readback: wgpu::Buffer,
}

/// Resolves chunks on a wgpu device.
///
/// Owns its scratch tables and the output texture. The texture is exposed
/// through [`GpuTileResolver::output_texture`] so a host can sample it.
pub struct GpuTileResolver {
    gpu_state: GpuState,
    config: GpuResolverConfig,
    batch_limit: usize,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Vec<wgpu::ComputePipeline>,
    buffers: ResolveBuffers,
    output_texture: wgpu::Texture,
    output_view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    requested_cutoff_ms: u32,
}

impl GpuTileResolver {
    pub fn output_texture(&self) -> &wgpu::Texture {
        &self.output_texture
    }

    /// Most records a single submission carries on this device.
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

impl ChunkResolver for GpuTileResolver {
    type Error = GpuResolverError;

    fn config(&self) -> ResolverConfig {
        self.config.resolver
    }

    fn reset(&mut self, cutoff_ms: u32) -> Result<(), Self::Error> {
        let mut encoder =
            self.gpu_state
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("renderer.tile_resolve.reset"),
                });
        encoder.clear_buffer(&self.buffers.winners, 0, None);
        encoder.clear_buffer(&self.buffers.timestamps, 0, None);
        encoder.clear_buffer(&self.buffers.bounds, 0, None);
        self.gpu_state.queue.submit(Some(encoder.finish()));
        self.requested_cutoff_ms = cutoff_ms;
        Ok(())
    }

    fn run_chunk(
        &mut self,
        chunk: &[u8],
        base_position: u32,
    ) -> Result<ProgressSnapshot, Self::Error> {
        let records = checked_records(chunk, base_position)?;
        let record_count = records.len() / RECORD_SIZE;
        let phases = ResolvePhase::sequence(self.config.resolver);
        self.dispatch_chunk(records, base_position, phases);
        let snapshot = self.read_bounds()?;
        tracing::debug!(
            records = record_count,
            base_position,
            cutoff_ms = snapshot.requested_cutoff_ms,
            max_timestamp_seen = snapshot.max_timestamp_seen,
            max_timestamp_used = snapshot.max_timestamp_used,
            "gpu chunk resolved"
        );
        Ok(snapshot)
    }

    fn resolve_chunk(
        &mut self,
        chunk: &[u8],
        base_position: u32,
    ) -> Result<ProgressSnapshot, Self::Error> {
        let records = checked_records(chunk, base_position)?;
        let phases = ResolvePhase::resolve_sequence(self.config.resolver.ordering);
        self.dispatch_chunk(records, base_position, phases);
        self.read_bounds()
    }

    fn composite_chunk(&mut self, chunk: &[u8], base_position: u32) -> Result<(), Self::Error> {
        let records = checked_records(chunk, base_position)?;
        self.dispatch_chunk(records, base_position, &[ResolvePhase::CompositeWinners]);
        Ok(())
    }

    fn clear_image(&mut self, rgba: [u8; 4]) -> Result<(), Self::Error> {
        self.fill_output(rgba);
        Ok(())
    }

    fn snapshot_image(&mut self) -> Result<RgbaImage, Self::Error> {
        self.read_image()
    }
}

/// Whole records of `chunk`, provided their positions fit the winner slots.
fn checked_records(chunk: &[u8], base_position: u32) -> Result<&[u8], GpuResolverError> {
    let record_count = chunk.len() / RECORD_SIZE;
    if !chunk_fits_positions(base_position, record_count) {
        return Err(GpuResolverError::PositionOverflow {
            base_position,
            record_count,
        });
    }
    Ok(&chunk[..record_count * RECORD_SIZE])
}

#[cfg(test)]
mod wgsl_tests;
