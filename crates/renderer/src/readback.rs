use image::RgbaImage;
use tiles::ProgressSnapshot;

use crate::resolver_init::{BOUNDS_BYTES, canvas_extent};
use crate::{GpuResolverError, GpuTileResolver};

impl GpuTileResolver {
    /// Waits for queued work and returns the bounds of the current run.
    pub fn read_bounds(&self) -> Result<ProgressSnapshot, GpuResolverError> {
        let mut encoder =
            self.gpu_state
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("renderer.tile_resolve.bounds_readback"),
                });
        encoder.copy_buffer_to_buffer(
            &self.buffers.bounds,
            0,
            &self.buffers.bounds_readback,
            0,
            BOUNDS_BYTES,
        );
        self.gpu_state.queue.submit(Some(encoder.finish()));

        let [seen, used, position_plus_one, _] =
            read_mapped(&self.gpu_state.device, &self.buffers.bounds_readback, |bytes| {
                bytemuck::pod_read_unaligned::<[u32; 4]>(&bytes[..BOUNDS_BYTES as usize])
            })?;
        Ok(ProgressSnapshot::from_raw(
            self.requested_cutoff_ms,
            seen,
            used,
            position_plus_one,
        ))
    }

    /// Copies the output texture into a host image.
    pub fn read_image(&self) -> Result<RgbaImage, GpuResolverError> {
        let extent = canvas_extent(self.config.resolver.canvas);
        let unpadded_bytes_per_row = extent.width * 4;
        let padded_bytes_per_row = unpadded_bytes_per_row
            .div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let readback = self
            .gpu_state
            .device
            .create_buffer(&wgpu::BufferDescriptor {
                label: Some("renderer.tile_resolve.image_readback"),
                size: u64::from(padded_bytes_per_row) * u64::from(extent.height),
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });

        let mut encoder =
            self.gpu_state
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("renderer.tile_resolve.image_readback"),
                });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.output_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(extent.height),
                },
            },
            extent,
        );
        self.gpu_state.queue.submit(Some(encoder.finish()));

        let texels = read_mapped(&self.gpu_state.device, &readback, |bytes| {
            strip_row_padding(
                bytes,
                unpadded_bytes_per_row as usize,
                padded_bytes_per_row as usize,
                extent.height as usize,
            )
        })?;
        Ok(RgbaImage::from_raw(extent.width, extent.height, texels)
            .expect("readback holds one texel per tile"))
    }
}

/// Drops the per-row alignment padding of a texture copy.
pub(crate) fn strip_row_padding(
    bytes: &[u8],
    row_bytes: usize,
    padded_row_bytes: usize,
    rows: usize,
) -> Vec<u8> {
    debug_assert!(row_bytes <= padded_row_bytes);
    let mut texels = Vec::with_capacity(row_bytes * rows);
    for row in bytes.chunks(padded_row_bytes).take(rows) {
        texels.extend_from_slice(&row[..row_bytes]);
    }
    texels
}

fn read_mapped<T>(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    read: impl FnOnce(&[u8]) -> T,
) -> Result<T, GpuResolverError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::PollType::wait_indefinitely())?;
    receiver
        .recv()
        .map_err(|_| GpuResolverError::MapCallbackDropped)??;

    let mapped = slice.get_mapped_range();
    let value = read(&mapped);
    drop(mapped);
    buffer.unmap();
    Ok(value)
}
