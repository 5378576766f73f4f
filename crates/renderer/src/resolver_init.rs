//! Device resource construction for [`GpuTileResolver`].

use model::{CanvasSize, DISPATCH_UNIT_BYTES, Palette, RECORD_SIZE, RECORDS_PER_DISPATCH_UNIT};
use wgpu::util::DeviceExt;

use crate::resolver_dispatch::ResolvePhase;
use crate::{
    GpuResolverConfig, GpuResolverError, GpuState, GpuTileResolver, INITIAL_RECORD_CAPACITY,
    ResolveBuffers, RunParamsGpu, WORKGROUP_SIZE,
};

pub(crate) const BOUNDS_BYTES: u64 = 16;

impl GpuTileResolver {
    /// Requests a default adapter and device without a surface.
    pub fn request_headless(
        config: GpuResolverConfig,
        palette: &Palette,
        background: [u8; 4],
    ) -> Result<Self, GpuResolverError> {
        let (device, queue) = pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await?;
            tracing::info!(adapter = ?adapter.get_info(), "gpu adapter selected");
            let limits = adapter.limits();
            let device_and_queue = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("renderer.tile_resolve"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                })
                .await?;
            Ok::<_, GpuResolverError>(device_and_queue)
        })?;
        Self::new(device, queue, config, palette, background)
    }

    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: GpuResolverConfig,
        palette: &Palette,
        background: [u8; 4],
    ) -> Result<Self, GpuResolverError> {
        config.resolver.validate()?;
        let canvas = config.resolver.canvas;
        let limits = device.limits();

        let texture_limit = limits.max_texture_dimension_2d;
        if u32::from(canvas.width) > texture_limit || u32::from(canvas.height) > texture_limit {
            return Err(GpuResolverError::CanvasExceedsTextureLimit {
                width: canvas.width,
                height: canvas.height,
                limit: texture_limit,
            });
        }
        let binding_limit = u64::from(limits.max_storage_buffer_binding_size);
        let table_bytes = tile_table_bytes(canvas);
        if table_bytes > binding_limit {
            return Err(GpuResolverError::TileTableExceedsBindingLimit {
                required: table_bytes,
                limit: binding_limit,
            });
        }

        let batch_limit = batch_record_limit(
            limits.max_compute_workgroups_per_dimension,
            binding_limit,
            config.max_records_per_batch,
        );
        let record_capacity = INITIAL_RECORD_CAPACITY.min(batch_limit);

        let bind_group_layout = create_bind_group_layout(&device);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("renderer.tile_resolve"),
            source: wgpu::ShaderSource::Wgsl(include_str!("tile_resolve.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer.tile_resolve.layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let pipelines = ResolvePhase::ALL
            .iter()
            .map(|phase| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(phase.label()),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(phase.entry_point()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
            })
            .collect();

        let buffers = ResolveBuffers {
            params: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("renderer.tile_resolve.params"),
                size: std::mem::size_of::<RunParamsGpu>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            records: create_record_buffer(&device, record_capacity),
            record_capacity,
            palette: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("renderer.tile_resolve.palette"),
                contents: bytemuck::cast_slice(&palette.to_packed_words()),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            }),
            winners: create_tile_table(&device, table_bytes, "renderer.tile_resolve.winners"),
            timestamps: create_tile_table(
                &device,
                table_bytes,
                "renderer.tile_resolve.timestamps",
            ),
            bounds: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("renderer.tile_resolve.bounds"),
                size: BOUNDS_BYTES,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            bounds_readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("renderer.tile_resolve.bounds_readback"),
                size: BOUNDS_BYTES,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }),
        };

        let output_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("renderer.tile_resolve.output"),
            size: canvas_extent(canvas),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let output_view = output_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = create_bind_group(&device, &bind_group_layout, &buffers, &output_view);

        tracing::debug!(
            width = canvas.width,
            height = canvas.height,
            batch_limit,
            "gpu tile resolver created"
        );

        let resolver = Self {
            gpu_state: GpuState { device, queue },
            config,
            batch_limit,
            bind_group_layout,
            pipelines,
            buffers,
            output_texture,
            output_view,
            bind_group,
            requested_cutoff_ms: 0,
        };
        resolver.fill_output(background);
        Ok(resolver)
    }

    /// Grows the record buffer to hold `records` and rebuilds the bind group.
    pub(crate) fn ensure_record_capacity(&mut self, records: usize) {
        if records <= self.buffers.record_capacity {
            return;
        }
        let capacity = records
            .max(self.buffers.record_capacity.saturating_mul(2))
            .min(self.batch_limit);
        debug_assert!(capacity >= records, "batch exceeds the record limit");
        self.buffers.records = create_record_buffer(&self.gpu_state.device, capacity);
        self.buffers.record_capacity = capacity;
        self.bind_group = create_bind_group(
            &self.gpu_state.device,
            &self.bind_group_layout,
            &self.buffers,
            &self.output_view,
        );
        tracing::debug!(capacity, "record buffer grown");
    }

    pub(crate) fn fill_output(&self, rgba: [u8; 4]) {
        let canvas = self.config.resolver.canvas;
        let texels = rgba.repeat(canvas.tile_count());
        self.gpu_state.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.output_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(u32::from(canvas.width) * 4),
                rows_per_image: Some(u32::from(canvas.height)),
            },
            canvas_extent(canvas),
        );
    }
}

/// Records per submission allowed by one dispatch dimension, the storage
/// binding size and the configured cap, rounded down to whole dispatch units.
pub(crate) fn batch_record_limit(
    max_workgroups_per_dimension: u32,
    max_storage_binding_bytes: u64,
    configured: Option<usize>,
) -> usize {
    let dispatch_lanes =
        u64::from(max_workgroups_per_dimension).saturating_mul(u64::from(WORKGROUP_SIZE));
    let storage_records =
        max_storage_binding_bytes / DISPATCH_UNIT_BYTES as u64 * RECORDS_PER_DISPATCH_UNIT as u64;
    let mut limit = dispatch_lanes.min(storage_records);
    if let Some(configured) = configured {
        limit = limit.min(configured as u64);
    }
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    (limit / RECORDS_PER_DISPATCH_UNIT).max(1) * RECORDS_PER_DISPATCH_UNIT
}

pub(crate) fn canvas_extent(canvas: CanvasSize) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: u32::from(canvas.width),
        height: u32::from(canvas.height),
        depth_or_array_layers: 1,
    }
}

fn tile_table_bytes(canvas: CanvasSize) -> u64 {
    canvas.tile_count() as u64 * std::mem::size_of::<u32>() as u64
}

fn create_record_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    debug_assert_eq!(capacity % RECORDS_PER_DISPATCH_UNIT, 0);
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("renderer.tile_resolve.records"),
        size: (capacity * RECORD_SIZE) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_tile_table(device: &wgpu::Device, size: u64, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("renderer.tile_resolve.bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, false),
            storage_entry(4, false),
            storage_entry(5, false),
            wgpu::BindGroupLayoutEntry {
                binding: 6,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
        ],
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffers: &ResolveBuffers,
    output_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("renderer.tile_resolve.bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffers.params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: buffers.records.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: buffers.palette.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: buffers.winners.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: buffers.timestamps.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: buffers.bounds.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: wgpu::BindingResource::TextureView(output_view),
            },
        ],
    })
}
