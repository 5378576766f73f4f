use anyhow::{Context, Result};
use driver::ReplayDriver;
use engine::{ChunkResolver, CpuTileResolver, ResolverConfig};
use image::RgbaImage;
use renderer::{GpuResolverConfig, GpuTileResolver};
use replay_protocol::Replay;

use crate::cli::{Backend, RenderArgs};

pub fn run(args: RenderArgs) -> Result<()> {
    let replay = Replay::load(&args.replay)
        .with_context(|| format!("load replay {}", args.replay.display()))?;
    let cutoff_ms = args
        .cutoff_ms
        .or_else(|| replay.manifest.last_timestamp_ms())
        .unwrap_or(0);
    let config = ResolverConfig {
        canvas: replay.manifest.canvas_size(),
        ordering: args.ordering.into(),
        mode: args.mode.into(),
    };
    let palette = replay.manifest.palette();

    let image = match args.backend {
        Backend::Cpu => {
            let resolver = CpuTileResolver::new(config, palette, args.background)?;
            render_with(resolver, replay, cutoff_ms, args.background)?
        }
        Backend::Gpu => {
            let gpu_config = GpuResolverConfig {
                resolver: config,
                max_records_per_batch: args.max_records_per_batch,
            };
            let resolver = GpuTileResolver::request_headless(gpu_config, &palette, args.background)
                .context("create GPU resolver")?;
            render_with(resolver, replay, cutoff_ms, args.background)?
        }
    };

    image
        .save(&args.out)
        .with_context(|| format!("write {}", args.out.display()))?;
    tracing::info!(out = %args.out.display(), cutoff_ms, "image written");
    Ok(())
}

pub fn render_with<R: ChunkResolver>(
    resolver: R,
    replay: Replay,
    cutoff_ms: u32,
    background: [u8; 4],
) -> Result<RgbaImage> {
    let mut driver = ReplayDriver::new(resolver, replay, background)?;
    let report = driver.advance_to(cutoff_ms)?;
    if let Some(next_cutoff_ms) = driver.next_cutoff_hint() {
        tracing::info!(
            chunks_completed = report.chunks_completed,
            next_cutoff_ms,
            "replay continues past the cutoff"
        );
    }
    Ok(driver.snapshot_image()?)
}
