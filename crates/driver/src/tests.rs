use engine::{ChunkResolver, CpuTileResolver, ResolveOrdering, ResolverConfig};
use model::{CanvasSize, Palette, TilePlacement};
use replay_protocol::{Replay, ReplayWriter};

use crate::{DriverError, ReplayDriver};

const BACKGROUND: [u8; 4] = [255, 255, 255, 255];
const CANVAS: CanvasSize = CanvasSize::new(6, 5);

fn placement(x: u16, y: u16, color_index: u8, timestamp_ms: u32) -> TilePlacement {
    TilePlacement {
        x,
        y,
        color_index,
        timestamp_ms,
    }
}

/// Twenty records over a 6x5 canvas, timestamps 0, 5, 10, ... in log order,
/// with repeated tiles so later chunks overwrite earlier ones.
fn log() -> Vec<TilePlacement> {
    (0..20u16)
        .map(|index| {
            let tile = (index * 7) % 12;
            placement(tile % 6, tile / 6, (index % 4) as u8, u32::from(index) * 5)
        })
        .collect()
}

fn replay(records_per_chunk: u32) -> Replay {
    let mut writer = ReplayWriter::new(CANVAS, records_per_chunk);
    for index in 0..4u8 {
        writer
            .define_color(index, [index * 60, 0, 255 - index * 60, 255])
            .expect("define color");
    }
    for record in log() {
        writer.push(record);
    }
    writer.finish()
}

fn cpu_resolver(palette: Palette) -> CpuTileResolver {
    CpuTileResolver::new(ResolverConfig::new(CANVAS), palette, BACKGROUND)
        .expect("create cpu resolver")
}

fn driver(records_per_chunk: u32) -> ReplayDriver<CpuTileResolver> {
    let replay = replay(records_per_chunk);
    let resolver = cpu_resolver(replay.manifest.palette());
    ReplayDriver::new(resolver, replay, BACKGROUND).expect("create driver")
}

/// Renders the whole log as one chunk.
fn reference_image(cutoff_ms: u32) -> image::RgbaImage {
    let replay = replay(u32::MAX);
    let mut resolver = cpu_resolver(replay.manifest.palette());
    resolver.reset(cutoff_ms).expect("reset");
    resolver
        .run_chunk(&replay.placements, 0)
        .expect("run whole log");
    resolver.snapshot_image().expect("snapshot")
}

#[test]
fn chunked_advance_matches_rendering_the_whole_prefix() {
    let mut driver = driver(4);
    for cutoff_ms in [0, 12, 30, 31, 64, 95, 200] {
        driver.advance_to(cutoff_ms).expect("advance");
        assert_eq!(
            driver.snapshot_image().expect("snapshot"),
            reference_image(cutoff_ms),
            "cutoff {cutoff_ms}"
        );
    }
    assert!(driver.is_caught_up());
    assert_eq!(driver.next_cutoff_hint(), None);
}

#[test]
fn partial_chunk_is_rerun_on_the_next_advance() {
    let mut driver = driver(4);

    // chunk 0 holds timestamps 0..=15, chunk 1 holds 20..=35
    let report = driver.advance_to(27).expect("advance to 27");
    assert_eq!(report.chunks_run, 2);
    assert_eq!(report.chunks_completed, 1);
    let bounds = report.last_bounds.expect("chunk 1 ran");
    assert_eq!(bounds.max_timestamp_seen, 35);
    assert_eq!(bounds.max_timestamp_used, 25);
    assert_eq!(bounds.max_position_used, Some(5));
    assert_eq!(driver.next_cutoff_hint(), Some(35));

    let report = driver.advance_to(35).expect("advance to 35");
    assert_eq!(report.chunks_run, 2, "chunk 1 again, then chunk 2");
    assert_eq!(report.chunks_completed, 2);
    assert!(!report.restarted);
}

#[test]
fn repeating_a_cutoff_runs_nothing() {
    let mut driver = driver(4);
    driver.advance_to(42).expect("advance");
    let report = driver.advance_to(42).expect("repeat");
    assert_eq!(report.chunks_run, 0);
    assert_eq!(report.chunks_completed, 2);
}

#[test]
fn lower_cutoff_restarts_from_a_cleared_image() {
    let mut driver = driver(3);
    driver.advance_to(90).expect("advance far");
    let report = driver.advance_to(10).expect("rewind");
    assert!(report.restarted);
    // chunk 0 (timestamps 0..=10) completes again, chunk 1 (15..=25) is partial
    assert_eq!(report.chunks_completed, 1);
    assert_eq!(driver.next_cutoff_hint(), Some(25));
    assert_eq!(
        driver.snapshot_image().expect("snapshot"),
        reference_image(10)
    );
}

#[test]
fn cutoff_before_the_first_record_leaves_the_background() {
    let mut writer = ReplayWriter::new(CANVAS, 4);
    writer.define_color(0, [1, 2, 3, 255]).expect("define color");
    writer.push(placement(0, 0, 0, 100));
    let replay = writer.finish();
    let resolver = cpu_resolver(replay.manifest.palette());
    let mut driver = ReplayDriver::new(resolver, replay, BACKGROUND).expect("create driver");

    let report = driver.advance_to(50).expect("advance");
    let bounds = report.last_bounds.expect("chunk ran");
    assert_eq!(bounds.max_timestamp_seen, 100);
    assert_eq!(bounds.max_position_used, None);
    assert_eq!(driver.next_cutoff_hint(), Some(100));
    let image = driver.snapshot_image().expect("snapshot");
    assert!(image.pixels().all(|pixel| pixel.0 == BACKGROUND));
}

#[test]
fn canvas_mismatch_is_rejected() {
    let replay = replay(4);
    let resolver = CpuTileResolver::new(
        ResolverConfig::new(CanvasSize::new(3, 3)),
        replay.manifest.palette(),
        BACKGROUND,
    )
    .expect("create cpu resolver");
    let result = ReplayDriver::new(resolver, replay, BACKGROUND);
    assert!(matches!(
        result,
        Err(DriverError::CanvasMismatch {
            replay: CANVAS,
            ..
        })
    ));
}

/// One record per chunk, the newest record first.
fn out_of_order_replay() -> Replay {
    let mut writer = ReplayWriter::new(CANVAS, 1);
    writer.define_color(0, [10, 0, 0, 255]).expect("define color");
    writer.define_color(1, [20, 0, 0, 255]).expect("define color");
    writer.push(placement(0, 0, 0, 800));
    writer.push(placement(0, 0, 1, 300));
    writer.push(placement(1, 0, 1, 300));
    writer.finish()
}

fn timestamp_resolver(palette: Palette) -> CpuTileResolver {
    let mut config = ResolverConfig::new(CANVAS);
    config.ordering = ResolveOrdering::TimestampThenPosition;
    CpuTileResolver::new(config, palette, BACKGROUND).expect("create cpu resolver")
}

#[test]
fn timestamp_ordering_matches_the_whole_log_across_chunks() {
    let replay = out_of_order_replay();
    let mut whole = timestamp_resolver(replay.manifest.palette());
    whole.reset(1000).expect("reset");
    whole.run_chunk(&replay.placements, 0).expect("run whole log");
    let expected = whole.snapshot_image().expect("snapshot");

    let resolver = timestamp_resolver(replay.manifest.palette());
    let mut driver = ReplayDriver::new(resolver, replay, BACKGROUND).expect("create driver");
    let report = driver.advance_to(1000).expect("advance");
    assert_eq!(report.chunks_run, 3);
    assert_eq!(report.chunks_completed, 3);
    assert!(driver.is_caught_up());

    let image = driver.snapshot_image().expect("snapshot");
    assert_eq!(image, expected);
    assert_eq!(image.get_pixel(0, 0).0, [10, 0, 0, 255]);
}

#[test]
fn future_record_does_not_hold_back_later_chunks() {
    let replay = out_of_order_replay();
    let resolver = timestamp_resolver(replay.manifest.palette());
    let mut driver = ReplayDriver::new(resolver, replay, BACKGROUND).expect("create driver");

    let report = driver.advance_to(500).expect("advance");
    assert_eq!(report.chunks_completed, 0);
    assert_eq!(driver.next_cutoff_hint(), Some(800));
    let image = driver.snapshot_image().expect("snapshot");
    assert_eq!(image.get_pixel(0, 0).0, [20, 0, 0, 255]);
    assert_eq!(image.get_pixel(1, 0).0, [20, 0, 0, 255]);

    driver.advance_to(900).expect("advance past every record");
    let image = driver.snapshot_image().expect("snapshot");
    assert_eq!(image.get_pixel(0, 0).0, [10, 0, 0, 255]);
    assert_eq!(image.get_pixel(1, 0).0, [20, 0, 0, 255]);
    assert_eq!(driver.next_cutoff_hint(), None);
}
