use model::CanvasSize;

use super::*;

#[test]
fn winner_table_keeps_highest_position() {
    let table = TileWinnerTable::new(CanvasSize::new(4, 4));
    let tile = 5;
    for position in [3u32, 9, 1, 7] {
        table.claim(tile, WinnerKey::new(ResolveOrdering::Position, position, 0));
    }
    assert_eq!(table.winning_position(tile), Some(9));
    assert_eq!(table.winning_position(0), None);
}

#[test]
fn winner_table_position_zero_is_distinct_from_empty() {
    let table = TileWinnerTable::new(CanvasSize::new(2, 2));
    let previous = table.claim(1, WinnerKey::new(ResolveOrdering::Position, 0, 0));
    assert_eq!(previous, EMPTY_SLOT);
    assert_eq!(table.winning_position(1), Some(0));
}

#[test]
fn timestamp_ordering_prefers_newer_record_over_higher_position() {
    let table = TileWinnerTable::new(CanvasSize::new(1, 1));
    let ordering = ResolveOrdering::TimestampThenPosition;
    table.claim(0, WinnerKey::new(ordering, 2, 900));
    table.claim(0, WinnerKey::new(ordering, 8, 100));
    assert_eq!(table.winning_position(0), Some(2));

    table.claim(0, WinnerKey::new(ordering, 3, 900));
    assert_eq!(table.winning_position(0), Some(3));
}

#[test]
fn winner_key_round_trips_large_positions() {
    let key = WinnerKey::new(
        ResolveOrdering::TimestampThenPosition,
        MAX_POSITION - 1,
        u32::MAX,
    );
    assert_eq!(key.position(), MAX_POSITION - 1);
}

#[test]
fn winner_table_reset_clears_every_slot() {
    let mut table = TileWinnerTable::new(CanvasSize::new(3, 3));
    for tile in 0..table.len() {
        table.claim(tile, WinnerKey::new(ResolveOrdering::Position, tile as u32, 0));
    }
    table.reset();
    assert!((0..table.len()).all(|tile| table.get(tile).is_none()));
}

#[test]
fn timestamp_table_reports_previous_value() {
    let mut table = TileTimestampTable::new(CanvasSize::new(1, 1));
    assert_eq!(table.raise(0, 50), 0);
    assert_eq!(table.raise(0, 20), 50);
    assert_eq!(table.get(0), 50);
    table.reset();
    assert_eq!(table.get(0), 0);
}

#[test]
fn progress_bounds_start_empty_and_track_maxima() {
    let bounds = ProgressBounds::new(200);
    assert_eq!(
        bounds.snapshot(),
        ProgressSnapshot {
            requested_cutoff_ms: 200,
            max_timestamp_seen: 0,
            max_timestamp_used: 0,
            max_position_used: None,
        }
    );

    bounds.observe_seen(500);
    bounds.observe_seen(100);
    bounds.observe_used(100, 0);
    let snapshot = bounds.snapshot();
    assert_eq!(snapshot.max_timestamp_seen, 500);
    assert_eq!(snapshot.max_timestamp_used, 100);
    assert_eq!(snapshot.max_position_used, Some(0));
    assert!(snapshot.is_consistent());
    assert!(!snapshot.chunk_exhausted());
}

#[test]
fn progress_bounds_reset_replaces_cutoff() {
    let mut bounds = ProgressBounds::new(10);
    bounds.observe_seen(10);
    bounds.observe_used(10, 4);
    bounds.reset(99);

    let snapshot = bounds.snapshot();
    assert_eq!(snapshot.requested_cutoff_ms, 99);
    assert_eq!(snapshot.max_position_used, None);
    assert!(bounds.admits(99));
    assert!(!bounds.admits(100));
}

#[test]
fn canvas_image_writes_and_normalizes_texels() {
    let mut image = CanvasImage::new(CanvasSize::new(3, 2), [0, 0, 0, 0]);
    let tile = CanvasSize::new(3, 2).tile_index(2, 1).expect("tile in canvas");
    image.write(tile, [255, 51, 0, 255]);

    assert_eq!(image.pixel(2, 1), Some([255, 51, 0, 255]));
    assert_eq!(image.pixel_normalized(2, 1), Some([1.0, 0.2, 0.0, 1.0]));
    assert_eq!(image.pixel(3, 0), None);

    let rgba = image.to_rgba_image();
    assert_eq!(rgba.dimensions(), (3, 2));
    assert_eq!(rgba.get_pixel(2, 1).0, [255, 51, 0, 255]);
    assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 0]);

    image.clear([9, 9, 9, 9]);
    assert_eq!(image.pixel(2, 1), Some([9, 9, 9, 9]));
}
