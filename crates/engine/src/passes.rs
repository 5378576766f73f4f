use model::{Palette, RecordSource, TilePlacement};
use rayon::prelude::*;
use tiles::{CanvasImage, ProgressBounds, TileTimestampTable, TileWinnerTable, WinnerKey};

use crate::{RunParams, chunk_fits_positions};

/// Decodes lane `index`. Lanes past the log and padding records are inactive.
///
/// Records off the canvas stay active: they count towards the progress bounds
/// and only skip the tile lookup.
fn decode_lane<S: RecordSource>(source: &S, index: usize) -> Option<TilePlacement> {
    if index >= source.len() {
        return None;
    }
    let placement = source.decode(index);
    (!placement.is_padding()).then_some(placement)
}

fn lane_position(params: RunParams, index: usize) -> u32 {
    let offset = u32::try_from(index).expect("lane index exceeds u32");
    params
        .base_position
        .checked_add(offset)
        .expect("record position overflow")
}

fn assert_positions_fit<S: RecordSource>(source: &S, params: RunParams) {
    assert!(
        chunk_fits_positions(params.base_position, source.len()),
        "{} records at position {} exceed the position range",
        source.len(),
        params.base_position
    );
}

/// Claims, per tile, the highest-ranked record admitted by the cutoff.
///
/// Every non-padding record raises `max_timestamp_seen`; only admitted ones
/// raise the `used` bounds, and only admitted records on the canvas claim a
/// tile.
///
/// # Panics
///
/// If a record position would reach [`tiles::MAX_POSITION`]; see
/// [`chunk_fits_positions`].
pub fn resolve_winners<S: RecordSource>(
    source: &S,
    params: RunParams,
    winners: &TileWinnerTable,
    bounds: &ProgressBounds,
) {
    debug_assert_eq!(bounds.requested_cutoff_ms(), params.cutoff_ms);
    assert_positions_fit(source, params);
    let canvas = winners.canvas();
    let _span = tracing::debug_span!(
        "resolve_winners",
        records = source.len(),
        base_position = params.base_position
    )
    .entered();

    (0..source.len()).into_par_iter().for_each(|index| {
        let Some(placement) = decode_lane(source, index) else {
            return;
        };
        bounds.observe_seen(placement.timestamp_ms);
        if placement.timestamp_ms > params.cutoff_ms {
            return;
        }
        let position = lane_position(params, index);
        bounds.observe_used(placement.timestamp_ms, position);
        let Some(tile) = canvas.tile_index(placement.x, placement.y) else {
            return;
        };
        winners.claim(
            tile,
            WinnerKey::new(params.ordering, position, placement.timestamp_ms),
        );
    });
}

/// Writes each tile's color from the single record that won it.
///
/// Must only run once [`resolve_winners`] has returned for the whole chunk.
/// Panics under the same condition as [`resolve_winners`].
pub fn composite_winners<S: RecordSource>(
    source: &S,
    params: RunParams,
    winners: &TileWinnerTable,
    palette: &Palette,
    image: &CanvasImage,
) {
    let canvas = winners.canvas();
    debug_assert_eq!(canvas, image.canvas());
    assert_positions_fit(source, params);
    let _span = tracing::debug_span!(
        "composite_winners",
        records = source.len(),
        base_position = params.base_position
    )
    .entered();

    (0..source.len()).into_par_iter().for_each(|index| {
        let Some(placement) = decode_lane(source, index) else {
            return;
        };
        if placement.timestamp_ms > params.cutoff_ms {
            return;
        }
        let Some(tile) = canvas.tile_index(placement.x, placement.y) else {
            return;
        };
        let own_key = WinnerKey::new(
            params.ordering,
            lane_position(params, index),
            placement.timestamp_ms,
        );
        if winners.get(tile) != Some(own_key) {
            return;
        }
        image.write(tile, palette.color(placement.color_index));
    });
}

/// Resolves and composites in one pass by racing on a per-tile timestamp.
///
/// A lane writes when no other lane has claimed a strictly newer timestamp for
/// its tile. Two lanes with equal timestamps can both write, so the final color
/// of such a tile depends on scheduling. Panics under the same condition as
/// [`resolve_winners`].
pub fn single_pass_update<S: RecordSource>(
    source: &S,
    params: RunParams,
    timestamps: &TileTimestampTable,
    bounds: &ProgressBounds,
    palette: &Palette,
    image: &CanvasImage,
) {
    let canvas = image.canvas();
    assert_positions_fit(source, params);
    let _span = tracing::debug_span!(
        "single_pass_update",
        records = source.len(),
        base_position = params.base_position
    )
    .entered();

    (0..source.len()).into_par_iter().for_each(|index| {
        let Some(placement) = decode_lane(source, index) else {
            return;
        };
        bounds.observe_seen(placement.timestamp_ms);
        if placement.timestamp_ms > params.cutoff_ms {
            return;
        }
        bounds.observe_used(placement.timestamp_ms, lane_position(params, index));
        let Some(tile) = canvas.tile_index(placement.x, placement.y) else {
            return;
        };
        let previous = timestamps.raise(tile, placement.timestamp_ms);
        if previous <= placement.timestamp_ms {
            image.write(tile, palette.color(placement.color_index));
        }
    });
}
