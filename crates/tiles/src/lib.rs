//! Mutable scratch state shared by the resolve and composite passes.
//!
//! Every structure here is an arena of atomics sized to the canvas. Passes only
//! ever raise values with atomic maximum or overwrite whole slots, so they can
//! run fully in parallel without locks. Nothing resets implicitly: callers
//! reinitialize the scratch before each independent chunk/cutoff run.

mod bounds;
mod canvas_image;
mod winner;

pub use bounds::{ProgressBounds, ProgressSnapshot};
pub use canvas_image::CanvasImage;
pub use winner::{
    EMPTY_SLOT, MAX_POSITION, ResolveOrdering, TileTimestampTable, TileWinnerTable, WinnerKey,
};

#[cfg(test)]
mod tests;
