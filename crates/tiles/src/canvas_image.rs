use std::sync::atomic::{AtomicU32, Ordering};

use image::{Rgba, RgbaImage};
use model::CanvasSize;

/// Output image with one RGBA8 texel per tile.
///
/// Texels are stored as packed little-endian words so concurrent writers never
/// tear a pixel, matching an `rgba8unorm` storage texture.
#[derive(Debug)]
pub struct CanvasImage {
    canvas: CanvasSize,
    texels: Box<[AtomicU32]>,
}

impl CanvasImage {
    pub fn new(canvas: CanvasSize, background: [u8; 4]) -> Self {
        let packed = u32::from_le_bytes(background);
        let texels = (0..canvas.tile_count())
            .map(|_| AtomicU32::new(packed))
            .collect();
        Self { canvas, texels }
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn write(&self, tile: usize, rgba: [u8; 4]) {
        self.texels[tile].store(u32::from_le_bytes(rgba), Ordering::Relaxed);
    }

    pub fn clear(&mut self, rgba: [u8; 4]) {
        let packed = u32::from_le_bytes(rgba);
        for texel in self.texels.iter_mut() {
            *texel.get_mut() = packed;
        }
    }

    pub fn pixel(&self, x: u16, y: u16) -> Option<[u8; 4]> {
        let tile = self.canvas.tile_index(x, y)?;
        Some(self.texels[tile].load(Ordering::Relaxed).to_le_bytes())
    }

    /// Channels scaled to `[0, 1]` (`channel / 255`).
    pub fn pixel_normalized(&self, x: u16, y: u16) -> Option<[f32; 4]> {
        self.pixel(x, y)
            .map(|rgba| rgba.map(|channel| channel as f32 / 255.0))
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        let width = u32::from(self.canvas.width);
        RgbaImage::from_fn(width, u32::from(self.canvas.height), |x, y| {
            let tile = (x + y * width) as usize;
            Rgba(self.texels[tile].load(Ordering::Relaxed).to_le_bytes())
        })
    }
}
