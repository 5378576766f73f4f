use std::collections::BTreeMap;

pub const PALETTE_LEN: usize = 256;

/// RGBA8 color table indexed directly by a record's color index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Box<[[u8; 4]; PALETTE_LEN]>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            entries: Box::new([[0; 4]; PALETTE_LEN]),
        }
    }
}

impl Palette {
    /// Dense palette; entries past `colors.len()` stay transparent black.
    pub fn from_colors(colors: &[[u8; 4]]) -> Self {
        assert!(
            colors.len() <= PALETTE_LEN,
            "palette has {} colors, at most {PALETTE_LEN} fit",
            colors.len()
        );
        let mut palette = Self::default();
        palette.entries[..colors.len()].copy_from_slice(colors);
        palette
    }

    pub fn from_map(colors: &BTreeMap<u8, [u8; 4]>) -> Self {
        let mut palette = Self::default();
        for (&index, &rgba) in colors {
            palette.entries[index as usize] = rgba;
        }
        palette
    }

    pub fn set(&mut self, index: u8, rgba: [u8; 4]) {
        self.entries[index as usize] = rgba;
    }

    pub fn color(&self, index: u8) -> [u8; 4] {
        self.entries[index as usize]
    }

    pub fn normalized(&self, index: u8) -> [f32; 4] {
        self.color(index).map(|channel| channel as f32 / 255.0)
    }

    /// One little-endian RGBA8 word per entry.
    pub fn to_packed_words(&self) -> Vec<u32> {
        self.entries.iter().map(|rgba| u32::from_le_bytes(*rgba)).collect()
    }
}
