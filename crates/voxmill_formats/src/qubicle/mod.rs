//! The Qubicle format family: binary `.qb`, binary tree `.qbt`, exchange
//! `.qef` and project `.qbcl`.

mod binary;
mod exchange;
mod project;
mod tree;

pub use binary::QubicleBinaryFormat;
pub use exchange::QubicleExchangeFormat;
pub use project::QubicleProjectFormat;
pub use tree::QubicleTreeFormat;

use std::collections::HashMap;

use voxmill_voxel::{Color, Texture};

/// Deduplicates colors into a one-row palette. Fully transparent pixels are
/// empty space; everything else is forced opaque.
#[derive(Default)]
pub(crate) struct PaletteBuilder {
    columns: HashMap<u32, u8>,
    pub palette: Texture,
}

impl PaletteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The palette column for `color`, or `None` for empty space.
    pub fn column(&mut self, mut color: Color) -> Option<u8> {
        if color.a == 0 {
            return None;
        }
        color.a = 255;

        let packed = color.as_rgba();
        match self.columns.get(&packed) {
            Some(&column) => Some(column),
            None => {
                let column = self.palette.add_pixel(color) as u8;
                self.columns.insert(packed, column);
                Some(column)
            }
        }
    }
}
