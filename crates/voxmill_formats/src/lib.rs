//! Voxel file format codecs.
//!
//! Importers parse third-party voxel files into [`VoxelScene`]s; the
//! editor-native [`vedit`] format also saves, round-tripping voxels,
//! materials, palettes and the scene tree. All importers convert into one
//! coordinate convention (right-handed, y-up, z-forward) at this boundary;
//! nothing downstream swaps axes again.

pub mod error;
pub mod goxel;
pub mod kenshape;
pub mod magicavoxel;
pub mod qubicle;
pub mod registry;
pub mod stream;
pub mod vedit;

pub use error::{Error, Result};
pub use registry::FormatKind;

use voxmill_voxel::VoxelScene;

/// A voxel file codec.
///
/// `load` parses a whole file image; `save` serializes a scene and is only
/// supported by the editor-native format.
pub trait VoxelFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene>;

    fn save(&mut self, _scene: &VoxelScene) -> Result<Vec<u8>> {
        Err(Error::InvalidArgument(
            "this format does not support saving".into(),
        ))
    }
}
