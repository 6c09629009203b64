//! Sparse chunked voxel storage and the scene data model.
//!
//! A [`VoxelModel`] owns a [`VoxelSpace`] — a map from chunk origins to dense
//! 16³ [`Chunk`]s of 4-byte [`Voxel`] cells — plus its material table and
//! color palettes. [`SceneNode`]s arrange models (and frame sequences of
//! models) into a tree with per-node transforms.
//!
//! Face visibility is tracked per voxel as a 6-bit mask and maintained by
//! [`VisibilityAnalyzer`], either as a full pass over dirty chunks or as an
//! incremental update around a single edit.

pub mod chunk;
pub mod color;
pub mod material;
pub mod model;
pub mod scene;
pub mod space;
pub mod texture;
pub mod visibility;
pub mod voxel;

pub use chunk::{Chunk, CHUNK_AREA, CHUNK_SIZE, CHUNK_VOLUME, ROW_MASK};
pub use color::Color;
pub use material::{Material, MaterialRef};
pub use model::VoxelModel;
pub use scene::{SceneNode, VoxelAnimation, VoxelScene};
pub use space::{ChunkMeta, VoxelSpace};
pub use texture::{Texture, TextureType};
pub use visibility::VisibilityAnalyzer;
pub use voxel::{Direction, Visibility, Voxel};
