//! Math primitives shared by the voxel and meshing crates.
//!
//! Vector and matrix types come from [`glam`]; this crate adds the pieces the
//! voxel pipeline needs on top of them: spatial hashing for chunk maps,
//! integer bounding boxes, view frustums and transform helpers.

pub mod bbox;
pub mod frustum;
pub mod hash;
pub mod transform;

pub use bbox::BBox;
pub use frustum::{Frustum, Plane};
pub use hash::{hash_ivec3, PositionHash, PositionHasher};

pub use glam::{IVec2, IVec3, Mat4, Quat, Vec2, Vec3, Vec4};
