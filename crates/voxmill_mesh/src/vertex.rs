//! The vertex layout shared by all surfaces.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use voxmill_math::hash::{combine3, PRIME_X, PRIME_Y};

/// One mesh vertex. `#[repr(C)]` and [`Pod`] so exporters can write vertex
/// buffers as raw interleaved bytes (position, normal, uv, uv2 in order).
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub pos: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub uv2: Vec2,
}

impl Vertex {
    pub fn new(pos: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            pos,
            normal,
            uv,
            uv2: Vec2::ZERO,
        }
    }

    /// The dedup hash over `(pos, normal, uv)`; `uv2` does not participate.
    pub fn dedup_hash(&self) -> u64 {
        let pos = hash_vec3(self.pos);
        let normal = hash_vec3(self.normal);
        let uv = hash_vec2(self.uv);
        combine3(pos, normal, uv)
    }

    /// The dedup identity over `(pos, normal, uv)` as raw float bits.
    pub fn dedup_key(&self) -> [u32; 8] {
        [
            self.pos.x.to_bits(),
            self.pos.y.to_bits(),
            self.pos.z.to_bits(),
            self.normal.x.to_bits(),
            self.normal.y.to_bits(),
            self.normal.z.to_bits(),
            self.uv.x.to_bits(),
            self.uv.y.to_bits(),
        ]
    }
}

#[inline]
fn hash_vec3(v: Vec3) -> u64 {
    combine3(v.x.to_bits() as u64, v.y.to_bits() as u64, v.z.to_bits() as u64)
}

#[inline]
fn hash_vec2(v: Vec2) -> u64 {
    (v.x.to_bits() as u64).wrapping_mul(PRIME_X) ^ (v.y.to_bits() as u64).wrapping_mul(PRIME_Y)
}
