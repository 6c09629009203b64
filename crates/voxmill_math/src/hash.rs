//! Spatial hashing for positions.
//!
//! Chunk maps and vertex lookup tables are keyed by 3-component vectors, so
//! they use a cheap 3-prime XOR hash instead of a general purpose one.

use std::hash::{BuildHasherDefault, Hasher};

use glam::IVec3;

pub const PRIME_X: u64 = 73_856_093;
pub const PRIME_Y: u64 = 19_349_663;
pub const PRIME_Z: u64 = 83_492_791;

/// Hashes an integer position with the 3-prime XOR scheme.
#[inline]
pub fn hash_ivec3(v: IVec3) -> u64 {
    (v.x as i64 as u64).wrapping_mul(PRIME_X)
        ^ (v.y as i64 as u64).wrapping_mul(PRIME_Y)
        ^ (v.z as i64 as u64).wrapping_mul(PRIME_Z)
}

/// Combines three already-computed component hashes.
#[inline]
pub fn combine3(a: u64, b: u64, c: u64) -> u64 {
    a.wrapping_mul(PRIME_X) ^ b.wrapping_mul(PRIME_Y) ^ c.wrapping_mul(PRIME_Z)
}

/// A [`Hasher`] that interprets its input as up to three `i32` components and
/// mixes them with the prime scheme. [`IVec3`]'s `Hash` impl feeds exactly
/// three `i32`s, which makes maps keyed by chunk origins cheap.
#[derive(Default)]
pub struct PositionHasher {
    components: [u32; 3],
    len: usize,
}

/// `BuildHasher` for maps keyed by integer positions.
pub type PositionHash = BuildHasherDefault<PositionHasher>;

impl Hasher for PositionHasher {
    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks_exact(4) {
            if self.len < 3 {
                self.components[self.len] =
                    u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                self.len += 1;
            }
        }
    }

    fn finish(&self) -> u64 {
        combine3(
            self.components[0] as u64,
            self.components[1] as u64,
            self.components[2] as u64,
        )
    }
}
