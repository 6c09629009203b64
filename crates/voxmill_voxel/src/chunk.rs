//! Dense fixed-size voxel chunks.

use std::sync::atomic::{AtomicBool, Ordering};

use glam::IVec3;
use voxmill_math::BBox;

use crate::{Visibility, Voxel};

/// Chunk edge length. Any power of two works; 16 keeps a chunk at 16 KiB.
pub const CHUNK_SIZE: i32 = 16;
pub const CHUNK_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;
pub const CHUNK_VOLUME: usize = CHUNK_AREA * CHUNK_SIZE as usize;

/// All bits of one occupancy row.
pub const ROW_MASK: u32 = (1 << CHUNK_SIZE) - 1;

/// A dense cube of voxel cells.
///
/// Cells are addressed by chunk-relative offsets, never by pointer, so the
/// chunk can move freely inside its map. Besides the cells the chunk keeps:
///
/// * the tight *inner* bounding box of instantiated cells (chunk-relative,
///   half-open),
/// * a dirty flag (atomic, so meshing tasks holding `&Chunk` can race-free be
///   marked processed),
/// * per-axis packed occupancy rows: for axis `a` the row addressed by the
///   two other coordinates holds one bit per cell along `a`.
pub struct Chunk {
    cells: Box<[Voxel; CHUNK_VOLUME]>,
    rows: Box<[[u32; CHUNK_AREA]; 3]>,
    inner: BBox,
    len: u32,
    stale_inner: bool,
    dirty: AtomicBool,
}

#[inline]
fn cell_index(rel: IVec3) -> usize {
    debug_assert!(
        rel.x >= 0 && rel.x < CHUNK_SIZE && rel.y >= 0 && rel.y < CHUNK_SIZE && rel.z >= 0 && rel.z < CHUNK_SIZE,
        "offset out of chunk bounds: {rel:?}"
    );
    (rel.x + CHUNK_SIZE * rel.y + CHUNK_SIZE * CHUNK_SIZE * rel.z) as usize
}

/// Splits a relative position into the bit index along `axis` and the row
/// index formed by the two other coordinates.
#[inline]
fn row_index(axis: usize, rel: IVec3) -> (usize, usize) {
    let axis1 = (axis + 1) % 3;
    let axis2 = (axis + 2) % 3;
    let row = rel[axis1] * CHUNK_SIZE + rel[axis2];
    (rel[axis] as usize, row as usize)
}

impl Chunk {
    pub fn new() -> Self {
        let cells: Box<[Voxel; CHUNK_VOLUME]> = vec![Voxel::EMPTY; CHUNK_VOLUME]
            .into_boxed_slice()
            .try_into()
            .expect("chunk cell buffer has a fixed size");
        Self {
            cells,
            rows: Box::new([[0; CHUNK_AREA]; 3]),
            inner: BBox::default(),
            len: 0,
            stale_inner: false,
            dirty: AtomicBool::new(false),
        }
    }

    /// Number of instantiated cells.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes a cell, overwriting whatever was there. Returns `true` if the
    /// cell was previously empty.
    pub fn insert(&mut self, rel: IVec3, voxel: Voxel) -> bool {
        debug_assert!(voxel.is_instantiated());

        let idx = cell_index(rel);
        let was_empty = !self.cells[idx].is_instantiated();
        self.cells[idx] = voxel;

        if was_empty {
            self.len += 1;
            for axis in 0..3 {
                let (bit, row) = row_index(axis, rel);
                self.rows[axis][row] |= 1 << bit;
            }
        }

        self.inner.expand(rel);
        self.dirty.store(true, Ordering::Relaxed);
        was_empty
    }

    /// Zeroes a cell. Returns `true` if a voxel was removed.
    ///
    /// O(1): the inner bounding box is only reset when the chunk runs empty;
    /// otherwise it is flagged stale and tightened by the next
    /// [`shrink`](Chunk::shrink) pass.
    pub fn erase(&mut self, rel: IVec3) -> bool {
        let idx = cell_index(rel);
        if !self.cells[idx].is_instantiated() {
            return false;
        }

        self.cells[idx] = Voxel::EMPTY;
        self.len -= 1;
        for axis in 0..3 {
            let (bit, row) = row_index(axis, rel);
            self.rows[axis][row] &= !(1 << bit);
        }

        if self.len == 0 {
            self.inner = BBox::default();
            self.stale_inner = false;
        } else {
            self.stale_inner = true;
        }

        self.dirty.store(true, Ordering::Relaxed);
        true
    }

    /// Recomputes the inner bounding box if erases left it loose.
    pub fn shrink(&mut self) {
        if !self.stale_inner {
            return;
        }
        self.stale_inner = false;

        let mut inner = BBox::default();
        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let rel = IVec3::new(x, y, z);
                    if self.cells[cell_index(rel)].is_instantiated() {
                        inner.expand(rel);
                    }
                }
            }
        }
        self.inner = inner;
    }

    #[inline]
    pub fn get(&self, rel: IVec3) -> &Voxel {
        &self.cells[cell_index(rel)]
    }

    #[inline]
    pub fn get_mut(&mut self, rel: IVec3) -> &mut Voxel {
        &mut self.cells[cell_index(rel)]
    }

    /// The instantiated cell at `rel`, if any.
    #[inline]
    pub fn find(&self, rel: IVec3) -> Option<&Voxel> {
        let voxel = self.get(rel);
        voxel.is_instantiated().then(|| voxel)
    }

    /// As [`find`](Chunk::find), filtered on the transparency class:
    /// `opaque = true` yields only opaque cells, `false` only transparent.
    #[inline]
    pub fn find_filtered(&self, rel: IVec3, opaque: bool) -> Option<&Voxel> {
        self.find(rel).filter(|v| v.is_transparent() != opaque)
    }

    /// As [`find`](Chunk::find), restricted to visible cells.
    #[inline]
    pub fn find_visible(&self, rel: IVec3) -> Option<&Voxel> {
        self.find(rel).filter(|v| v.is_visible())
    }

    #[inline]
    pub fn find_visible_filtered(&self, rel: IVec3, opaque: bool) -> Option<&Voxel> {
        self.find_visible(rel).filter(|v| v.is_transparent() != opaque)
    }

    /// The chunk-relative inner bounding box. Tight unless erases happened
    /// since the last [`shrink`](Chunk::shrink).
    #[inline]
    pub fn inner_bbox(&self) -> BBox {
        self.inner
    }

    /// One occupancy row: bit `k` is set iff the cell at offset `k` along
    /// `axis` (at row coordinates `i1` on `(axis+1)%3` and `i2` on
    /// `(axis+2)%3`) is instantiated.
    #[inline]
    pub fn row_bits(&self, axis: usize, i1: i32, i2: i32) -> u32 {
        self.rows[axis][(i1 * CHUNK_SIZE + i2) as usize]
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Clears the dirty flag. Takes `&self`: the flag is atomic so the caller
    /// may do this while meshing tasks read the chunk.
    #[inline]
    pub fn mark_processed(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    /// Clears every visibility mask bit of instantiated cells back to fully
    /// visible. Used by the analyzer before re-deriving the masks.
    pub(crate) fn reset_visibility(&mut self) {
        let inner = self.inner;
        if inner.is_empty() {
            return;
        }
        for z in inner.beg.z..inner.end.z {
            for y in inner.beg.y..inner.end.y {
                for x in inner.beg.x..inner.end.x {
                    let cell = &mut self.cells[cell_index(IVec3::new(x, y, z))];
                    if cell.is_instantiated() {
                        cell.visibility = Visibility::VISIBLE;
                    }
                }
            }
        }
    }

    /// The first instantiated cell at or after `from` in z-major, then y,
    /// then x order, scanning only the inner bounding box.
    pub fn next_voxel(&self, from: Option<IVec3>) -> Option<IVec3> {
        let inner = self.inner;
        if inner.is_empty() {
            return None;
        }

        let start = from.unwrap_or(inner.beg);
        for z in start.z.max(inner.beg.z)..inner.end.z {
            let y_beg = if z == start.z { start.y.max(inner.beg.y) } else { inner.beg.y };
            for y in y_beg..inner.end.y {
                let x_beg = if z == start.z && y == start.y {
                    start.x.max(inner.beg.x)
                } else {
                    inner.beg.x
                };
                for x in x_beg..inner.end.x {
                    let rel = IVec3::new(x, y, z);
                    if self.cells[cell_index(rel)].is_instantiated() {
                        return Some(rel);
                    }
                }
            }
        }

        None
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}
