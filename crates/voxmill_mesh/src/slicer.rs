//! Per-slice face masks and the greedy rectangle sweep.
//!
//! For each chunk, axis and slice plane, a 2-D bitmask records which cells
//! expose a face in that plane (one mask per face sign, derived from the
//! voxels' visibility bits). The classical greedy sweep then grows maximal
//! rectangles over each mask: width first along `axis2`, then height along
//! `axis1`, left-to-right, bottom-to-top.

use glam::IVec3;
use voxmill_voxel::{ChunkMeta, Direction, Voxel, CHUNK_SIZE};

/// Face candidates of one slice plane for one face sign, indexed by
/// chunk-relative `(axis1, axis2)` coordinates.
pub struct SliceMask {
    rows: [u32; CHUNK_SIZE as usize],
}

impl SliceMask {
    fn new() -> Self {
        Self {
            rows: [0; CHUNK_SIZE as usize],
        }
    }

    #[inline]
    fn set(&mut self, i1: i32, i2: i32) {
        self.rows[i1 as usize] |= 1 << i2;
    }

    #[inline]
    fn get(&self, i1: i32, i2: i32) -> bool {
        self.rows[i1 as usize] & (1 << i2) != 0
    }

    #[inline]
    fn clear(&mut self, i1: i32, i2: i32) {
        self.rows[i1 as usize] &= !(1 << i2);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|&row| row == 0)
    }
}

/// A rectangle found by the sweep, in chunk-relative mask coordinates.
pub struct MaskRect {
    pub i1: i32,
    pub i2: i32,
    pub height: i32,
    pub width: i32,
}

/// Builds the two face masks (positive and negative normal) of one slice.
///
/// `plane` is the world coordinate of the boundary plane along `axis`: the
/// positive mask marks cells at `plane - 1` whose positive face is visible,
/// the negative mask cells at `plane` whose negative face is visible.
pub fn build_slice_masks(chunk: &ChunkMeta, axis: usize, plane: i32) -> (SliceMask, SliceMask) {
    let axis1 = (axis + 1) % 3;
    let axis2 = (axis + 2) % 3;
    let (pos_face, neg_face) = Direction::axis_faces(axis);

    let inner = chunk.inner_bbox;
    let mut pos_mask = SliceMask::new();
    let mut neg_mask = SliceMask::new();

    for i1 in inner.beg[axis1]..inner.end[axis1] {
        for i2 in inner.beg[axis2]..inner.end[axis2] {
            let mut cell = IVec3::ZERO;
            cell[axis1] = i1;
            cell[axis2] = i2;

            let rel1 = i1 - chunk.origin[axis1];
            let rel2 = i2 - chunk.origin[axis2];

            cell[axis] = plane - 1;
            if cell[axis] >= inner.beg[axis] {
                if let Some(voxel) = chunk.chunk.find_visible(cell - chunk.origin) {
                    if voxel.visibility.contains(pos_face.visibility()) {
                        pos_mask.set(rel1, rel2);
                    }
                }
            }

            cell[axis] = plane;
            if cell[axis] < inner.end[axis] {
                if let Some(voxel) = chunk.chunk.find_visible(cell - chunk.origin) {
                    if voxel.visibility.contains(neg_face.visibility()) {
                        neg_mask.set(rel1, rel2);
                    }
                }
            }
        }
    }

    (pos_mask, neg_mask)
}

/// Runs the greedy sweep over `mask`, consuming it.
///
/// `same` decides whether a candidate cell can join the rectangle rooted at
/// the first cell; rectangles are emitted in `(axis1, axis2)` scan order.
pub fn sweep_mask(
    mask: &mut SliceMask,
    mut same: impl FnMut((i32, i32), (i32, i32)) -> bool,
    mut emit: impl FnMut(MaskRect),
) {
    let size = CHUNK_SIZE;

    for i1 in 0..size {
        let mut i2 = 0;
        while i2 < size {
            if !mask.get(i1, i2) {
                i2 += 1;
                continue;
            }

            let root = (i1, i2);

            // Expand the width along axis2.
            let mut width = 1;
            while i2 + width < size
                && mask.get(i1, i2 + width)
                && same(root, (i1, i2 + width))
            {
                width += 1;
            }

            // Expand the height along axis1, re-checking the whole width per
            // row; stop at the first mismatch.
            let mut height = 1;
            'grow: while i1 + height < size {
                for k in 0..width {
                    if !mask.get(i1 + height, i2 + k)
                        || !same(root, (i1 + height, i2 + k))
                    {
                        break 'grow;
                    }
                }
                height += 1;
            }

            for h in 0..height {
                for w in 0..width {
                    mask.clear(i1 + h, i2 + w);
                }
            }

            emit(MaskRect {
                i1,
                i2,
                height,
                width,
            });

            i2 += width;
        }
    }
}

/// Fetches the visible voxel owning a face candidate, given the cell's world
/// position.
#[inline]
pub fn face_voxel<'a>(chunk: &ChunkMeta<'a>, cell: IVec3) -> Option<&'a Voxel> {
    chunk.chunk.find_visible(cell - chunk.origin)
}
