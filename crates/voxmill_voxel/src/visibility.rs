//! Face-visibility maintenance.
//!
//! For two axis-adjacent instantiated cells the touching faces are:
//!
//! * both opaque → hidden,
//! * one opaque, the other absent or transparent → visible,
//! * both transparent with the same material and color → hidden,
//! * both transparent otherwise → visible.
//!
//! Material equality is handle identity, which inside one model is the same
//! relation as material-index equality.

use glam::IVec3;
use tracing::trace;

use crate::space::chunk_origin;
use crate::{Direction, Visibility, Voxel, VoxelSpace, CHUNK_SIZE};

/// Derives visibility masks, either over all dirty chunks or incrementally
/// around a single edit.
pub struct VisibilityAnalyzer;

/// Whether the touching faces of an adjacent instantiated pair are hidden.
#[inline]
fn faces_hidden(a: &Voxel, b: &Voxel) -> bool {
    match (a.is_transparent(), b.is_transparent()) {
        (false, false) => true,
        (true, true) => a.material == b.material && a.color == b.color,
        _ => false,
    }
}

impl VisibilityAnalyzer {
    /// Recomputes the visibility masks of every voxel in dirty chunks.
    ///
    /// Scans each dirty chunk's occupancy rows along the three axes; every
    /// adjacent pair of set bits is one face pair to evaluate. At chunk
    /// boundaries the neighbor chunk's adjacent row bit is patched in, and
    /// the neighbor's touching face is updated as well even when that chunk
    /// itself is clean.
    ///
    /// Dirty flags are left untouched; the mesher owns clearing them.
    pub fn generate(space: &mut VoxelSpace) {
        space.shrink_inner();

        let dirty: Vec<IVec3> = space
            .query_dirty_chunks(None)
            .iter()
            .map(|meta| meta.origin)
            .collect();

        trace!(chunks = dirty.len(), "visibility pass");

        // Start every instantiated cell of a dirty chunk fully visible, then
        // clear the hidden pairs below.
        for &origin in &dirty {
            space.reset_chunk_visibility(origin);
        }

        let mut set_ops: Vec<(IVec3, Visibility)> = Vec::new();
        let mut clear_ops: Vec<(IVec3, Visibility)> = Vec::new();

        for &origin in &dirty {
            let chunk = match space.chunk_at(origin) {
                Some(chunk) => chunk,
                None => continue,
            };
            let inner = chunk.inner_bbox();
            if inner.is_empty() {
                continue;
            }

            for axis in 0..3 {
                let axis1 = (axis + 1) % 3;
                let axis2 = (axis + 2) % 3;
                let (pos_face, neg_face) = Direction::axis_faces(axis);

                let mut unit = IVec3::ZERO;
                unit[axis] = 1;

                for i1 in inner.beg[axis1]..inner.end[axis1] {
                    for i2 in inner.beg[axis2]..inner.end[axis2] {
                        let bits = chunk.row_bits(axis, i1, i2);

                        // Row coordinates in world space with the axis
                        // component zeroed.
                        let mut row_pos = origin;
                        row_pos[axis1] = origin[axis1] + i1;
                        row_pos[axis2] = origin[axis2] + i2;
                        row_pos[axis] = origin[axis];

                        // Widen by the two boundary cells so cross-chunk
                        // pairs show up as ordinary adjacent bits.
                        let mut ext = bits << 1;
                        let below = row_pos - unit;
                        if space.find(below).is_some() {
                            ext |= 1;
                        }
                        let above = row_pos + unit * CHUNK_SIZE;
                        if space.find(above).is_some() {
                            ext |= 1 << (CHUNK_SIZE + 1);
                        }

                        // Bit k of `pairs` marks the pair (cell k-1, cell k)
                        // in extended coordinates.
                        let mut pairs = ext & (ext >> 1);
                        while pairs != 0 {
                            let k = pairs.trailing_zeros() as i32;
                            pairs &= pairs - 1;

                            let mut low = row_pos;
                            low[axis] = origin[axis] + k - 1;
                            let high = low + unit;

                            let a = *space.find(low).expect("occupancy bit without cell");
                            let b = *space.find(high).expect("occupancy bit without cell");

                            if faces_hidden(&a, &b) {
                                clear_ops.push((low, pos_face.visibility()));
                                clear_ops.push((high, neg_face.visibility()));
                            } else {
                                // Only boundary neighbors in clean chunks can
                                // still carry a stale hidden bit; interior
                                // cells were reset above.
                                set_ops.push((low, pos_face.visibility()));
                                set_ops.push((high, neg_face.visibility()));
                            }
                        }

                        // An erased boundary cell exposes the clean
                        // neighbor's face: neighbor present, edge cell empty.
                        if ext & 1 != 0 && ext & 2 == 0 {
                            set_ops.push((below, pos_face.visibility()));
                        }
                        let top_bit = 1 << (CHUNK_SIZE + 1);
                        if ext & top_bit != 0 && ext & (top_bit >> 1) == 0 {
                            set_ops.push((above, neg_face.visibility()));
                        }
                    }
                }
            }
        }

        for (pos, bit) in set_ops {
            if let Some(voxel) = space.find_mut(pos) {
                voxel.visibility.set(bit);
            }
        }
        for (pos, bit) in clear_ops {
            if let Some(voxel) = space.find_mut(pos) {
                voxel.visibility.clear(bit);
            }
        }
    }

    /// Incremental update after a single insert or erase at `pos`: applies
    /// the pairwise rule between `pos` and each of its six neighbors,
    /// updating both masks.
    pub fn update_at(space: &mut VoxelSpace, pos: IVec3) {
        let center = space.find(pos).copied();

        for direction in Direction::values() {
            let neighbor_pos = pos + direction.offset();
            let neighbor = space.find(neighbor_pos).copied();

            match (center, neighbor) {
                (Some(a), Some(b)) => {
                    let hidden = faces_hidden(&a, &b);
                    if let Some(voxel) = space.find_mut(pos) {
                        if hidden {
                            voxel.visibility.clear(direction.visibility());
                        } else {
                            voxel.visibility.set(direction.visibility());
                        }
                    }
                    if let Some(voxel) = space.find_mut(neighbor_pos) {
                        if hidden {
                            voxel.visibility.clear(direction.opposite().visibility());
                        } else {
                            voxel.visibility.set(direction.opposite().visibility());
                        }
                    }
                }
                (Some(_), None) => {
                    if let Some(voxel) = space.find_mut(pos) {
                        voxel.visibility.set(direction.visibility());
                    }
                }
                (None, Some(_)) => {
                    if let Some(voxel) = space.find_mut(neighbor_pos) {
                        voxel.visibility.set(direction.opposite().visibility());
                    }
                }
                (None, None) => {}
            }
        }
    }
}

impl VoxelSpace {
    /// Resets the visibility masks of an entire chunk back to fully visible.
    fn reset_chunk_visibility(&mut self, origin: IVec3) {
        debug_assert_eq!(origin, chunk_origin(origin));
        if let Some(chunk) = self.chunk_mut(origin) {
            chunk.reset_visibility();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn space_with(voxels: &[(IVec3, Voxel)]) -> VoxelSpace {
        let mut space = VoxelSpace::new();
        for &(pos, voxel) in voxels {
            space.insert(pos, voxel);
        }
        space
    }

    #[test]
    fn lone_voxel_keeps_all_faces() {
        let mut space = space_with(&[(IVec3::ZERO, Voxel::new(0, 1, false))]);
        VisibilityAnalyzer::generate(&mut space);
        assert_eq!(space.find(IVec3::ZERO).unwrap().visibility, Visibility::VISIBLE);
    }

    #[test]
    fn stacked_pair_hides_touching_faces() {
        let mut space = space_with(&[
            (IVec3::new(0, 0, 0), Voxel::new(0, 1, false)),
            (IVec3::new(0, 1, 0), Voxel::new(0, 1, false)),
        ]);
        VisibilityAnalyzer::generate(&mut space);

        let lower = space.find(IVec3::new(0, 0, 0)).unwrap();
        let upper = space.find(IVec3::new(0, 1, 0)).unwrap();
        assert!(!lower.visibility.contains(Visibility::UP));
        assert!(lower.visibility.contains(Visibility::DOWN));
        assert!(!upper.visibility.contains(Visibility::DOWN));
        assert!(upper.visibility.contains(Visibility::UP));
    }

    #[test]
    fn incremental_insert_clears_shared_faces() {
        let mut space = space_with(&[(IVec3::new(0, 0, 0), Voxel::new(0, 1, false))]);
        VisibilityAnalyzer::generate(&mut space);

        space.insert(IVec3::new(0, 1, 0), Voxel::new(0, 1, false));
        VisibilityAnalyzer::update_at(&mut space, IVec3::new(0, 1, 0));

        let lower = space.find(IVec3::new(0, 0, 0)).unwrap();
        let upper = space.find(IVec3::new(0, 1, 0)).unwrap();
        assert!(!lower.visibility.contains(Visibility::UP));
        assert!(!upper.visibility.contains(Visibility::DOWN));
    }

    #[test]
    fn incremental_erase_restores_neighbor_faces() {
        let mut space = space_with(&[
            (IVec3::new(0, 0, 0), Voxel::new(0, 1, false)),
            (IVec3::new(0, 1, 0), Voxel::new(0, 1, false)),
        ]);
        VisibilityAnalyzer::generate(&mut space);

        space.erase(IVec3::new(0, 1, 0));
        VisibilityAnalyzer::update_at(&mut space, IVec3::new(0, 1, 0));

        let lower = space.find(IVec3::new(0, 0, 0)).unwrap();
        assert_eq!(lower.visibility, Visibility::VISIBLE);
    }

    #[test]
    fn opaque_next_to_transparent_stays_visible() {
        let mut space = space_with(&[
            (IVec3::new(0, 0, 0), Voxel::new(0, 1, false)),
            (IVec3::new(1, 0, 0), Voxel::new(0, 1, true)),
        ]);
        VisibilityAnalyzer::generate(&mut space);

        let opaque = space.find(IVec3::new(0, 0, 0)).unwrap();
        let transparent = space.find(IVec3::new(1, 0, 0)).unwrap();
        assert!(opaque.visibility.contains(Visibility::RIGHT));
        assert!(transparent.visibility.contains(Visibility::LEFT));
    }

    #[test]
    fn matching_transparent_pair_is_hidden() {
        let mut space = space_with(&[
            (IVec3::new(0, 0, 0), Voxel::new(0, 1, true)),
            (IVec3::new(1, 0, 0), Voxel::new(0, 1, true)),
        ]);
        VisibilityAnalyzer::generate(&mut space);

        assert!(!space
            .find(IVec3::new(0, 0, 0))
            .unwrap()
            .visibility
            .contains(Visibility::RIGHT));
        assert!(!space
            .find(IVec3::new(1, 0, 0))
            .unwrap()
            .visibility
            .contains(Visibility::LEFT));
    }

    #[test]
    fn mismatched_transparent_pair_stays_visible() {
        let mut space = space_with(&[
            (IVec3::new(0, 0, 0), Voxel::new(0, 1, true)),
            (IVec3::new(1, 0, 0), Voxel::new(0, 2, true)),
        ]);
        VisibilityAnalyzer::generate(&mut space);

        assert!(space
            .find(IVec3::new(0, 0, 0))
            .unwrap()
            .visibility
            .contains(Visibility::RIGHT));
    }

    #[test]
    fn pairs_across_chunk_borders_are_hidden() {
        let mut space = space_with(&[
            (IVec3::new(15, 0, 0), Voxel::new(0, 1, false)),
            (IVec3::new(16, 0, 0), Voxel::new(0, 1, false)),
        ]);
        VisibilityAnalyzer::generate(&mut space);

        assert!(!space
            .find(IVec3::new(15, 0, 0))
            .unwrap()
            .visibility
            .contains(Visibility::RIGHT));
        assert!(!space
            .find(IVec3::new(16, 0, 0))
            .unwrap()
            .visibility
            .contains(Visibility::LEFT));
    }

    #[test]
    fn every_visible_voxel_has_an_exposed_face() {
        // A solid 3x3x3 block: the center voxel ends up fully enclosed.
        let mut space = VoxelSpace::new();
        for z in 0..3 {
            for y in 0..3 {
                for x in 0..3 {
                    space.insert(IVec3::new(x, y, z), Voxel::new(0, 1, false));
                }
            }
        }
        VisibilityAnalyzer::generate(&mut space);

        let center = space.find(IVec3::splat(1)).unwrap();
        assert!(!center.is_visible());

        for (pos, voxel) in space.iter() {
            if !voxel.is_visible() {
                continue;
            }
            let exposed = Direction::values().iter().any(|&direction| {
                voxel.visibility.contains(direction.visibility())
                    && space.find(pos + direction.offset()).is_none()
            });
            assert!(exposed, "voxel at {pos:?} claims visibility without an exposed face");
        }
    }
}
