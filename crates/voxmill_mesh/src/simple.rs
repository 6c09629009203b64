//! The per-face mesher.

use glam::{IVec3, Vec3};
use voxmill_voxel::{ChunkMeta, Direction, VoxelModel};

use crate::{Mesh, MeshBuilder, Mesher};

/// Emits one unit quad for every visible voxel face, with palette UVs and
/// the face's outward normal. The baseline mesher: correct, unmerged output.
#[derive(Debug, Default)]
pub struct SimpleMesher;

impl Mesher for SimpleMesher {
    fn mesh_chunk(&self, model: &VoxelModel, chunk: &ChunkMeta) -> Mesh {
        let mut builder = MeshBuilder::new();
        builder.set_textures(model.textures.clone());

        let inner = chunk.inner_bbox;
        for z in inner.beg.z..inner.end.z {
            for y in inner.beg.y..inner.end.y {
                for x in inner.beg.x..inner.end.x {
                    let pos = IVec3::new(x, y, z);
                    let voxel = match chunk.chunk.find_visible(pos - chunk.origin) {
                        Some(voxel) => *voxel,
                        None => continue,
                    };

                    let material = model.material(voxel.material).clone();
                    for direction in Direction::values() {
                        if !voxel.visibility.contains(direction.visibility()) {
                            continue;
                        }
                        builder.add_palette_quad(
                            face_corners(pos, direction),
                            direction.normal(),
                            voxel.color,
                            &material,
                        );
                    }
                }
            }
        }

        builder.build()
    }
}

/// The corners of a voxel face as `[base, base+du, base+dv, base+du+dv]`.
/// The winding is left to the builder.
fn face_corners(pos: IVec3, direction: Direction) -> [Vec3; 4] {
    let base = pos.as_vec3();
    let (origin, du, dv) = match direction {
        Direction::Up => (base + Vec3::Y, Vec3::X, Vec3::Z),
        Direction::Down => (base, Vec3::X, Vec3::Z),
        Direction::Right => (base + Vec3::X, Vec3::Y, Vec3::Z),
        Direction::Left => (base, Vec3::Y, Vec3::Z),
        Direction::Forward => (base + Vec3::Z, Vec3::X, Vec3::Y),
        Direction::Backward => (base, Vec3::X, Vec3::Y),
    };
    [origin, origin + du, origin + dv, origin + du + dv]
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use voxmill_voxel::VoxelModel;

    use super::*;

    fn model_with(voxels: &[IVec3]) -> VoxelModel {
        let mut model = VoxelModel::new();
        for &pos in voxels {
            model.set_voxel(pos, 0, 1, false);
        }
        model.generate_visibility();
        model
    }

    #[test]
    fn single_voxel_is_a_cube() {
        let model = model_with(&[IVec3::ZERO]);
        let mesher = SimpleMesher;
        let mesh = mesher.generate_mesh(&model).unwrap();

        // 6 quads: 12 triangles, 24 vertices (normals keep faces apart),
        // 8 distinct corner positions.
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.vertex_count(), 24);

        let positions: BTreeSet<[i32; 3]> = mesh.surfaces[0]
            .vertices
            .iter()
            .map(|v| [v.pos.x as i32, v.pos.y as i32, v.pos.z as i32])
            .collect();
        assert_eq!(positions.len(), 8);

        let normals: BTreeSet<[i32; 3]> = mesh.surfaces[0]
            .vertices
            .iter()
            .map(|v| [v.normal.x as i32, v.normal.y as i32, v.normal.z as i32])
            .collect();
        assert_eq!(normals.len(), 6);
    }

    #[test]
    fn stacked_pair_drops_the_shared_faces() {
        let model = model_with(&[IVec3::ZERO, IVec3::new(0, 1, 0)]);
        let mesh = SimpleMesher.generate_mesh(&model).unwrap();

        // 10 quads: the +y face of the lower and -y face of the upper voxel
        // are hidden.
        assert_eq!(mesh.triangle_count(), 20);
    }

    #[test]
    fn only_dirty_is_idempotent() {
        let model = model_with(&[IVec3::ZERO]);
        let mesher = SimpleMesher;

        let first = mesher.generate_chunks(&model, true, None);
        assert_eq!(first.len(), 1);

        let second = mesher.generate_chunks(&model, true, None);
        assert!(second.is_empty());
    }

    #[test]
    fn frustum_excludes_outside_chunks() {
        use glam::Vec3;
        use voxmill_math::Frustum;

        let model = model_with(&[IVec3::ZERO, IVec3::new(64, 0, 0)]);
        let frustum = Frustum::from_box(Vec3::splat(-1.0), Vec3::splat(17.0));

        let chunks = SimpleMesher.generate_chunks(&model, false, Some(&frustum));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].total_bbox.contains(IVec3::ZERO));
    }
}
