//! The greedy mesher family.

use glam::{IVec2, IVec3};
use voxmill_math::{hash_ivec3, Frustum};
use voxmill_voxel::{ChunkMeta, Direction, TextureType, VoxelModel};

use crate::slicer::{self, MaskRect};
use crate::slices::{QuadInfo, QuadPixels, SliceCollection};
use crate::{atlas, pool, Mesh, MeshBuilder, MeshChunk, Mesher};

/// Runs the greedy sweep over one chunk and hands every merged quad to
/// `emit`, in `(axis, slice, face sign, axis1, axis2)` order.
///
/// With `textured` set, color equality is not required for merging and each
/// quad collects the raw palette pixels of the cells it covers.
fn sweep_chunk(
    model: &VoxelModel,
    chunk: &ChunkMeta,
    textured: bool,
    mut emit: impl FnMut(usize, QuadInfo),
) {
    let inner = chunk.inner_bbox;
    if inner.is_empty() {
        return;
    }

    let diffuse = model.palette(TextureType::Diffuse).cloned();
    let emission = model.palette(TextureType::Emission).cloned();

    for axis in 0..3 {
        let axis1 = (axis + 1) % 3;
        let axis2 = (axis + 2) % 3;
        let (pos_face, neg_face) = Direction::axis_faces(axis);

        for plane in inner.beg[axis]..=inner.end[axis] {
            let (mut pos_mask, mut neg_mask) = slicer::build_slice_masks(chunk, axis, plane);

            for (mask, direction) in [(&mut pos_mask, pos_face), (&mut neg_mask, neg_face)] {
                if mask.is_empty() {
                    continue;
                }

                // The cell owning a face candidate at mask position (i1, i2).
                let cell_at = |i1: i32, i2: i32| -> IVec3 {
                    let mut cell = IVec3::ZERO;
                    cell[axis] = if direction == pos_face { plane - 1 } else { plane };
                    cell[axis1] = chunk.origin[axis1] + i1;
                    cell[axis2] = chunk.origin[axis2] + i2;
                    cell
                };

                let same = |root: (i32, i32), candidate: (i32, i32)| {
                    let a = slicer::face_voxel(chunk, cell_at(root.0, root.1));
                    let b = slicer::face_voxel(chunk, cell_at(candidate.0, candidate.1));
                    match (a, b) {
                        (Some(a), Some(b)) => {
                            a.material == b.material && (textured || a.color == b.color)
                        }
                        _ => false,
                    }
                };

                let mut rects: Vec<MaskRect> = Vec::new();
                slicer::sweep_mask(mask, same, |rect| rects.push(rect));

                for rect in rects {
                    let root = cell_at(rect.i1, rect.i2);
                    let voxel = match slicer::face_voxel(chunk, root) {
                        Some(voxel) => *voxel,
                        None => continue,
                    };

                    let mut base = root;
                    base[axis] = plane;
                    let mut size = IVec3::ZERO;
                    size[axis1] = rect.height;
                    size[axis2] = rect.width;

                    let pixels = if textured {
                        let mut quad_pixels = QuadPixels {
                            width: rect.width as u32,
                            height: rect.height as u32,
                            diffuse: Vec::with_capacity((rect.width * rect.height) as usize),
                            emission: Vec::new(),
                        };
                        for h in 0..rect.height {
                            for w in 0..rect.width {
                                let cell = cell_at(rect.i1 + h, rect.i2 + w);
                                let color = slicer::face_voxel(chunk, cell)
                                    .map(|v| v.color)
                                    .unwrap_or(voxel.color);
                                let diffuse_pixel = diffuse
                                    .as_deref()
                                    .filter(|t| (color as u32) < t.width())
                                    .map(|t| t.get_pixel(color as u32, 0).as_rgba())
                                    .unwrap_or(0xFFFF_FFFF);
                                quad_pixels.diffuse.push(diffuse_pixel);

                                if let Some(emission) = emission.as_deref() {
                                    let pixel = if (color as u32) < emission.width() {
                                        emission.get_pixel(color as u32, 0).as_rgba()
                                    } else {
                                        0
                                    };
                                    quad_pixels.emission.push(pixel);
                                }
                            }
                        }
                        Some(quad_pixels)
                    } else {
                        None
                    };

                    emit(
                        axis,
                        QuadInfo {
                            base,
                            size,
                            normal: direction.offset(),
                            material: voxel.material,
                            color: voxel.color,
                            uv_start: IVec2::ZERO,
                            pixels,
                        },
                    );
                }
            }
        }
    }
}

/// Greedy mesher that keeps the chunk layout: one output mesh per chunk,
/// merged quads never cross chunk borders.
pub struct GreedyChunkedMesher;

impl Mesher for GreedyChunkedMesher {
    fn mesh_chunk(&self, model: &VoxelModel, chunk: &ChunkMeta) -> Mesh {
        let mut builder = MeshBuilder::new();
        builder.set_textures(model.textures.clone());

        let mut collection = SliceCollection::new();
        sweep_chunk(model, chunk, false, |axis, quad| collection.add(axis, quad));
        collection.emit(&mut builder, model, false);

        builder.build()
    }
}

/// Greedy mesher producing one mesh for the whole model.
///
/// Chunks are sliced in parallel; the resulting quads are merged across
/// chunk borders (plain mode) or packed into a generated texture atlas
/// (textured mode).
pub struct GreedyMesher {
    textured: bool,
}

impl GreedyMesher {
    pub fn new(textured: bool) -> Self {
        Self { textured }
    }
}

impl Mesher for GreedyMesher {
    fn mesh_chunk(&self, model: &VoxelModel, chunk: &ChunkMeta) -> Mesh {
        GreedyChunkedMesher.mesh_chunk(model, chunk)
    }

    fn generate_chunks(
        &self,
        model: &VoxelModel,
        only_dirty: bool,
        frustum: Option<&Frustum>,
    ) -> Vec<MeshChunk> {
        let chunks = if only_dirty {
            model.voxels().query_dirty_chunks(frustum)
        } else {
            model.voxels().query_chunks(frustum)
        };
        if chunks.is_empty() {
            return Vec::new();
        }

        for meta in &chunks {
            model.voxels().mark_as_processed(meta);
        }

        let collections = pool::parallel_map(chunks, |meta| {
            let mut collection = SliceCollection::new();
            sweep_chunk(model, &meta, self.textured, |axis, quad| {
                collection.add(axis, quad)
            });
            collection
        });

        let mut collection = SliceCollection::new();
        for partial in collections {
            collection.merge(partial);
        }

        let mut builder = MeshBuilder::new();
        builder.name = model.name.clone();

        if self.textured {
            builder.set_textures(atlas::pack(&mut collection, model));
        } else {
            collection.optimize();
            builder.set_textures(model.textures.clone());
        }

        collection.emit(&mut builder, model, self.textured);

        // One mesh covering the whole model.
        vec![MeshChunk {
            unique_id: hash_ivec3(model.bbox.beg),
            inner_bbox: model.bbox,
            total_bbox: model.bbox,
            mesh: builder.build(),
        }]
    }
}

#[cfg(test)]
mod test {
    use glam::Vec3;
    use voxmill_math::Frustum;

    use super::*;

    fn model_with(voxels: &[IVec3]) -> VoxelModel {
        let mut model = VoxelModel::new();
        for &pos in voxels {
            model.set_voxel(pos, 0, 1, false);
        }
        model.generate_visibility();
        model
    }

    fn slab_4x1x4() -> VoxelModel {
        let mut cells = Vec::new();
        for z in 0..4 {
            for x in 0..4 {
                cells.push(IVec3::new(x, 0, z));
            }
        }
        model_with(&cells)
    }

    #[test]
    fn single_voxel_yields_six_quads() {
        let model = model_with(&[IVec3::ZERO]);
        let mesh = GreedyMesher::new(false).generate_mesh(&model).unwrap();

        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.vertex_count(), 24);
    }

    #[test]
    fn slab_top_and_bottom_collapse_to_single_quads() {
        let model = slab_4x1x4();
        let chunks = GreedyMesher::new(false).generate_chunks(&model, false, None);
        assert_eq!(chunks.len(), 1);

        // 1 top + 1 bottom + 4 side strips = 6 quads.
        assert_eq!(chunks[0].mesh.triangle_count(), 12);
    }

    #[test]
    fn chunked_slab_matches_but_stays_per_chunk() {
        let model = slab_4x1x4();
        let chunks = GreedyChunkedMesher.generate_chunks(&model, false, None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].mesh.triangle_count(), 12);
    }

    #[test]
    fn stacked_pair_merges_side_faces() {
        let model = model_with(&[IVec3::ZERO, IVec3::new(0, 1, 0)]);
        let mesh = GreedyMesher::new(false).generate_mesh(&model).unwrap();

        // The column merges the four side faces into 1x2 quads: 4 sides +
        // top + bottom = 6 quads.
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn different_colors_do_not_merge() {
        let mut model = VoxelModel::new();
        model.set_voxel(IVec3::new(0, 0, 0), 0, 1, false);
        model.set_voxel(IVec3::new(1, 0, 0), 0, 2, false);
        model.generate_visibility();

        let mesh = GreedyMesher::new(false).generate_mesh(&model).unwrap();
        // No merging anywhere: 10 visible faces.
        assert_eq!(mesh.triangle_count(), 20);
    }

    #[test]
    fn greedy_is_deterministic() {
        let model = slab_4x1x4();

        let run = || {
            let mesh = GreedyMesher::new(false).generate_mesh(&model).unwrap();
            let mut bytes = Vec::new();
            for surface in &mesh.surfaces {
                for vertex in &surface.vertices {
                    bytes.extend_from_slice(bytemuck::bytes_of(vertex));
                }
                bytes.extend_from_slice(bytemuck::cast_slice(&surface.indices));
            }
            bytes
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn only_dirty_without_dirty_chunks_is_empty() {
        let model = slab_4x1x4();
        let mesher = GreedyMesher::new(false);

        assert_eq!(mesher.generate_chunks(&model, true, None).len(), 1);
        assert!(mesher.generate_chunks(&model, true, None).is_empty());
    }

    #[test]
    fn frustum_culls_whole_chunks() {
        let model = model_with(&[IVec3::ZERO, IVec3::new(40, 0, 0)]);
        let frustum = Frustum::from_box(Vec3::splat(-1.0), Vec3::splat(17.0));

        let chunks = GreedyChunkedMesher.generate_chunks(&model, false, Some(&frustum));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].mesh.triangle_count(), 12);
    }

    #[test]
    fn spanning_chunks_merges_across_borders() {
        // A 20-voxel row crossing the chunk border at x = 16.
        let cells: Vec<IVec3> = (0..20).map(|x| IVec3::new(x, 0, 0)).collect();
        let model = model_with(&cells);

        let chunks = GreedyMesher::new(false).generate_chunks(&model, false, None);
        assert_eq!(chunks.len(), 1);
        // A 1x1x20 bar merges into 6 quads after the cross-chunk pass.
        assert_eq!(chunks[0].mesh.triangle_count(), 12);
    }

    #[test]
    fn textured_mode_builds_an_atlas() {
        let mut model = VoxelModel::new();
        let mut palette = voxmill_voxel::Texture::new();
        palette.add_pixel(voxmill_voxel::Color::new(255, 0, 0, 255));
        palette.add_pixel(voxmill_voxel::Color::new(0, 255, 0, 255));
        model.textures.insert(TextureType::Diffuse, std::sync::Arc::new(palette));

        model.set_voxel(IVec3::new(0, 0, 0), 0, 0, false);
        model.set_voxel(IVec3::new(1, 0, 0), 0, 1, false);
        model.generate_visibility();

        let chunks = GreedyMesher::new(true).generate_chunks(&model, false, None);
        let mesh = &chunks[0].mesh;

        // Different colors merge in textured mode: 6 quads for the 2x1x1 bar.
        assert_eq!(mesh.triangle_count(), 12);

        let atlas = mesh.textures.get(&TextureType::Diffuse).unwrap();
        assert!(atlas.width() >= 2);

        let red = voxmill_voxel::Color::new(255, 0, 0, 255).as_rgba();
        let green = voxmill_voxel::Color::new(0, 255, 0, 255).as_rgba();
        assert!(atlas.pixels().contains(&red));
        assert!(atlas.pixels().contains(&green));
    }
}
