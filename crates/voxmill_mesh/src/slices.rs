//! Collecting greedy quads across chunks.
//!
//! The one-mesh greedy modes let every chunk task produce its quads into a
//! [`SliceCollection`]; the collections are merged after the join, optionally
//! run through a cross-chunk merge pass, and then emitted into one builder.

use std::collections::BTreeMap;

use glam::{IVec2, IVec3, Vec2};
use voxmill_voxel::TextureType;

use crate::MeshBuilder;
use voxmill_voxel::VoxelModel;

/// Raw pixels covered by one quad (texture-atlas mode).
#[derive(Clone)]
pub struct QuadPixels {
    pub width: u32,
    pub height: u32,
    /// Row-major, row 0 at the quad's low `axis1` edge.
    pub diffuse: Vec<u32>,
    /// Parallel to `diffuse`; empty when the model has no emission palette.
    pub emission: Vec<u32>,
}

/// One merged rectangle of faces.
#[derive(Clone)]
pub struct QuadInfo {
    /// World position of the quad's minimum corner. The component along the
    /// slice axis is the plane coordinate.
    pub base: IVec3,
    /// Extent along `axis1` and `axis2`; zero along the slice axis.
    pub size: IVec3,
    pub normal: IVec3,
    pub material: u8,
    pub color: u8,
    /// Atlas placement, assigned by the packer.
    pub uv_start: IVec2,
    pub pixels: Option<QuadPixels>,
}

type Strip = Vec<QuadInfo>;
type Slice = BTreeMap<i32, Strip>;

/// Quads grouped by axis, slice plane and strip height, every level sorted,
/// so emission order is deterministic regardless of chunk completion order.
#[derive(Default)]
pub struct SliceCollection {
    slices: [BTreeMap<i32, Slice>; 3],
}

impl SliceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, axis: usize, quad: QuadInfo) {
        let axis1 = (axis + 1) % 3;
        let strip = self.slices[axis]
            .entry(quad.base[axis])
            .or_default()
            .entry(quad.base[axis1])
            .or_default();

        // Per-chunk sweeps push in ascending axis2 order already; merged
        // strips keep that order via sorted insertion.
        let axis2 = (axis + 2) % 3;
        let at = strip.partition_point(|q| q.base[axis2] < quad.base[axis2]);
        strip.insert(at, quad);
    }

    pub fn merge(&mut self, other: SliceCollection) {
        for (axis, slices) in other.slices.into_iter().enumerate() {
            for (_, slice) in slices {
                for (_, strip) in slice {
                    for quad in strip {
                        self.add(axis, quad);
                    }
                }
            }
        }
    }

    pub fn quad_count(&self) -> usize {
        self.slices
            .iter()
            .flat_map(|slices| slices.values())
            .flat_map(|slice| slice.values())
            .map(Vec::len)
            .sum()
    }

    /// Cross-chunk merge: first joins neighboring quads within each strip
    /// (width-wise), then pulls matching quads from the strip above
    /// (height-wise). Only exact property matches merge; atlas quads carry
    /// pixels and are left alone.
    pub fn optimize(&mut self) {
        for axis in 0..3 {
            let axis1 = (axis + 1) % 3;
            let axis2 = (axis + 2) % 3;

            let slice_keys: Vec<i32> = self.slices[axis].keys().copied().collect();
            for slice_key in slice_keys {
                // Width-wise within each strip.
                if let Some(slice) = self.slices[axis].get_mut(&slice_key) {
                    for strip in slice.values_mut() {
                        let mut merged: Strip = Vec::with_capacity(strip.len());
                        for quad in strip.drain(..) {
                            match merged.last_mut() {
                                Some(last)
                                    if last.pixels.is_none()
                                        && quad.pixels.is_none()
                                        && last.base[axis2] + last.size[axis2]
                                            == quad.base[axis2]
                                        && last.size[axis1] == quad.size[axis1]
                                        && last.normal == quad.normal
                                        && last.material == quad.material
                                        && last.color == quad.color =>
                                {
                                    last.size[axis2] += quad.size[axis2];
                                }
                                _ => merged.push(quad),
                            }
                        }
                        *strip = merged;
                    }
                }

                // Height-wise across strips, lowest strip first.
                let height_keys: Vec<i32> = self.slices[axis][&slice_key].keys().copied().collect();
                for height_key in height_keys {
                    let mut index = 0;
                    loop {
                        let probe = {
                            let slice = &self.slices[axis][&slice_key];
                            let strip = match slice.get(&height_key) {
                                Some(strip) if index < strip.len() => strip,
                                _ => break,
                            };
                            let quad = &strip[index];
                            if quad.pixels.is_some() {
                                None
                            } else {
                                let above_key = quad.base[axis1] + quad.size[axis1];
                                slice.get(&above_key).and_then(|above| {
                                    above.iter().position(|q| {
                                        q.base[axis2] == quad.base[axis2]
                                            && q.size[axis2] == quad.size[axis2]
                                            && q.normal == quad.normal
                                            && q.material == quad.material
                                            && q.color == quad.color
                                            && q.pixels.is_none()
                                    }).map(|j| (above_key, j))
                                })
                            }
                        };

                        match probe {
                            Some((above_key, j)) => {
                                let slice = self.slices[axis].get_mut(&slice_key).unwrap();
                                let grown = slice.get_mut(&above_key).unwrap().remove(j);
                                slice.get_mut(&height_key).unwrap()[index].size[axis1] +=
                                    grown.size[axis1];
                            }
                            None => index += 1,
                        }
                    }
                }
            }
        }
    }

    /// Emits every quad into the builder, in `(axis, slice, height, width)`
    /// order.
    pub fn emit(&self, builder: &mut MeshBuilder, model: &VoxelModel, textured: bool) {
        let atlas_size = builder_texture_size(builder);

        for axis in 0..3 {
            let axis1 = (axis + 1) % 3;
            let axis2 = (axis + 2) % 3;

            for slice in self.slices[axis].values() {
                for strip in slice.values() {
                    for quad in strip {
                        let mut du = IVec3::ZERO;
                        du[axis2] = quad.size[axis2];
                        let mut dv = IVec3::ZERO;
                        dv[axis1] = quad.size[axis1];

                        let v1 = quad.base.as_vec3();
                        let corners = [
                            v1,
                            v1 + du.as_vec3(),
                            v1 + dv.as_vec3(),
                            v1 + (du + dv).as_vec3(),
                        ];

                        let material = model.material(quad.material).clone();
                        if textured {
                            let (w, h) = (quad.size[axis2] as f32, quad.size[axis1] as f32);
                            let start = Vec2::new(quad.uv_start.x as f32, quad.uv_start.y as f32);
                            let uvs = [
                                start,
                                start + Vec2::new(w, 0.0),
                                start + Vec2::new(0.0, h),
                                start + Vec2::new(w, h),
                            ]
                            .map(|uv| uv / atlas_size);
                            builder.add_quad(corners, quad.normal.as_vec3(), uvs, &material);
                        } else {
                            builder.add_palette_quad(
                                corners,
                                quad.normal.as_vec3(),
                                quad.color,
                                &material,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Mutable access for the atlas packer.
    pub(crate) fn quads_mut(&mut self) -> impl Iterator<Item = &mut QuadInfo> {
        self.slices
            .iter_mut()
            .flat_map(|slices| slices.values_mut())
            .flat_map(|slice| slice.values_mut())
            .flatten()
    }
}

fn builder_texture_size(builder: &MeshBuilder) -> Vec2 {
    builder
        .texture(TextureType::Diffuse)
        .map(|t| Vec2::new(t.width().max(1) as f32, t.height().max(1) as f32))
        .unwrap_or(Vec2::ONE)
}

#[cfg(test)]
mod test {
    use super::*;

    fn quad(axis: usize, slice: i32, h: i32, w: i32, len: i32) -> QuadInfo {
        let axis1 = (axis + 1) % 3;
        let axis2 = (axis + 2) % 3;
        let mut base = IVec3::ZERO;
        base[axis] = slice;
        base[axis1] = h;
        base[axis2] = w;
        let mut size = IVec3::ZERO;
        size[axis1] = 1;
        size[axis2] = len;
        let mut normal = IVec3::ZERO;
        normal[axis] = 1;
        QuadInfo {
            base,
            size,
            normal,
            material: 0,
            color: 1,
            uv_start: IVec2::ZERO,
            pixels: None,
        }
    }

    #[test]
    fn adjacent_quads_merge_width_wise() {
        let mut collection = SliceCollection::new();
        collection.add(1, quad(1, 4, 0, 0, 2));
        collection.add(1, quad(1, 4, 0, 2, 3));
        collection.optimize();

        assert_eq!(collection.quad_count(), 1);
    }

    #[test]
    fn stacked_strips_merge_height_wise() {
        let mut collection = SliceCollection::new();
        collection.add(1, quad(1, 4, 0, 0, 2));
        collection.add(1, quad(1, 4, 1, 0, 2));
        collection.optimize();

        assert_eq!(collection.quad_count(), 1);
    }

    #[test]
    fn differing_colors_do_not_merge() {
        let mut collection = SliceCollection::new();
        let mut second = quad(1, 4, 0, 2, 3);
        second.color = 9;
        collection.add(1, quad(1, 4, 0, 0, 2));
        collection.add(1, second);
        collection.optimize();

        assert_eq!(collection.quad_count(), 2);
    }

    #[test]
    fn merge_keeps_strips_sorted() {
        let mut a = SliceCollection::new();
        a.add(0, quad(0, 0, 0, 4, 1));
        let mut b = SliceCollection::new();
        b.add(0, quad(0, 0, 0, 0, 1));

        a.merge(b);
        let strip = &a.slices[0][&0][&0];
        assert!(strip[0].base.z < strip[1].base.z);
    }
}
