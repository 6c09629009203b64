//! Texture-atlas packing for the textured greedy mode.

use std::collections::HashMap;
use std::sync::Arc;

use glam::IVec2;
use voxmill_voxel::{Color, Texture, TextureType, VoxelModel};

use crate::slices::SliceCollection;

/// Packs every quad's raw pixel rectangle into one atlas texture (and a
/// parallel emission atlas when present), rewriting each quad's `uv_start`
/// to its atlas position.
///
/// Packing is shelf-order, largest rectangle first: rows are filled left to
/// right and a new shelf starts when a rectangle does not fit anymore.
pub fn pack(
    collection: &mut SliceCollection,
    model: &VoxelModel,
) -> HashMap<TextureType, Arc<Texture>> {
    struct Entry {
        order: usize,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
    }

    let mut entries: Vec<Entry> = collection
        .quads_mut()
        .enumerate()
        .filter_map(|(order, quad)| {
            quad.pixels.as_ref().map(|pixels| Entry {
                order,
                width: pixels.width,
                height: pixels.height,
                x: 0,
                y: 0,
            })
        })
        .collect();

    if entries.is_empty() {
        return model.textures.clone();
    }

    // Largest first; the stable sort keeps emission order for ties.
    entries.sort_by(|a, b| (b.width * b.height).cmp(&(a.width * a.height)));

    let total_area: u32 = entries.iter().map(|e| e.width * e.height).sum();
    let max_width = entries.iter().map(|e| e.width).max().unwrap_or(1);
    let atlas_width = (total_area as f32).sqrt().ceil() as u32;
    let atlas_width = atlas_width.max(max_width).next_power_of_two();

    // Shelf placement.
    let mut cursor_x = 0;
    let mut shelf_y = 0;
    let mut shelf_height = 0;
    for entry in &mut entries {
        if cursor_x + entry.width > atlas_width {
            shelf_y += shelf_height;
            cursor_x = 0;
            shelf_height = 0;
        }
        entry.x = cursor_x;
        entry.y = shelf_y;
        cursor_x += entry.width;
        shelf_height = shelf_height.max(entry.height);
    }
    let atlas_height = shelf_y + shelf_height;

    let has_emission = model.palette(TextureType::Emission).is_some();
    let mut diffuse = Texture::with_size(atlas_width, atlas_height);
    let mut emission = has_emission.then(|| Texture::with_size(atlas_width, atlas_height));

    // Blit and assign UV starts, back in emission order.
    let mut placements: HashMap<usize, (u32, u32)> = HashMap::new();
    for entry in &entries {
        placements.insert(entry.order, (entry.x, entry.y));
    }

    for (order, quad) in collection.quads_mut().enumerate() {
        let pixels = match quad.pixels.as_ref() {
            Some(pixels) => pixels,
            None => continue,
        };
        let &(x, y) = placements.get(&order).expect("quad missed by the packer");
        quad.uv_start = IVec2::new(x as i32, y as i32);

        for row in 0..pixels.height {
            for col in 0..pixels.width {
                let pixel = pixels.diffuse[(row * pixels.width + col) as usize];
                diffuse.set_pixel(x + col, y + row, Color::from_rgba(pixel));

                if let Some(emission_atlas) = emission.as_mut() {
                    let pixel = pixels
                        .emission
                        .get((row * pixels.width + col) as usize)
                        .copied()
                        .unwrap_or(0);
                    emission_atlas.set_pixel(x + col, y + row, Color::from_rgba(pixel));
                }
            }
        }
    }

    let mut textures = HashMap::new();
    textures.insert(TextureType::Diffuse, Arc::new(diffuse));
    if let Some(emission) = emission {
        textures.insert(TextureType::Emission, Arc::new(emission));
    }
    textures
}

#[cfg(test)]
mod test {
    use glam::IVec3;

    use crate::slices::{QuadInfo, QuadPixels};

    use super::*;

    fn textured_quad(width: u32, height: u32, base: IVec3, pixel: u32) -> QuadInfo {
        QuadInfo {
            base,
            size: IVec3::new(0, height as i32, width as i32),
            normal: IVec3::X,
            material: 0,
            color: 0,
            uv_start: IVec2::ZERO,
            pixels: Some(QuadPixels {
                width,
                height,
                diffuse: vec![pixel; (width * height) as usize],
                emission: Vec::new(),
            }),
        }
    }

    #[test]
    fn quads_get_disjoint_placements() {
        let mut collection = SliceCollection::new();
        collection.add(0, textured_quad(4, 2, IVec3::new(0, 0, 0), 1));
        collection.add(0, textured_quad(2, 2, IVec3::new(0, 4, 0), 2));
        collection.add(0, textured_quad(1, 1, IVec3::new(0, 8, 0), 3));

        let model = VoxelModel::new();
        let textures = pack(&mut collection, &model);
        let atlas = textures.get(&TextureType::Diffuse).unwrap();

        // Every source pixel must land somewhere, and areas may not overlap:
        // counting non-zero pixels recovers the total input area.
        let filled = atlas.pixels().iter().filter(|&&p| p != 0).count();
        assert_eq!(filled, 4 * 2 + 2 * 2 + 1);

        let placements: Vec<IVec2> = collection.quads_mut().map(|q| q.uv_start).collect();
        assert_eq!(placements.len(), 3);
        assert!(placements.iter().all(|p| p.x >= 0 && p.y >= 0));
    }

    #[test]
    fn largest_quad_is_placed_first() {
        let mut collection = SliceCollection::new();
        collection.add(0, textured_quad(1, 1, IVec3::new(0, 0, 0), 1));
        collection.add(0, textured_quad(8, 8, IVec3::new(0, 4, 0), 2));

        let model = VoxelModel::new();
        pack(&mut collection, &model);

        let quads: Vec<QuadInfo> = collection.quads_mut().map(|q| q.clone()).collect();
        let big = quads.iter().find(|q| q.size.y == 8).unwrap();
        assert_eq!(big.uv_start, IVec2::ZERO);
    }
}
