//! Goxel `.gox` import.
//!
//! Version 2 of the chunked container: `BL16` chunks hold 16³ voxel blocks
//! encoded as PNG-in-RGBA, `LAYR` chunks place blocks and reference a
//! material, `MATE` chunks carry the material dictionaries. Goxel's up axis
//! is `z` and its handedness is opposite, so positions are swizzled and `x`
//! mirrored on the way in.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec3, Vec3};
use tracing::trace;
use voxmill_math::BBox;
use voxmill_voxel::{
    Color, Material, MaterialRef, SceneNode, Texture, TextureType, VoxelModel, VoxelScene,
};

use crate::stream::Reader;
use crate::{Error, Result, VoxelFormat};

#[derive(Default)]
pub struct GoxelFormat;

struct Block {
    index: usize,
    pos: IVec3,
}

struct Layer {
    name: String,
    material: usize,
    visible: bool,
    blocks: Vec<Block>,
}

impl VoxelFormat for GoxelFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        let mut reader = Reader::new(data);

        let signature = reader.read_bytes(4)?;
        if signature != b"GOX " {
            return Err(Error::FormatUnknown("missing GOX signature".into()));
        }
        let version = reader.read_i32()?;
        if version != 2 {
            return Err(Error::VersionUnsupported(version.to_string()));
        }

        let mut blocks: Vec<Vec<u32>> = Vec::new();
        let mut layers: Vec<Layer> = Vec::new();
        let mut materials: Vec<MaterialRef> = Vec::new();
        let mut bbox = BBox::default();

        while !reader.is_eof() {
            let kind = reader.read_bytes(4)?;
            let kind = [kind[0], kind[1], kind[2], kind[3]];
            let size = reader.read_i32()?.max(0) as usize;

            match &kind {
                b"BL16" => {
                    let png = reader.read_bytes(size)?;
                    let texture = Texture::from_png(png)
                        .map_err(|e| Error::Parse(format!("bad BL16 png: {e}")))?;
                    if texture.pixels().len() < 16 * 16 * 16 {
                        return Err(Error::Parse(format!(
                            "BL16 block holds {} pixels, expected 4096",
                            texture.pixels().len()
                        )));
                    }
                    blocks.push(texture.pixels().to_vec());
                }
                b"LAYR" => {
                    layers.push(read_layer(&mut reader, size, &mut bbox)?);
                }
                b"MATE" => {
                    materials.push(read_material(&mut reader, size)?);
                }
                _ => {
                    reader.skip(size)?;
                }
            }

            // Every chunk is followed by a CRC field.
            reader.skip(4)?;
        }

        trace!(blocks = blocks.len(), layers = layers.len(), "parsed gox file");

        if materials.is_empty() {
            materials.push(MaterialRef::new(Material::default()));
        }
        let has_emission = materials.iter().any(|m| m.is_emissive());

        let mut pending: Vec<(VoxelModel, Vec3, bool)> = Vec::new();
        let mut diffuse = Texture::new();
        let mut emission = has_emission.then(Texture::new);
        let mut color_columns: HashMap<u32, u8> = HashMap::new();

        let beg_abs = IVec3::new(bbox.beg.x.abs(), bbox.beg.y.abs(), bbox.beg.z.abs());
        let size = bbox.end + beg_abs;
        let offset = beg_abs;

        for layer in &layers {
            if !layer.visible {
                continue;
            }

            let mut model = VoxelModel::new();
            model.name = layer.name.clone();
            let material = materials
                .get(layer.material)
                .cloned()
                .unwrap_or_else(|| materials[0].clone());
            let emissive = material.is_emissive();
            model.materials.push(material);
            let local_material = (model.materials.len() - 1) as u8;

            let mut translation_beg = IVec3::splat(i32::MAX);

            for block in &layer.blocks {
                let pixels = match blocks.get(block.index) {
                    Some(pixels) => pixels,
                    None => {
                        return Err(Error::Parse(format!(
                            "layer references missing block {}",
                            block.index
                        )))
                    }
                };

                for z in 0..16 {
                    for y in 0..16 {
                        for x in 0..16 {
                            let packed = pixels[(x + y * 16 + z * 256) as usize];
                            let color = Color::from_rgba(packed);
                            if color.a == 0 {
                                continue;
                            }

                            // File position, z-up.
                            let file = block.pos + IVec3::new(x, y, z);
                            // y-up with the x mirror for handedness.
                            let pos = IVec3::new(size.x - file.x, file.z, file.y) + offset;

                            let column = match color_columns.get(&packed) {
                                Some(&column) => column,
                                None => {
                                    let column = diffuse.add_pixel(color) as u8;
                                    if let Some(emission) = emission.as_mut() {
                                        emission.add_pixel(if emissive {
                                            color
                                        } else {
                                            Color::new(0, 0, 0, 255)
                                        });
                                    }
                                    color_columns.insert(packed, column);
                                    column
                                }
                            };

                            translation_beg = translation_beg.min(file);
                            model.set_voxel(pos, local_material, column, false);
                        }
                    }
                }
            }

            if model.voxel_count() == 0 {
                continue;
            }

            model.generate_visibility();
            model.pivot = model.bbox.size().as_vec3() / 2.0;

            let translation = translation_beg.as_vec3() + model.pivot;
            pending.push((model, translation, layer.visible));
        }

        let mut textures = HashMap::new();
        textures.insert(TextureType::Diffuse, Arc::new(diffuse));
        if let Some(emission) = emission {
            textures.insert(TextureType::Emission, Arc::new(emission));
        }

        let mut scene = VoxelScene::new();
        for (mut model, translation, visible) in pending {
            model.textures = textures.clone();
            let model = Arc::new(model);

            let mut node = SceneNode::with_model(model.clone());
            node.position = Vec3::new(translation.x, translation.z, -translation.y);
            node.visible = visible;

            scene.root.add_child(node);
            scene.models.push(model);
        }

        Ok(scene)
    }
}

fn read_layer(reader: &mut Reader, size: usize, bbox: &mut BBox) -> Result<Layer> {
    let start = reader.offset();

    let count = reader.read_i32()?.max(0);
    let mut layer = Layer {
        name: String::new(),
        material: 0,
        visible: true,
        blocks: Vec::with_capacity(count as usize),
    };

    for _ in 0..count {
        let index = reader.read_i32()?.max(0) as usize;
        let pos = reader.read_ivec3()?;
        reader.skip(4)?;

        // Track the scene bounds in y-up space.
        bbox.merge(&BBox::new(
            IVec3::new(pos.x, pos.z, pos.y),
            IVec3::new(pos.x + 16, pos.z + 16, pos.y + 16),
        ));

        layer.blocks.push(Block { index, pos });
    }

    for (key, value) in read_dict(reader, start, size)? {
        match key.as_str() {
            "name" => layer.name = String::from_utf8_lossy(&value).into_owned(),
            "material" => layer.material = read_dict_i32(&value)?.max(0) as usize,
            "visible" => layer.visible = read_dict_i32(&value)? != 0,
            _ => {}
        }
    }

    Ok(layer)
}

fn read_material(reader: &mut Reader, size: usize) -> Result<MaterialRef> {
    let start = reader.offset();
    let mut material = Material::default();

    for (key, value) in read_dict(reader, start, size)? {
        match key.as_str() {
            "color" => {
                if value.len() >= 16 {
                    let alpha = f32::from_le_bytes([value[12], value[13], value[14], value[15]]);
                    material.transparency = 1.0 - alpha;
                }
            }
            "metallic" => material.metallic = read_dict_f32(&value)?,
            "roughness" => material.roughness = read_dict_f32(&value)?,
            "emission" => material.power = read_dict_f32(&value)?,
            _ => {}
        }
    }

    Ok(MaterialRef::new(material))
}

/// Reads `(i32 length, key, i32 length, value)` pairs until the chunk is
/// consumed.
fn read_dict(reader: &mut Reader, start: usize, size: usize) -> Result<Vec<(String, Vec<u8>)>> {
    let mut dict = Vec::new();
    while reader.offset() - start < size {
        let len = reader.read_i32()?.max(0) as usize;
        let key = String::from_utf8_lossy(reader.read_bytes(len)?).into_owned();
        let len = reader.read_i32()?.max(0) as usize;
        let value = reader.read_bytes(len)?.to_vec();
        dict.push((key, value));
    }
    Ok(dict)
}

fn read_dict_i32(value: &[u8]) -> Result<i32> {
    if value.len() < 4 {
        return Err(Error::Parse("short integer dictionary value".into()));
    }
    Ok(i32::from_le_bytes([value[0], value[1], value[2], value[3]]))
}

fn read_dict_f32(value: &[u8]) -> Result<f32> {
    if value.len() < 4 {
        return Err(Error::Parse("short float dictionary value".into()));
    }
    Ok(f32::from_le_bytes([value[0], value[1], value[2], value[3]]))
}

#[cfg(test)]
mod test {
    use crate::stream::Writer;

    use super::*;

    fn block_png(voxel: (i32, i32, i32), color: Color) -> Vec<u8> {
        let mut pixels = Texture::with_size(64, 64);
        let (x, y, z) = voxel;
        let index = (x + y * 16 + z * 256) as u32;
        pixels.set_pixel(index % 64, index / 64, color);
        pixels.as_png().unwrap()
    }

    fn dict_entry(writer: &mut Writer, key: &str, value: &[u8]) {
        writer.write_i32(key.len() as i32);
        writer.write_bytes(key.as_bytes());
        writer.write_i32(value.len() as i32);
        writer.write_bytes(value);
    }

    fn tiny_gox() -> Vec<u8> {
        let mut file = Writer::new();
        file.write_bytes(b"GOX ");
        file.write_i32(2);

        // One material.
        let mut mate = Writer::new();
        let color: Vec<u8> = [1.0f32, 1.0, 1.0, 1.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        dict_entry(&mut mate, "color", &color);
        dict_entry(&mut mate, "metallic", &0.5f32.to_le_bytes());
        dict_entry(&mut mate, "roughness", &0.25f32.to_le_bytes());
        dict_entry(&mut mate, "emission", &0.0f32.to_le_bytes());
        let mate = mate.into_bytes();
        file.write_bytes(b"MATE");
        file.write_i32(mate.len() as i32);
        file.write_bytes(&mate);
        file.write_i32(0); // crc

        // One block with a single voxel at (3, 1, 2) in file space.
        let png = block_png((3, 1, 2), Color::new(200, 10, 10, 255));
        file.write_bytes(b"BL16");
        file.write_i32(png.len() as i32);
        file.write_bytes(&png);
        file.write_i32(0); // crc

        // One layer placing that block at the origin.
        let mut layr = Writer::new();
        layr.write_i32(1); // block count
        layr.write_i32(0); // block index
        layr.write_ivec3(IVec3::ZERO);
        layr.write_i32(0); // reserved
        dict_entry(&mut layr, "name", b"layer0");
        dict_entry(&mut layr, "material", &0i32.to_le_bytes());
        dict_entry(&mut layr, "visible", &1i32.to_le_bytes());
        let layr = layr.into_bytes();
        file.write_bytes(b"LAYR");
        file.write_i32(layr.len() as i32);
        file.write_bytes(&layr);
        file.write_i32(0); // crc

        file.into_bytes()
    }

    #[test]
    fn rejects_wrong_versions() {
        let mut bytes = tiny_gox();
        bytes[4..8].copy_from_slice(&1i32.to_le_bytes());
        assert!(matches!(
            GoxelFormat.load(&bytes),
            Err(Error::VersionUnsupported(_))
        ));
    }

    #[test]
    fn imports_a_layer_with_its_material() {
        let scene = GoxelFormat.load(&tiny_gox()).unwrap();
        assert_eq!(scene.models.len(), 1);

        let model = &scene.models[0];
        assert_eq!(model.name, "layer0");
        assert_eq!(model.voxel_count(), 1);

        // File (3, 1, 2) z-up becomes (size.x - 3, 2, 1) y-up.
        let pos = IVec3::new(16 - 3, 2, 1);
        let voxel = model.get_voxel(pos).expect("converted voxel position");

        let material = model.material(voxel.material);
        assert_eq!(material.metallic, 0.5);
        assert_eq!(material.roughness, 0.25);
    }

    #[test]
    fn palette_holds_the_voxel_color() {
        let scene = GoxelFormat.load(&tiny_gox()).unwrap();
        let model = &scene.models[0];
        let palette = model.palette(TextureType::Diffuse).unwrap();
        assert_eq!(palette.get_pixel(0, 0), Color::new(200, 10, 10, 255));
    }
}
