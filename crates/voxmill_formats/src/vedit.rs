//! The editor-native `.vedit` format.
//!
//! The only format with a full round trip: voxels (including visibility
//! masks), materials, palettes, pivots and the scene tree all survive.
//!
//! Layout: a header (`VEDIT`, version 1, a fixed 23-byte program version),
//! then `(i32 type, u32 size, payload)` sections. Dictionaries inside
//! sections are typed key/value lists; keys dispatch over their Adler-32
//! checksum. The voxel payload is zlib-compressed at level 6. Unknown
//! sections and unread trailing bytes of known sections are skipped to the
//! declared size, which keeps newer files readable.

use std::collections::HashMap;
use std::io::{Read, Write as _};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use glam::{IVec3, Vec3};
use tracing::trace;
use voxmill_voxel::{
    Color, Material, MaterialRef, SceneNode, Texture, TextureType, Visibility, VoxelModel,
    VoxelScene,
};

use crate::stream::{Reader, Writer};
use crate::{Error, Result, VoxelFormat};

const SIGNATURE: &[u8; 5] = b"VEDIT";
const VERSION: i32 = 1;
const PROGRAM_VERSION_LEN: usize = 23;

mod section {
    pub const META: i32 = 0;
    pub const MATERIAL: i32 = 1;
    pub const COLORPALETTE: i32 = 2;
    pub const VOXELS: i32 = 3;
    pub const SCENE_TREE: i32 = 4;
    pub const TEXTURE_PLANES: i32 = 5;
}

mod any_type {
    pub const STRING: u8 = 0;
    pub const FLOAT: u8 = 1;
    pub const INT32: u8 = 2;
    pub const UINT32: u8 = 3;
    pub const VECTOR3I: u8 = 4;
}

/// Adler-32 as used for dictionary key dispatch.
const fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    let mut i = 0;
    while i < data.len() {
        a = (a + data[i] as u32) % MOD;
        b = (b + a) % MOD;
        i += 1;
    }
    (b << 16) | a
}

const KEY_NAME: u32 = adler32(b"name");
const KEY_METALLIC: u32 = adler32(b"metallic");
const KEY_SPECULAR: u32 = adler32(b"specular");
const KEY_ROUGHNESS: u32 = adler32(b"roughness");
const KEY_IOR: u32 = adler32(b"ior");
const KEY_POWER: u32 = adler32(b"power");
const KEY_TRANSPARENCY: u32 = adler32(b"transparency");

#[derive(Default)]
pub struct VEditFormat;

impl VoxelFormat for VEditFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        load_scene(data)
    }

    fn save(&mut self, scene: &VoxelScene) -> Result<Vec<u8>> {
        save_scene(scene)
    }
}

fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    encoder.write_all(data).expect("in-memory zlib write");
    encoder.finish().expect("in-memory zlib finish")
}

fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::Parse(format!("bad zlib stream: {e}")))?;
    Ok(out)
}

//////////////////////////////////////////////////
// Saving
//////////////////////////////////////////////////

fn save_scene(scene: &VoxelScene) -> Result<Vec<u8>> {
    let mut file = Writer::new();

    // Header.
    file.write_bytes(SIGNATURE);
    file.write_i32(VERSION);
    let mut program = [0u8; PROGRAM_VERSION_LEN];
    let stamp = env!("CARGO_PKG_VERSION").as_bytes();
    program[..stamp.len().min(PROGRAM_VERSION_LEN)]
        .copy_from_slice(&stamp[..stamp.len().min(PROGRAM_VERSION_LEN)]);
    file.write_bytes(&program);

    // One unique index per material handle across all models.
    let mut materials: Vec<MaterialRef> = Vec::new();
    let mut material_ids: Vec<(usize, u32)> = Vec::new();
    for model in &scene.models {
        for material in &model.materials {
            let key = Arc::as_ptr(material) as usize;
            if !material_ids.iter().any(|&(k, _)| k == key) {
                material_ids.push((key, materials.len() as u32));
                materials.push(material.clone());
            }
        }
    }
    let material_id = |material: &MaterialRef| -> u32 {
        let key = Arc::as_ptr(material) as usize;
        material_ids
            .iter()
            .find(|&&(k, _)| k == key)
            .map(|&(_, id)| id)
            .unwrap_or(0)
    };

    for material in &materials {
        write_material_section(&mut file, material);
    }

    if let Some(model) = scene.models.first() {
        if let Some(palette) = model.palette(TextureType::Diffuse) {
            write_palette_section(&mut file, palette);
        }
    }

    for model in &scene.models {
        write_voxels_section(&mut file, model, &material_id);
    }

    write_scene_tree_section(&mut file, scene);

    Ok(file.into_bytes())
}

fn write_section(file: &mut Writer, kind: i32, payload: &[u8]) {
    file.write_i32(kind);
    file.write_u32(payload.len() as u32);
    file.write_bytes(payload);
}

fn write_dict_string(dict: &mut Writer, key: &str, value: &str) {
    dict.write_str_u32(key);
    dict.write_u8(any_type::STRING);
    dict.write_str_u32(value);
}

fn write_dict_float(dict: &mut Writer, key: &str, value: f32) {
    dict.write_str_u32(key);
    dict.write_u8(any_type::FLOAT);
    dict.write_f32(value);
}

fn write_material_section(file: &mut Writer, material: &Material) {
    let mut payload = Writer::new();
    payload.write_u32(7);
    write_dict_string(&mut payload, "name", "");
    write_dict_float(&mut payload, "metallic", material.metallic);
    write_dict_float(&mut payload, "specular", material.specular);
    write_dict_float(&mut payload, "roughness", material.roughness);
    write_dict_float(&mut payload, "ior", material.ior);
    write_dict_float(&mut payload, "power", material.power);
    write_dict_float(&mut payload, "transparency", material.transparency);

    write_section(file, section::MATERIAL, payload.as_bytes());
}

fn write_palette_section(file: &mut Writer, palette: &Texture) {
    let mut colors = Writer::new();
    colors.write_u32(palette.pixels().len() as u32);
    for &pixel in palette.pixels() {
        let color = Color::from_rgba(pixel);
        colors.write_bytes(&[color.r, color.g, color.b, color.a]);
    }
    let compressed = zlib_compress(colors.as_bytes());

    let mut payload = Writer::new();
    payload.write_u32(0); // name
    payload.write_u32(compressed.len() as u32);
    payload.write_bytes(&compressed);

    write_section(file, section::COLORPALETTE, payload.as_bytes());
}

fn write_voxels_section(file: &mut Writer, model: &VoxelModel, material_id: &dyn Fn(&MaterialRef) -> u32) {
    let mut voxels = Writer::new();
    voxels.write_u32(model.voxel_count() as u32);
    for (pos, voxel) in model.voxels().iter() {
        // Stored with y and z swapped, matching the on-disk convention.
        voxels.write_ivec3(IVec3::new(pos.x, pos.z, pos.y));
        voxels.write_u32(material_id(model.material(voxel.material)));
        voxels.write_u32(voxel.color as u32);
        voxels.write_u8(voxel.visibility.0);
        voxels.write_u32(0); // type, reserved
        voxels.write_u32(0); // properties, reserved
    }
    let compressed = zlib_compress(voxels.as_bytes());

    let mut payload = Writer::new();
    payload.write_u32(0); // properties
    payload.write_str_u32(&model.name);
    payload.write_u32(0); // thumbnail size
    payload.write_u32(0); // color palette id, reserved
    payload.write_f32(model.pivot.x);
    payload.write_f32(model.pivot.y);
    payload.write_f32(model.pivot.z);

    let size = model.bbox.size();
    payload.write_ivec3(IVec3::new(size.x, size.z, size.y));

    payload.write_u32(compressed.len() as u32);
    payload.write_bytes(&compressed);

    write_section(file, section::VOXELS, payload.as_bytes());
}

fn write_scene_tree_section(file: &mut Writer, scene: &VoxelScene) {
    fn write_node(tree: &mut Writer, node: &SceneNode, models: &[Arc<VoxelModel>]) {
        tree.write_str_u32(&node.name);
        for value in [node.position, node.rotation, node.scale] {
            tree.write_f32(value.x);
            tree.write_f32(value.y);
            tree.write_f32(value.z);
        }

        let model_id = node
            .model
            .as_ref()
            .and_then(|model| models.iter().position(|m| Arc::ptr_eq(m, model)))
            .map(|index| index as u32)
            .unwrap_or(u32::MAX);
        tree.write_u32(model_id);

        tree.write_u32(node.children().len() as u32);
        for child in node.children() {
            write_node(tree, child, models);
        }
    }

    let mut payload = Writer::new();
    write_node(&mut payload, &scene.root, &scene.models);
    write_section(file, section::SCENE_TREE, payload.as_bytes());
}

//////////////////////////////////////////////////
// Loading
//////////////////////////////////////////////////

fn load_scene(data: &[u8]) -> Result<VoxelScene> {
    let mut reader = Reader::new(data);

    let signature = reader.read_bytes(5)?;
    if signature != SIGNATURE {
        return Err(Error::FormatUnknown("missing VEDIT signature".into()));
    }
    let version = reader.read_i32()?;
    if version != VERSION {
        return Err(Error::VersionUnsupported(version.to_string()));
    }
    reader.skip(PROGRAM_VERSION_LEN)?;

    let mut materials: Vec<MaterialRef> = Vec::new();
    let mut palette: Option<Arc<Texture>> = None;
    let mut models: Vec<VoxelModel> = Vec::new();
    let mut tree: Option<PendingNode> = None;

    while !reader.is_eof() {
        let kind = reader.read_i32()?;
        let size = reader.read_u32()? as usize;
        let start = reader.offset();

        match kind {
            section::MATERIAL => {
                materials.push(read_material_section(&mut reader)?);
            }
            section::COLORPALETTE => {
                palette = Some(Arc::new(read_palette_section(&mut reader)?));
            }
            section::VOXELS => {
                models.push(read_voxels_section(&mut reader, &materials)?);
            }
            section::SCENE_TREE => {
                tree = Some(read_tree_node(&mut reader)?);
            }
            section::META | section::TEXTURE_PLANES => {
                // Parsed for completeness elsewhere; their content does not
                // feed the conversion pipeline.
                reader.skip(size)?;
            }
            _ => {
                reader.skip(size)?;
            }
        }

        // Forward compatibility: skip anything a newer writer appended.
        let consumed = reader.offset() - start;
        if consumed < size {
            reader.skip(size - consumed)?;
        }
    }

    trace!(models = models.len(), materials = materials.len(), "parsed vedit file");

    let mut textures = HashMap::new();
    if let Some(palette) = palette {
        textures.insert(TextureType::Diffuse, palette);
    }
    for model in &mut models {
        model.textures = textures.clone();
    }

    let models: Vec<Arc<VoxelModel>> = models.into_iter().map(Arc::new).collect();

    let mut scene = VoxelScene::new();
    match tree {
        Some(pending) => scene.root = resolve_tree(pending, &models),
        None => {
            for model in &models {
                scene.root.add_child(SceneNode::with_model(model.clone()));
            }
        }
    }
    scene.models = models;
    Ok(scene)
}

fn skip_any(reader: &mut Reader, kind: u8) -> Result<()> {
    match kind {
        any_type::STRING => {
            let len = reader.read_u32()? as usize;
            reader.skip(len)
        }
        any_type::FLOAT | any_type::INT32 | any_type::UINT32 => reader.skip(4),
        any_type::VECTOR3I => reader.skip(12),
        _ => Err(Error::Parse(format!("invalid dictionary value type {kind}"))),
    }
}

fn read_material_section(reader: &mut Reader) -> Result<MaterialRef> {
    let mut material = Material::default();

    let pairs = reader.read_u32()?;
    for _ in 0..pairs {
        let key = reader.read_str_u32()?;
        let kind = reader.read_u8()?;

        let float_value = |reader: &mut Reader| -> Result<Option<f32>> {
            if kind == any_type::FLOAT {
                Ok(Some(reader.read_f32()?))
            } else {
                skip_any(reader, kind)?;
                Ok(None)
            }
        };

        match adler32(key.as_bytes()) {
            KEY_NAME => {
                // Material names are not kept in the data model.
                skip_any(reader, kind)?;
            }
            KEY_METALLIC => {
                if let Some(value) = float_value(reader)? {
                    material.metallic = value;
                }
            }
            KEY_SPECULAR => {
                if let Some(value) = float_value(reader)? {
                    material.specular = value;
                }
            }
            KEY_ROUGHNESS => {
                if let Some(value) = float_value(reader)? {
                    material.roughness = value;
                }
            }
            KEY_IOR => {
                if let Some(value) = float_value(reader)? {
                    material.ior = value;
                }
            }
            KEY_POWER => {
                if let Some(value) = float_value(reader)? {
                    material.power = value;
                }
            }
            KEY_TRANSPARENCY => {
                if let Some(value) = float_value(reader)? {
                    material.transparency = value;
                }
            }
            _ => skip_any(reader, kind)?,
        }
    }

    Ok(MaterialRef::new(material))
}

fn read_palette_section(reader: &mut Reader) -> Result<Texture> {
    reader.skip(4)?; // name
    let compressed_size = reader.read_u32()? as usize;
    let data = zlib_decompress(reader.read_bytes(compressed_size)?)?;

    let mut colors = Reader::new(&data);
    let count = colors.read_u32()?;
    let mut palette = Texture::new();
    for _ in 0..count {
        let bytes = colors.read_bytes(4)?;
        palette.add_pixel(Color::new(bytes[0], bytes[1], bytes[2], bytes[3]));
    }
    Ok(palette)
}

fn read_voxels_section(reader: &mut Reader, materials: &[MaterialRef]) -> Result<VoxelModel> {
    reader.skip(4)?; // properties
    let name = reader.read_str_u32()?;

    let thumbnail_size = reader.read_u32()? as usize;
    reader.skip(thumbnail_size)?;
    reader.skip(4)?; // color palette id

    let pivot = Vec3::new(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?);
    let _size = reader.read_ivec3()?;

    let compressed_size = reader.read_u32()? as usize;
    let data = zlib_decompress(reader.read_bytes(compressed_size)?)?;

    let mut model = VoxelModel::new();
    model.name = name;
    model.pivot = pivot;

    // File material index → per-model material index.
    let mut local_materials: HashMap<u32, u8> = HashMap::new();

    let mut voxels = Reader::new(&data);
    let count = voxels.read_u32()?;
    for _ in 0..count {
        let stored = voxels.read_ivec3()?;
        let pos = IVec3::new(stored.x, stored.z, stored.y);

        let material_index = voxels.read_u32()?;
        let color = voxels.read_u32()?;
        let mask = voxels.read_u8()?;
        voxels.skip(8)?; // reserved type + properties

        let material = materials
            .get(material_index as usize)
            .cloned()
            .unwrap_or_else(|| MaterialRef::new(Material::default()));
        let transparent = material.is_transparent();

        let local_index = match local_materials.get(&material_index) {
            Some(&index) => index,
            None => {
                model.materials.push(material);
                let index = (model.materials.len() - 1) as u8;
                local_materials.insert(material_index, index);
                index
            }
        };

        model.set_voxel_with_mask(
            pos,
            local_index,
            color.min(255) as u8,
            transparent,
            Visibility(mask),
        );
    }

    Ok(model)
}

struct PendingNode {
    name: String,
    position: Vec3,
    rotation: Vec3,
    scale: Vec3,
    model: Option<u32>,
    children: Vec<PendingNode>,
}

fn read_tree_node(reader: &mut Reader) -> Result<PendingNode> {
    let name = reader.read_str_u32()?;
    let mut vectors = [Vec3::ZERO; 3];
    for value in &mut vectors {
        *value = Vec3::new(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?);
    }

    let model = match reader.read_u32()? {
        u32::MAX => None,
        index => Some(index),
    };

    let count = reader.read_u32()?;
    let mut children = Vec::with_capacity(count as usize);
    for _ in 0..count {
        children.push(read_tree_node(reader)?);
    }

    Ok(PendingNode {
        name,
        position: vectors[0],
        rotation: vectors[1],
        scale: vectors[2],
        model,
        children,
    })
}

fn resolve_tree(pending: PendingNode, models: &[Arc<VoxelModel>]) -> SceneNode {
    let mut node = SceneNode::new();
    node.name = pending.name;
    node.position = pending.position;
    node.rotation = pending.rotation;
    node.scale = pending.scale;
    node.model = pending
        .model
        .and_then(|index| models.get(index as usize).cloned());

    for child in pending.children {
        node.add_child(resolve_tree(child, models));
    }
    node
}
