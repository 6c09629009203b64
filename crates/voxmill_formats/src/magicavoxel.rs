//! MagicaVoxel `.vox` import.
//!
//! Reference: <https://github.com/ephtracy/voxel-model/blob/master/MagicaVoxel-file-format-vox.txt>
//!
//! The file's up axis is `z` and its coordinate system is left-handed; the
//! importer converts to right-handed y-up by reading vectors in `x z y`
//! order and mirroring `x`. Multi-frame shape nodes seed animations.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec3, Mat4, Vec3, Vec4};
use tracing::trace;
use voxmill_math::transform;
use voxmill_voxel::{
    Color, Material, MaterialRef, SceneNode, Texture, TextureType, VoxelAnimation, VoxelModel,
    VoxelScene,
};

use crate::stream::Reader;
use crate::{Error, Result, VoxelFormat};

/// The default palette from the official format documentation, used when the
/// file carries no `RGBA` chunk. Byte order per entry is `r g b a` (little
/// endian).
pub const DEFAULT_PALETTE: [u32; 256] = [
    0x00000000, 0xffffffff, 0xffccffff, 0xff99ffff, 0xff66ffff, 0xff33ffff, 0xff00ffff, 0xffffccff,
    0xffccccff, 0xff99ccff, 0xff66ccff, 0xff33ccff, 0xff00ccff, 0xffff99ff, 0xffcc99ff, 0xff9999ff,
    0xff6699ff, 0xff3399ff, 0xff0099ff, 0xffff66ff, 0xffcc66ff, 0xff9966ff, 0xff6666ff, 0xff3366ff,
    0xff0066ff, 0xffff33ff, 0xffcc33ff, 0xff9933ff, 0xff6633ff, 0xff3333ff, 0xff0033ff, 0xffff00ff,
    0xffcc00ff, 0xff9900ff, 0xff6600ff, 0xff3300ff, 0xff0000ff, 0xffffffcc, 0xffccffcc, 0xff99ffcc,
    0xff66ffcc, 0xff33ffcc, 0xff00ffcc, 0xffffcccc, 0xffcccccc, 0xff99cccc, 0xff66cccc, 0xff33cccc,
    0xff00cccc, 0xffff99cc, 0xffcc99cc, 0xff9999cc, 0xff6699cc, 0xff3399cc, 0xff0099cc, 0xffff66cc,
    0xffcc66cc, 0xff9966cc, 0xff6666cc, 0xff3366cc, 0xff0066cc, 0xffff33cc, 0xffcc33cc, 0xff9933cc,
    0xff6633cc, 0xff3333cc, 0xff0033cc, 0xffff00cc, 0xffcc00cc, 0xff9900cc, 0xff6600cc, 0xff3300cc,
    0xff0000cc, 0xffffff99, 0xffccff99, 0xff99ff99, 0xff66ff99, 0xff33ff99, 0xff00ff99, 0xffffcc99,
    0xffcccc99, 0xff99cc99, 0xff66cc99, 0xff33cc99, 0xff00cc99, 0xffff9999, 0xffcc9999, 0xff999999,
    0xff669999, 0xff339999, 0xff009999, 0xffff6699, 0xffcc6699, 0xff996699, 0xff666699, 0xff336699,
    0xff006699, 0xffff3399, 0xffcc3399, 0xff993399, 0xff663399, 0xff333399, 0xff003399, 0xffff0099,
    0xffcc0099, 0xff990099, 0xff660099, 0xff330099, 0xff000099, 0xffffff66, 0xffccff66, 0xff99ff66,
    0xff66ff66, 0xff33ff66, 0xff00ff66, 0xffffcc66, 0xffcccc66, 0xff99cc66, 0xff66cc66, 0xff33cc66,
    0xff00cc66, 0xffff9966, 0xffcc9966, 0xff999966, 0xff669966, 0xff339966, 0xff009966, 0xffff6666,
    0xffcc6666, 0xff996666, 0xff666666, 0xff336666, 0xff006666, 0xffff3366, 0xffcc3366, 0xff993366,
    0xff663366, 0xff333366, 0xff003366, 0xffff0066, 0xffcc0066, 0xff990066, 0xff660066, 0xff330066,
    0xff000066, 0xffffff33, 0xffccff33, 0xff99ff33, 0xff66ff33, 0xff33ff33, 0xff00ff33, 0xffffcc33,
    0xffcccc33, 0xff99cc33, 0xff66cc33, 0xff33cc33, 0xff00cc33, 0xffff9933, 0xffcc9933, 0xff999933,
    0xff669933, 0xff339933, 0xff009933, 0xffff6633, 0xffcc6633, 0xff996633, 0xff666633, 0xff336633,
    0xff006633, 0xffff3333, 0xffcc3333, 0xff993333, 0xff663333, 0xff333333, 0xff003333, 0xffff0033,
    0xffcc0033, 0xff990033, 0xff660033, 0xff330033, 0xff000033, 0xffffff00, 0xffccff00, 0xff99ff00,
    0xff66ff00, 0xff33ff00, 0xff00ff00, 0xffffcc00, 0xffcccc00, 0xff99cc00, 0xff66cc00, 0xff33cc00,
    0xff00cc00, 0xffff9900, 0xffcc9900, 0xff999900, 0xff669900, 0xff339900, 0xff009900, 0xffff6600,
    0xffcc6600, 0xff996600, 0xff666600, 0xff336600, 0xff006600, 0xffff3300, 0xffcc3300, 0xff993300,
    0xff663300, 0xff333300, 0xff003300, 0xffff0000, 0xffcc0000, 0xff990000, 0xff660000, 0xff330000,
    0xff0000ee, 0xff0000dd, 0xff0000bb, 0xff0000aa, 0xff000088, 0xff000077, 0xff000055, 0xff000044,
    0xff000022, 0xff000011, 0xff00ee00, 0xff00dd00, 0xff00bb00, 0xff00aa00, 0xff008800, 0xff007700,
    0xff005500, 0xff004400, 0xff002200, 0xff001100, 0xffee0000, 0xffdd0000, 0xffbb0000, 0xffaa0000,
    0xff880000, 0xff770000, 0xff550000, 0xff440000, 0xff220000, 0xff110000, 0xffeeeeee, 0xffdddddd,
    0xffbbbbbb, 0xffaaaaaa, 0xff888888, 0xff777777, 0xff555555, 0xff444444, 0xff222222, 0xff111111,
];

#[derive(Default)]
pub struct MagicaVoxelFormat;

impl VoxelFormat for MagicaVoxelFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        Loader::new(data)?.load()
    }
}

struct ChunkHeader {
    id: [u8; 4],
    content_size: u32,
    children_size: u32,
}

fn read_chunk_header(reader: &mut Reader) -> Result<ChunkHeader> {
    let id = reader.read_bytes(4)?;
    Ok(ChunkHeader {
        id: [id[0], id[1], id[2], id[3]],
        content_size: reader.read_u32()?,
        children_size: reader.read_u32()?,
    })
}

/// Reads a `.vox` dictionary: `u32` pair count, then length-prefixed key and
/// value strings.
fn read_dict(reader: &mut Reader) -> Result<Vec<(String, String)>> {
    let pairs = reader.read_u32()?;
    let mut dict = Vec::with_capacity(pairs as usize);
    for _ in 0..pairs {
        let key = reader.read_str_u32()?;
        let value = reader.read_str_u32()?;
        dict.push((key, value));
    }
    Ok(dict)
}

struct ShapeFrame {
    model_id: i32,
    frame: i32,
}

enum GraphNode {
    Transform {
        name: String,
        child: i32,
        translation: Vec3,
        rotation: Vec3,
    },
    Group {
        children: Vec<i32>,
    },
    Shape {
        frames: Vec<ShapeFrame>,
    },
}

/// Scene skeleton before models exist.
#[derive(Default)]
struct NodeTemp {
    name: String,
    translation: Vec3,
    rotation: Vec3,
    children: Vec<NodeTemp>,
    model_ids: Vec<i32>,
}

struct Loader<'a> {
    data: &'a [u8],
    palette: [Color; 256],
    materials: Vec<MaterialRef>,
    /// 1-based palette index → material table index.
    material_map: HashMap<i32, usize>,
    /// 1-based palette index → compacted palette column.
    color_map: Vec<(u8, u8)>,
    used_colors: u8,
    has_emission: bool,
    graph: HashMap<i32, GraphNode>,
}

impl<'a> Loader<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let signature = reader.read_bytes(4)?;
        if signature != b"VOX " {
            return Err(Error::FormatUnknown("missing VOX signature".into()));
        }
        let version = reader.read_i32()?;
        if version < 150 {
            return Err(Error::VersionUnsupported(version.to_string()));
        }

        let mut palette = [Color::TRANSPARENT; 256];
        for (slot, &packed) in palette.iter_mut().zip(DEFAULT_PALETTE.iter()) {
            *slot = Color::from_rgba(packed);
        }

        Ok(Self {
            data,
            palette,
            materials: vec![MaterialRef::new(Material::default())],
            material_map: HashMap::new(),
            color_map: Vec::new(),
            used_colors: 0,
            has_emission: false,
            graph: HashMap::new(),
        })
    }

    fn load(mut self) -> Result<VoxelScene> {
        // The materials and the scene graph live at the end of the file, but
        // models reference them, so they are parsed in a first pass.
        self.scan_graph_and_materials()?;

        let mut reader = Reader::new(self.data);
        reader.seek(8)?;

        let mut models: Vec<VoxelModel> = Vec::new();
        let mut pending_size: Option<IVec3> = None;

        let main = read_chunk_header(&mut reader)?;
        if &main.id != b"MAIN" {
            return Err(Error::Parse("expected MAIN chunk".into()));
        }

        while !reader.is_eof() {
            let header = read_chunk_header(&mut reader)?;
            match &header.id {
                b"SIZE" => {
                    // z is the file's up axis: read x z y.
                    let x = reader.read_i32()?;
                    let z = reader.read_i32()?;
                    let y = reader.read_i32()?;
                    pending_size = Some(IVec3::new(x, y, z));
                }
                b"XYZI" => {
                    let size = pending_size
                        .take()
                        .ok_or_else(|| Error::Parse("XYZI without a SIZE chunk".into()))?;
                    models.push(self.read_xyzi(&mut reader, size)?);
                }
                b"RGBA" => {
                    for slot in self.palette.iter_mut() {
                        let bytes = reader.read_bytes(4)?;
                        *slot = Color::new(bytes[0], bytes[1], bytes[2], bytes[3]);
                    }
                }
                _ => {
                    reader.skip((header.content_size + header.children_size) as usize)?;
                }
            }
        }

        trace!(models = models.len(), "parsed vox models");

        // Compacted color palette(s).
        let mut diffuse = Texture::with_size(self.used_colors.max(1) as u32, 1);
        let mut emission = self
            .has_emission
            .then(|| Texture::with_size(self.used_colors.max(1) as u32, 1));

        for &(palette_index, column) in &self.color_map {
            let color = self.palette[palette_index.max(1) as usize - 1];
            diffuse.set_pixel(column as u32, 0, color);

            if let Some(emission) = emission.as_mut() {
                let material_index = self
                    .material_map
                    .get(&(palette_index as i32))
                    .copied()
                    .unwrap_or(0);
                if self.materials[material_index].is_emissive() {
                    emission.set_pixel(column as u32, 0, color);
                }
            }
        }

        let mut textures = HashMap::new();
        textures.insert(TextureType::Diffuse, Arc::new(diffuse));
        if let Some(emission) = emission {
            textures.insert(TextureType::Emission, Arc::new(emission));
        }

        for model in &mut models {
            model.textures = textures.clone();
            model.generate_visibility();
        }

        self.assemble_scene(models)
    }

    /// First pass over the chunk tree: MATL entries and the nTRN/nGRP/nSHP
    /// graph.
    fn scan_graph_and_materials(&mut self) -> Result<()> {
        let mut reader = Reader::new(self.data);
        reader.seek(8)?;

        let main = read_chunk_header(&mut reader)?;
        if &main.id != b"MAIN" {
            return Err(Error::Parse("expected MAIN chunk".into()));
        }

        while !reader.is_eof() {
            let header = read_chunk_header(&mut reader)?;
            match &header.id {
                b"MATL" => self.read_material(&mut reader)?,
                b"nTRN" => {
                    let (id, node) = read_transform_node(&mut reader)?;
                    self.graph.insert(id, node);
                }
                b"nGRP" => {
                    let (id, node) = read_group_node(&mut reader)?;
                    self.graph.insert(id, node);
                }
                b"nSHP" => {
                    let (id, node) = read_shape_node(&mut reader)?;
                    self.graph.insert(id, node);
                }
                _ => {
                    reader.skip((header.content_size + header.children_size) as usize)?;
                }
            }
        }

        Ok(())
    }

    fn read_material(&mut self, reader: &mut Reader) -> Result<()> {
        let id = reader.read_i32()?;
        let dict = read_dict(reader)?;

        let mut material = Material::default();
        let mut kind = String::new();
        for (key, value) in dict {
            let number = || value.parse::<f32>().map_err(|_| {
                Error::Parse(format!("bad numeric value {value:?} for material key {key}"))
            });
            match key.as_str() {
                "_type" => kind = value.clone(),
                "_metal" => material.metallic = number()?,
                "_alpha" => material.transparency = number()?,
                "_rough" => material.roughness = number()?,
                "_spec" => material.specular = number()?,
                "_ior" => material.ior = number()?,
                "_flux" => {
                    material.power = number()?;
                    self.has_emission = true;
                }
                _ => {}
            }
        }

        // Plain diffuse entries collapse onto the default material.
        if kind.is_empty() || kind == "_diffuse" {
            self.material_map.insert(id, 0);
        } else {
            self.materials.push(MaterialRef::new(material));
            self.material_map.insert(id, self.materials.len() - 1);
        }
        Ok(())
    }

    fn read_xyzi(&mut self, reader: &mut Reader, size: IVec3) -> Result<VoxelModel> {
        let count = reader.read_i32()?;
        let mut model = VoxelModel::new();
        // Shared material table index → per-model index.
        let mut local_materials: HashMap<usize, u8> = HashMap::new();

        for _ in 0..count {
            let bytes = reader.read_bytes(4)?;
            let palette_index = bytes[3];

            // x z y read order plus an x mirror for the handedness switch.
            let pos = IVec3::new(
                (size.x - 1) - bytes[0] as i32,
                bytes[2] as i32,
                bytes[1] as i32,
            );

            let column = match self
                .color_map
                .iter()
                .find(|(index, _)| *index == palette_index)
            {
                Some(&(_, column)) => column,
                None => {
                    let column = self.used_colors;
                    self.color_map.push((palette_index, column));
                    self.used_colors = self.used_colors.wrapping_add(1);
                    column
                }
            };

            let shared_index = self
                .material_map
                .get(&(palette_index as i32))
                .copied()
                .unwrap_or(0);
            let transparent = self.materials[shared_index].is_transparent();

            let local_index = match local_materials.get(&shared_index) {
                Some(&index) => index,
                None => {
                    // The model's slot 0 already is the default material.
                    let index = if shared_index == 0 {
                        0
                    } else {
                        model.materials.push(self.materials[shared_index].clone());
                        (model.materials.len() - 1) as u8
                    };
                    local_materials.insert(shared_index, index);
                    index
                }
            };

            model.set_voxel(pos, local_index, column, transparent);
        }

        Ok(model)
    }

    /// Flattens the node graph and attaches the parsed models.
    fn assemble_scene(&self, models: Vec<VoxelModel>) -> Result<VoxelScene> {
        let models: Vec<Arc<VoxelModel>> = models.into_iter().map(Arc::new).collect();
        let mut scene = VoxelScene::new();
        let mut animations: Vec<Arc<VoxelAnimation>> = Vec::new();

        if self.graph.is_empty() {
            for model in &models {
                scene.root.add_child(SceneNode::with_model(model.clone()));
            }
            scene.models = models;
            return Ok(scene);
        }

        let temp = self.build_temp(0)?;
        let root = resolve_temp(&temp, &models, &mut animations);
        // The synthetic root from node 0 becomes the scene root itself.
        scene.root = root;
        scene.models = models;
        scene.animations = animations;
        Ok(scene)
    }

    fn build_temp(&self, id: i32) -> Result<NodeTemp> {
        match self.graph.get(&id) {
            Some(GraphNode::Transform {
                name,
                child,
                translation,
                rotation,
            }) => {
                let mut temp = self.build_temp(*child)?;
                temp.name = name.clone();
                temp.translation = *translation;
                temp.rotation = *rotation;
                Ok(temp)
            }
            Some(GraphNode::Group { children }) => {
                let mut temp = NodeTemp::default();
                for &child in children {
                    temp.children.push(self.build_temp(child)?);
                }
                Ok(temp)
            }
            Some(GraphNode::Shape { frames }) => {
                let mut temp = NodeTemp::default();
                temp.model_ids = frames.iter().map(|f| f.model_id).collect();
                Ok(temp)
            }
            None => Err(Error::Parse(format!("scene graph references unknown node {id}"))),
        }
    }
}

fn resolve_temp(
    temp: &NodeTemp,
    models: &[Arc<VoxelModel>],
    animations: &mut Vec<Arc<VoxelAnimation>>,
) -> SceneNode {
    let mut node = SceneNode::new();
    node.name = temp.name.clone();
    node.position = temp.translation;
    node.rotation = temp.rotation;

    let linked: Vec<Arc<VoxelModel>> = temp
        .model_ids
        .iter()
        .filter_map(|&id| models.get(id as usize).cloned())
        .collect();

    if let Some(first) = linked.first() {
        // The file stores node positions relative to the voxel space center.
        let half = first.bbox.size().as_vec3() / 2.0;
        node.position -= half;

        if linked.len() > 1 {
            let mut animation = VoxelAnimation::new();
            let mut time = 0;
            for model in &linked {
                time += VoxelAnimation::FRAME_TIME;
                animation.add_frame(model.clone(), time);
            }
            let animation = Arc::new(animation);
            animations.push(animation.clone());
            node.animation = Some(animation);
        } else {
            node.model = Some(first.clone());
        }
    }

    for child in &temp.children {
        node.add_child(resolve_temp(child, models, animations));
    }

    node
}

fn read_transform_node(reader: &mut Reader) -> Result<(i32, GraphNode)> {
    let id = reader.read_i32()?;

    let mut name = String::new();
    for (key, value) in read_dict(reader)? {
        if key == "_name" {
            name = value;
        }
    }

    let child = reader.read_i32()?;
    reader.skip(4)?; // reserved
    let _layer = reader.read_i32()?;

    let mut translation = Vec3::ZERO;
    let mut rotation = Vec3::ZERO;

    let frames = reader.read_i32()?;
    for frame in 0..frames {
        for (key, value) in read_dict(reader)? {
            match key.as_str() {
                "_t" if frame == 0 => {
                    let mut parts = value.split_whitespace().map(|p| p.parse::<f32>());
                    let x = parts.next().transpose().ok().flatten().unwrap_or(0.0);
                    let z = parts.next().transpose().ok().flatten().unwrap_or(0.0);
                    let y = parts.next().transpose().ok().flatten().unwrap_or(0.0);
                    translation = Vec3::new(-x, y, z);
                }
                "_r" if frame == 0 => {
                    let packed = value.parse::<u8>().unwrap_or(0);
                    rotation = decode_rotation(packed);
                }
                _ => {}
            }
        }
    }

    Ok((
        id,
        GraphNode::Transform {
            name,
            child,
            translation,
            rotation,
        },
    ))
}

/// Decodes the packed rotation byte: two axis indices in the low four bits
/// and three sign bits in bits 4-6.
fn decode_rotation(packed: u8) -> Vec3 {
    let index1 = (packed & 3) as usize;
    let index2 = ((packed >> 2) & 3) as usize;
    if index1 > 2 || index2 > 2 || index1 == index2 {
        return Vec3::ZERO;
    }
    let index3 = 3 - index1 - index2;

    // Row r of the rotation holds a +-1 at the encoded column index.
    let mut cols = [Vec4::ZERO; 4];
    cols[index1].x = if packed & 0x10 != 0 { -1.0 } else { 1.0 };
    cols[index2].y = if packed & 0x20 != 0 { -1.0 } else { 1.0 };
    cols[index3].z = if packed & 0x40 != 0 { -1.0 } else { 1.0 };
    cols[3].w = 1.0;

    let matrix = Mat4::from_cols(cols[0], cols[1], cols[2], cols[3]);
    let mut euler = transform::euler_from_mat4(&matrix);
    let tmp = euler.y;
    euler.y = euler.z;
    euler.z = tmp;
    euler
}

fn read_group_node(reader: &mut Reader) -> Result<(i32, GraphNode)> {
    let id = reader.read_i32()?;
    let _ = read_dict(reader)?;

    let count = reader.read_i32()?;
    let mut children = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        children.push(reader.read_i32()?);
    }

    Ok((id, GraphNode::Group { children }))
}

fn read_shape_node(reader: &mut Reader) -> Result<(i32, GraphNode)> {
    let id = reader.read_i32()?;
    let _ = read_dict(reader)?;

    let count = reader.read_i32()?;
    let mut frames = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let model_id = reader.read_i32()?;
        let mut frame = 0;
        for (key, value) in read_dict(reader)? {
            if key == "_f" {
                frame = value.parse().unwrap_or(0);
            }
        }
        frames.push(ShapeFrame { model_id, frame });
    }
    frames.sort_by_key(|f| f.frame);

    Ok((id, GraphNode::Shape { frames }))
}

#[cfg(test)]
mod test {
    use super::*;

    /// Builds a minimal two-voxel `.vox` file image.
    fn tiny_vox() -> Vec<u8> {
        use crate::stream::Writer;

        let mut content = Writer::new();

        // SIZE: 2x1x1 in file axes (x, y, z-up).
        content.write_bytes(b"SIZE");
        content.write_u32(12);
        content.write_u32(0);
        content.write_i32(2);
        content.write_i32(1);
        content.write_i32(1);

        // XYZI: voxels at file (0,0,0) and (1,0,0), palette entry 1.
        content.write_bytes(b"XYZI");
        content.write_u32(4 + 8);
        content.write_u32(0);
        content.write_i32(2);
        content.write_bytes(&[0, 0, 0, 1]);
        content.write_bytes(&[1, 0, 0, 1]);

        let body = content.into_bytes();

        let mut file = Writer::new();
        file.write_bytes(b"VOX ");
        file.write_i32(150);
        file.write_bytes(b"MAIN");
        file.write_u32(0);
        file.write_u32(body.len() as u32);
        file.write_bytes(&body);
        file.into_bytes()
    }

    #[test]
    fn rejects_bad_signature_and_version() {
        let mut codec = MagicaVoxelFormat::default();
        assert!(matches!(
            codec.load(b"NOPE\x96\x00\x00\x00"),
            Err(Error::FormatUnknown(_))
        ));

        let mut old = tiny_vox();
        old[4..8].copy_from_slice(&100i32.to_le_bytes());
        assert!(matches!(
            codec.load(&old),
            Err(Error::VersionUnsupported(_))
        ));
    }

    #[test]
    fn imports_voxels_with_axis_conversion() {
        let mut codec = MagicaVoxelFormat::default();
        let scene = codec.load(&tiny_vox()).unwrap();

        assert_eq!(scene.models.len(), 1);
        let model = &scene.models[0];
        assert_eq!(model.voxel_count(), 2);

        // File x mirrors: file x=0 lands at x = (2-1)-0 = 1.
        assert!(model.get_voxel(IVec3::new(1, 0, 0)).is_some());
        assert!(model.get_voxel(IVec3::new(0, 0, 0)).is_some());
    }

    #[test]
    fn default_palette_backs_the_color_table() {
        let mut codec = MagicaVoxelFormat::default();
        let scene = codec.load(&tiny_vox()).unwrap();
        let model = &scene.models[0];

        let palette = model.palette(TextureType::Diffuse).unwrap();
        // Palette entry 1 is white in the default palette.
        assert_eq!(palette.get_pixel(0, 0), Color::WHITE);
    }

    #[test]
    fn voxels_share_one_compacted_color() {
        let mut codec = MagicaVoxelFormat::default();
        let scene = codec.load(&tiny_vox()).unwrap();
        let model = &scene.models[0];

        assert_eq!(model.palette_width(), 1);
        assert_eq!(model.get_voxel(IVec3::new(0, 0, 0)).unwrap().color, 0);
    }

    #[test]
    fn rotation_byte_identity_decodes_to_zero() {
        // 0b0000100 = axes (0, 1), all signs positive: the identity.
        assert_eq!(decode_rotation(0b0000_0100), Vec3::ZERO);
    }
}
