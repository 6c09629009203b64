//! glTF 2.0 and GLB export.
//!
//! Each surface becomes one primitive with a single interleaved vertex
//! buffer (position, normal, uv in declaration order, stride =
//! `size_of::<Vertex>()`) and one index buffer. `.gltf` writes the JSON
//! document with a `.bin` sidecar and PNG textures; `.glb` embeds
//! everything in the standard two-chunk container with 4-byte alignment.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;
use voxmill_mesh::{Mesh, Vertex};
use voxmill_voxel::TextureType;

use crate::{apply_world_space, save_texture_sidecars, Error, ExportSettings, MeshExporter, Result};

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const CHUNK_JSON: u32 = 0x4E4F_534A; // "JSON"
const CHUNK_BIN: u32 = 0x004E_4942; // "BIN\0"

const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UINT: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

pub struct GltfExporter {
    settings: ExportSettings,
    binary: bool,
}

impl GltfExporter {
    pub fn new(settings: ExportSettings, binary: bool) -> Self {
        Self { settings, binary }
    }
}

#[derive(Serialize)]
struct Asset {
    version: &'static str,
    generator: &'static str,
}

#[derive(Serialize)]
struct Scene {
    nodes: Vec<usize>,
}

#[derive(Serialize)]
struct Node {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mesh: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matrix: Option<[f32; 16]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<usize>,
}

#[derive(Serialize)]
struct GltfMesh {
    primitives: Vec<Primitive>,
}

#[derive(Serialize)]
struct Primitive {
    attributes: BTreeMap<&'static str, usize>,
    indices: usize,
    material: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BufferView {
    buffer: usize,
    byte_offset: usize,
    byte_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    byte_stride: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Accessor {
    buffer_view: usize,
    #[serde(skip_serializing_if = "is_zero")]
    byte_offset: usize,
    component_type: u32,
    count: usize,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<[f32; 3]>,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PbrMetallicRoughness {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_color_texture: Option<TextureRef>,
    metallic_factor: f32,
    roughness_factor: f32,
}

#[derive(Serialize)]
struct TextureRef {
    index: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GltfMaterial {
    name: String,
    pbr_metallic_roughness: PbrMetallicRoughness,
    #[serde(skip_serializing_if = "Option::is_none")]
    emissive_factor: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emissive_texture: Option<TextureRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alpha_mode: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Image {
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buffer_view: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'static str>,
}

#[derive(Serialize)]
struct GltfTexture {
    source: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Buffer {
    byte_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    asset: Asset,
    scene: usize,
    scenes: Vec<Scene>,
    nodes: Vec<Node>,
    meshes: Vec<GltfMesh>,
    accessors: Vec<Accessor>,
    buffer_views: Vec<BufferView>,
    materials: Vec<GltfMaterial>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<Image>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    textures: Vec<GltfTexture>,
    buffers: Vec<Buffer>,
}

fn align4(buffer: &mut Vec<u8>) {
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
}

impl MeshExporter for GltfExporter {
    fn save(&mut self, path: &Path, meshes: &[Mesh]) -> Result<()> {
        if meshes.is_empty() {
            return Err(Error::InvalidArgument("nothing to export".into()));
        }
        let meshes = apply_world_space(meshes, self.settings.world_space);

        let mut binary: Vec<u8> = Vec::new();
        let mut buffer_views = Vec::new();
        let mut accessors = Vec::new();
        let mut materials = Vec::new();
        let mut nodes = Vec::new();
        let mut gltf_meshes = Vec::new();
        let mut root_nodes = Vec::new();

        let has_emission = meshes[0].textures.contains_key(&TextureType::Emission);
        let mut animation_root: Option<usize> = None;

        for mesh in &meshes {
            // Animation frames group under a shared parent node.
            if mesh.frame_time != 0 {
                let parent = *animation_root.get_or_insert_with(|| {
                    let index = nodes.len();
                    nodes.push(Node {
                        name: format!("{}_Anim", mesh.name),
                        mesh: None,
                        matrix: None,
                        children: Vec::new(),
                    });
                    root_nodes.push(index);
                    index
                });
                let child = nodes.len();
                nodes[parent].children.push(child);
            } else {
                animation_root = None;
                root_nodes.push(nodes.len());
            }

            let matrix = (!self.settings.world_space
                && mesh.model_matrix != glam::Mat4::IDENTITY)
                .then(|| mesh.model_matrix.to_cols_array());

            nodes.push(Node {
                name: mesh.name.clone(),
                mesh: Some(gltf_meshes.len()),
                matrix,
                children: Vec::new(),
            });

            let mut primitives = Vec::new();
            for surface in &mesh.surfaces {
                let vertex_bytes: &[u8] = bytemuck::cast_slice(&surface.vertices);
                let index_bytes: &[u8] = bytemuck::cast_slice(&surface.indices);

                let vertex_view = buffer_views.len();
                buffer_views.push(BufferView {
                    buffer: 0,
                    byte_offset: binary.len(),
                    byte_length: vertex_bytes.len(),
                    byte_stride: Some(std::mem::size_of::<Vertex>()),
                    target: Some(TARGET_ARRAY_BUFFER),
                });
                binary.extend_from_slice(vertex_bytes);

                let index_view = buffer_views.len();
                buffer_views.push(BufferView {
                    buffer: 0,
                    byte_offset: binary.len(),
                    byte_length: index_bytes.len(),
                    byte_stride: None,
                    target: Some(TARGET_ELEMENT_ARRAY_BUFFER),
                });
                binary.extend_from_slice(index_bytes);

                let (min, max) = position_bounds(&surface.vertices);

                let position_accessor = accessors.len();
                accessors.push(Accessor {
                    buffer_view: vertex_view,
                    byte_offset: 0,
                    component_type: COMPONENT_FLOAT,
                    count: surface.vertices.len(),
                    kind: "VEC3",
                    min: Some(min),
                    max: Some(max),
                });
                accessors.push(Accessor {
                    buffer_view: vertex_view,
                    byte_offset: 12,
                    component_type: COMPONENT_FLOAT,
                    count: surface.vertices.len(),
                    kind: "VEC3",
                    min: None,
                    max: None,
                });
                accessors.push(Accessor {
                    buffer_view: vertex_view,
                    byte_offset: 24,
                    component_type: COMPONENT_FLOAT,
                    count: surface.vertices.len(),
                    kind: "VEC2",
                    min: None,
                    max: None,
                });
                accessors.push(Accessor {
                    buffer_view: index_view,
                    byte_offset: 0,
                    component_type: COMPONENT_UINT,
                    count: surface.indices.len(),
                    kind: "SCALAR",
                    min: None,
                    max: None,
                });

                let material = &surface.material;
                let material_index = materials.len();
                materials.push(GltfMaterial {
                    name: format!("Mat{}", material_index + 1),
                    pbr_metallic_roughness: PbrMetallicRoughness {
                        base_color_texture: Some(TextureRef { index: 0 }),
                        metallic_factor: material.metallic,
                        roughness_factor: material.roughness,
                    },
                    emissive_factor: (material.power > 0.0).then(|| {
                        let level = material.power.min(1.0);
                        [level, level, level]
                    }),
                    emissive_texture: (material.power > 0.0 && has_emission)
                        .then(|| TextureRef { index: 1 }),
                    alpha_mode: (material.transparency > 0.0).then(|| "BLEND"),
                });

                let mut attributes = BTreeMap::new();
                attributes.insert("POSITION", position_accessor);
                attributes.insert("NORMAL", position_accessor + 1);
                attributes.insert("TEXCOORD_0", position_accessor + 2);
                primitives.push(Primitive {
                    attributes,
                    indices: position_accessor + 3,
                    material: material_index,
                });
            }

            gltf_meshes.push(GltfMesh {
                primitives,
            });
        }

        let mut images = Vec::new();
        let mut textures = Vec::new();

        if self.binary {
            // Textures ride in the binary chunk.
            for kind in [TextureType::Diffuse, TextureType::Emission] {
                let Some(texture) = meshes[0].textures.get(&kind) else {
                    continue;
                };
                let png = texture
                    .as_png()
                    .map_err(|e| Error::Encode(format!("texture encode failed: {e}")))?;

                align4(&mut binary);
                let view = buffer_views.len();
                buffer_views.push(BufferView {
                    buffer: 0,
                    byte_offset: binary.len(),
                    byte_length: png.len(),
                    byte_stride: None,
                    target: None,
                });
                binary.extend_from_slice(&png);

                textures.push(GltfTexture { source: images.len() });
                images.push(Image {
                    uri: None,
                    buffer_view: Some(view),
                    mime_type: Some("image/png"),
                });
            }
        } else {
            for (_, name) in save_texture_sidecars(path, &meshes)? {
                textures.push(GltfTexture { source: images.len() });
                images.push(Image {
                    uri: Some(name),
                    buffer_view: None,
                    mime_type: None,
                });
            }
        }

        align4(&mut binary);

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mesh");

        let document = Document {
            asset: Asset {
                version: "2.0",
                generator: concat!("voxmill ", env!("CARGO_PKG_VERSION")),
            },
            scene: 0,
            scenes: vec![Scene { nodes: root_nodes }],
            nodes,
            meshes: gltf_meshes,
            accessors,
            buffer_views,
            materials,
            images,
            textures,
            buffers: vec![Buffer {
                byte_length: binary.len(),
                uri: (!self.binary).then(|| format!("{stem}.bin")),
            }],
        };

        let mut json = serde_json::to_vec(&document)
            .map_err(|e| Error::Encode(format!("glTF json failed: {e}")))?;

        debug!(json = json.len(), binary = binary.len(), "gltf document sizes");

        if self.binary {
            // JSON chunks are space padded to the 4-byte boundary.
            while json.len() % 4 != 0 {
                json.push(b' ');
            }

            let total = 12 + 8 + json.len() + 8 + binary.len();
            let mut glb = Vec::with_capacity(total);
            glb.extend_from_slice(&GLB_MAGIC.to_le_bytes());
            glb.extend_from_slice(&2u32.to_le_bytes());
            glb.extend_from_slice(&(total as u32).to_le_bytes());

            glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
            glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
            glb.extend_from_slice(&json);

            glb.extend_from_slice(&(binary.len() as u32).to_le_bytes());
            glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            glb.extend_from_slice(&binary);

            std::fs::write(path, glb)?;
        } else {
            std::fs::write(path, json)?;
            std::fs::write(path.with_file_name(format!("{stem}.bin")), &binary)?;
        }

        Ok(())
    }
}

fn position_bounds(vertices: &[Vertex]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for vertex in vertices {
        let p = [vertex.pos.x, vertex.pos.y, vertex.pos.z];
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    if vertices.is_empty() {
        return ([0.0; 3], [0.0; 3]);
    }
    (min, max)
}

#[cfg(test)]
mod test {
    use super::*;

    fn cube_meshes() -> Vec<Mesh> {
        use glam::IVec3;
        use voxmill_mesh::{Mesher, SimpleMesher};
        use voxmill_voxel::VoxelModel;

        let mut model = VoxelModel::new();
        model.name = "cube".into();
        model.set_voxel(IVec3::ZERO, 0, 0, false);
        model.generate_visibility();
        vec![SimpleMesher.generate_mesh(&model).unwrap()]
    }

    #[test]
    fn glb_container_is_aligned() {
        let dir = std::env::temp_dir().join("voxmill_glb_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cube.glb");

        GltfExporter::new(ExportSettings::default(), true)
            .save(&path, &cube_meshes())
            .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);

        let total = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        assert_eq!(total, bytes.len());

        let json_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        assert_eq!(json_len % 4, 0);
        assert_eq!(&bytes[16..20], b"JSON");

        let bin_offset = 20 + json_len;
        let bin_len =
            u32::from_le_bytes(bytes[bin_offset..bin_offset + 4].try_into().unwrap()) as usize;
        assert_eq!(bin_len % 4, 0);
        assert_eq!(&bytes[bin_offset + 4..bin_offset + 7], b"BIN");
        assert_eq!(bytes.len(), bin_offset + 8 + bin_len);
    }

    #[test]
    fn gltf_document_references_interleaved_buffers() {
        let dir = std::env::temp_dir().join("voxmill_gltf_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cube.gltf");

        GltfExporter::new(ExportSettings::default(), false)
            .save(&path, &cube_meshes())
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

        let views = json["bufferViews"].as_array().unwrap();
        assert_eq!(
            views[0]["byteStride"].as_u64().unwrap() as usize,
            std::mem::size_of::<Vertex>()
        );
        assert_eq!(json["buffers"][0]["uri"].as_str().unwrap(), "cube.bin");

        let accessors = json["accessors"].as_array().unwrap();
        assert_eq!(accessors[1]["byteOffset"].as_u64().unwrap(), 12);
        assert_eq!(accessors[2]["byteOffset"].as_u64().unwrap(), 24);

        assert!(dir.join("cube.bin").exists());
    }
}
