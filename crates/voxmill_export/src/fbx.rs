//! Binary FBX 7400 export.
//!
//! Sources on the container layout:
//! <https://code.blender.org/2013/08/fbx-binary-file-format-specification/>
//!
//! Node records carry typed properties tagged `I, L, D, S, R, f, i`; float
//! and int arrays are zlib compressed with encoding = 1. Numeric object ids
//! are sequential and therefore stable within a file.

use std::io::Write as _;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;
use voxmill_mesh::Mesh;
use voxmill_voxel::TextureType;

use crate::{apply_world_space, save_texture_sidecars, Error, ExportSettings, MeshExporter, Result};

const SIGNATURE: &[u8] = b"Kaydara FBX Binary  \x00";
const UNKNOWN_HEADER_BYTES: [u8; 2] = [0x1A, 0x00];
const FBX_VERSION: u32 = 7400;

const GENERIC_CTIME: &str = "1970-01-01 10:00:00:000";
const GENERIC_FILEID: [u8; 16] = [
    0x28, 0xb3, 0x2a, 0xeb, 0xb6, 0x24, 0xcc, 0xc2, 0xbf, 0xc8, 0xb0, 0x2a, 0xa9, 0x2b, 0xfc, 0xf1,
];
const GENERIC_FOOTID: [u8; 16] = [
    0xfa, 0xbc, 0xab, 0x09, 0xd0, 0xc8, 0xd4, 0x66, 0xb1, 0x76, 0xfb, 0x83, 0x1c, 0xf7, 0x26, 0x7e,
];
const FOOT_MAGIC: [u8; 16] = [
    0xf8, 0x5a, 0x8c, 0x6a, 0xde, 0xf5, 0xd9, 0x7e, 0xec, 0xe9, 0x0c, 0xe3, 0x75, 0x8f, 0x29, 0x0b,
];

#[derive(Clone)]
enum Property {
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Raw(Vec<u8>),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
}

impl Property {
    fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Property::I32(value) => {
                out.push(b'I');
                out.extend_from_slice(&value.to_le_bytes());
            }
            Property::I64(value) => {
                out.push(b'L');
                out.extend_from_slice(&value.to_le_bytes());
            }
            Property::F64(value) => {
                out.push(b'D');
                out.extend_from_slice(&value.to_le_bytes());
            }
            Property::Str(value) => {
                out.push(b'S');
                out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                out.extend_from_slice(value.as_bytes());
            }
            Property::Raw(value) => {
                out.push(b'R');
                out.extend_from_slice(&(value.len() as u32).to_le_bytes());
                out.extend_from_slice(value);
            }
            Property::FloatArray(values) => {
                let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                write_array(out, b'f', values.len(), &bytes);
            }
            Property::IntArray(values) => {
                let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                write_array(out, b'i', values.len(), &bytes);
            }
        }
    }
}

/// Array properties are zlib compressed, encoding = 1.
fn write_array(out: &mut Vec<u8>, tag: u8, count: usize, bytes: &[u8]) {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    encoder.write_all(bytes).expect("in-memory zlib write");
    let compressed = encoder.finish().expect("in-memory zlib finish");

    out.push(tag);
    out.extend_from_slice(&(count as u32).to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    out.extend_from_slice(&compressed);
}

struct FbxNode {
    name: String,
    properties: Vec<Property>,
    children: Vec<FbxNode>,
}

impl FbxNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    fn with(name: &str, properties: Vec<Property>) -> Self {
        Self {
            name: name.to_owned(),
            properties,
            children: Vec::new(),
        }
    }

    fn add(&mut self, child: FbxNode) -> &mut Self {
        self.children.push(child);
        self
    }

    fn add_leaf(&mut self, name: &str, properties: Vec<Property>) -> &mut Self {
        self.children.push(FbxNode::with(name, properties));
        self
    }

    /// A `Properties70` `P` entry.
    fn p70(name: &str, kind: &str, sub_kind: &str, flags: &str, values: Vec<Property>) -> FbxNode {
        let mut properties = vec![
            Property::Str(name.into()),
            Property::Str(kind.into()),
            Property::Str(sub_kind.into()),
            Property::Str(flags.into()),
        ];
        properties.extend(values);
        FbxNode::with("P", properties)
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        let record_start = out.len();
        out.extend_from_slice(&[0u8; 4]); // end offset, patched below
        out.extend_from_slice(&(self.properties.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 4]); // property list length, patched below
        out.push(self.name.len() as u8);
        out.extend_from_slice(self.name.as_bytes());

        let properties_start = out.len();
        for property in &self.properties {
            property.serialize(out);
        }
        let properties_len = (out.len() - properties_start) as u32;
        out[record_start + 8..record_start + 12].copy_from_slice(&properties_len.to_le_bytes());

        for child in &self.children {
            child.serialize(out);
        }
        if !self.children.is_empty() {
            // Child lists end with a null record.
            out.extend_from_slice(&[0u8; 13]);
        }

        let end_offset = out.len() as u32;
        out[record_start..record_start + 4].copy_from_slice(&end_offset.to_le_bytes());
    }
}

/// `Name\0\x01Class` object naming.
fn class_name(name: &str, class: &str) -> String {
    format!("{name}\u{0}\u{1}{class}")
}

pub struct FbxExporter {
    settings: ExportSettings,
}

impl FbxExporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }
}

impl MeshExporter for FbxExporter {
    fn save(&mut self, path: &Path, meshes: &[Mesh]) -> Result<()> {
        if meshes.is_empty() {
            return Err(Error::InvalidArgument("nothing to export".into()));
        }
        let meshes = apply_world_space(meshes, self.settings.world_space);

        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&UNKNOWN_HEADER_BYTES);
        out.extend_from_slice(&FBX_VERSION.to_le_bytes());

        write_header(&mut out);
        write_global_settings(&mut out);

        let mut ids = IdSource { next: 1000 };
        let mut objects = FbxNode::new("Objects");
        let mut connections = FbxNode::new("Connections");

        let sidecars = save_texture_sidecars(path, &meshes)?;
        let mut texture_ids = Vec::new();
        for (kind, file_name) in &sidecars {
            let id = ids.next();
            let suffix = match kind {
                TextureType::Diffuse => "albedo",
                TextureType::Emission => "emission",
            };
            add_texture(&mut objects, id, suffix, file_name);
            texture_ids.push((*kind, id));
        }

        let mut animation_root = 0i64;
        for mesh in &meshes {
            if mesh.frame_time != 0 && animation_root == 0 {
                animation_root = ids.next();
                add_null_model(&mut objects, animation_root, &format!("{}_Anim", mesh.name));
                connections.add_leaf(
                    "C",
                    vec![
                        Property::Str("OO".into()),
                        Property::I64(animation_root),
                        Property::I64(0),
                    ],
                );
            } else if mesh.frame_time == 0 {
                animation_root = 0;
            }

            add_mesh(
                &mut objects,
                &mut connections,
                &mut ids,
                animation_root,
                mesh,
                &texture_ids,
            );
        }

        objects.serialize(&mut out);
        connections.serialize(&mut out);

        write_footer(&mut out);

        debug!(bytes = out.len(), "fbx document");
        std::fs::write(path, out)?;
        Ok(())
    }
}

struct IdSource {
    next: i64,
}

impl IdSource {
    fn next(&mut self) -> i64 {
        self.next += 1;
        self.next
    }
}

fn write_header(out: &mut Vec<u8>) {
    let creator = concat!("voxmill ", env!("CARGO_PKG_VERSION"));

    let mut header = FbxNode::new("FBXHeaderExtension");
    header.add_leaf("FBXHeaderVersion", vec![Property::I32(1003)]);
    header.add_leaf("FBXVersion", vec![Property::I32(FBX_VERSION as i32)]);
    header.add_leaf("EncryptionType", vec![Property::I32(0)]);

    // A fixed timestamp keeps identical inputs byte-identical.
    let mut timestamp = FbxNode::new("CreationTimeStamp");
    timestamp.add_leaf("Version", vec![Property::I32(1000)]);
    timestamp.add_leaf("Year", vec![Property::I32(1970)]);
    timestamp.add_leaf("Month", vec![Property::I32(1)]);
    timestamp.add_leaf("Day", vec![Property::I32(1)]);
    timestamp.add_leaf("Hour", vec![Property::I32(10)]);
    timestamp.add_leaf("Minute", vec![Property::I32(0)]);
    timestamp.add_leaf("Second", vec![Property::I32(0)]);
    timestamp.add_leaf("Millisecond", vec![Property::I32(0)]);
    header.add(timestamp);

    header.add_leaf("Creator", vec![Property::Str(creator.into())]);
    header.serialize(out);

    FbxNode::with("FileId", vec![Property::Raw(GENERIC_FILEID.to_vec())]).serialize(out);
    FbxNode::with("CreationTime", vec![Property::Str(GENERIC_CTIME.into())]).serialize(out);
    FbxNode::with("Creator", vec![Property::Str(creator.into())]).serialize(out);
}

fn write_global_settings(out: &mut Vec<u8>) {
    let mut settings = FbxNode::new("GlobalSettings");
    settings.add_leaf("Version", vec![Property::I32(1000)]);

    let mut p70 = FbxNode::new("Properties70");
    p70.add(FbxNode::p70("UpAxis", "int", "Integer", "", vec![Property::I32(1)]));
    p70.add(FbxNode::p70("UpAxisSign", "int", "Integer", "", vec![Property::I32(1)]));
    p70.add(FbxNode::p70("FrontAxis", "int", "Integer", "", vec![Property::I32(2)]));
    p70.add(FbxNode::p70("FrontAxisSign", "int", "Integer", "", vec![Property::I32(-1)]));
    p70.add(FbxNode::p70("CoordAxis", "int", "Integer", "", vec![Property::I32(0)]));
    p70.add(FbxNode::p70("CoordAxisSign", "int", "Integer", "", vec![Property::I32(-1)]));
    p70.add(FbxNode::p70(
        "UnitScaleFactor",
        "double",
        "Number",
        "",
        vec![Property::F64(1.0)],
    ));
    p70.add(FbxNode::p70(
        "DefaultCamera",
        "KString",
        "",
        "",
        vec![Property::Str("Producer Perspective".into())],
    ));
    settings.add(p70);
    settings.serialize(out);
}

fn add_null_model(objects: &mut FbxNode, id: i64, name: &str) {
    let mut model = FbxNode::with(
        "Model",
        vec![
            Property::I64(id),
            Property::Str(class_name(name, "Model")),
            Property::Str("Null".into()),
        ],
    );
    model.add_leaf("Version", vec![Property::I32(232)]);
    objects.add(model);
}

fn add_texture(objects: &mut FbxNode, id: i64, suffix: &str, file_name: &str) {
    let mut texture = FbxNode::with(
        "Texture",
        vec![
            Property::I64(id),
            Property::Str(class_name(suffix, "Texture")),
            Property::Str(String::new()),
        ],
    );
    texture.add_leaf("Type", vec![Property::Str("TextureVideoClip".into())]);
    texture.add_leaf("Version", vec![Property::I32(202)]);
    texture.add_leaf(
        "TextureName",
        vec![Property::Str(class_name(suffix, "Texture"))],
    );
    texture.add_leaf(
        "RelativeFilename",
        vec![Property::Str(file_name.to_owned())],
    );

    let mut p70 = FbxNode::new("Properties70");
    p70.add(FbxNode::p70("UseMaterial", "bool", "", "", vec![Property::I32(1)]));
    p70.add(FbxNode::p70("UseMipMap", "bool", "", "", vec![Property::I32(0)]));
    texture.add(p70);

    objects.add(texture);
}

fn add_mesh(
    objects: &mut FbxNode,
    connections: &mut FbxNode,
    ids: &mut IdSource,
    parent: i64,
    mesh: &Mesh,
    texture_ids: &[(TextureType, i64)],
) {
    let name = if mesh.name.is_empty() {
        "VoxelModel"
    } else {
        mesh.name.as_str()
    };

    // Flatten all surfaces into one geometry; the material layer maps each
    // triangle to its surface material.
    let mut vertices: Vec<f32> = Vec::new();
    let mut indices: Vec<i32> = Vec::new();
    let mut normals: Vec<f32> = Vec::new();
    let mut uvs: Vec<f32> = Vec::new();
    let mut uv_indices: Vec<i32> = Vec::new();
    let mut triangle_materials: Vec<i32> = Vec::new();

    let mut vertex_base = 0i32;
    for (surface_index, surface) in mesh.surfaces.iter().enumerate() {
        for vertex in &surface.vertices {
            vertices.extend_from_slice(&[vertex.pos.x, vertex.pos.y, vertex.pos.z]);
            uvs.extend_from_slice(&[vertex.uv.x, 1.0 - vertex.uv.y]);
        }

        for triangle in surface.indices.chunks_exact(3) {
            let a = vertex_base + triangle[0] as i32;
            let b = vertex_base + triangle[1] as i32;
            let c = vertex_base + triangle[2] as i32;

            // The last index of each polygon is stored as `-(index + 1)`.
            indices.extend_from_slice(&[a, b, !c]);
            uv_indices.extend_from_slice(&[a, b, c]);
            triangle_materials.push(surface_index as i32);

            for &corner in triangle {
                let normal = surface.vertices[corner as usize].normal;
                normals.extend_from_slice(&[normal.x, normal.y, normal.z]);
            }
        }

        vertex_base += surface.vertices.len() as i32;
    }

    let geometry_id = ids.next();
    let mut geometry = FbxNode::with(
        "Geometry",
        vec![
            Property::I64(geometry_id),
            Property::Str(class_name(name, "Geometry")),
            Property::Str("Mesh".into()),
        ],
    );
    geometry.add_leaf("GeometryVersion", vec![Property::I32(0x7C)]);
    geometry.add_leaf("Vertices", vec![Property::FloatArray(vertices)]);
    geometry.add_leaf("PolygonVertexIndex", vec![Property::IntArray(indices)]);

    let mut normal_layer = FbxNode::with("LayerElementNormal", vec![Property::I32(0)]);
    normal_layer.add_leaf("Version", vec![Property::I32(101)]);
    normal_layer.add_leaf("Name", vec![Property::Str(String::new())]);
    normal_layer.add_leaf(
        "MappingInformationType",
        vec![Property::Str("ByPolygonVertex".into())],
    );
    normal_layer.add_leaf(
        "ReferenceInformationType",
        vec![Property::Str("Direct".into())],
    );
    normal_layer.add_leaf("Normals", vec![Property::FloatArray(normals)]);
    geometry.add(normal_layer);

    let mut uv_layer = FbxNode::with("LayerElementUV", vec![Property::I32(0)]);
    uv_layer.add_leaf("Version", vec![Property::I32(101)]);
    uv_layer.add_leaf("Name", vec![Property::Str(String::new())]);
    uv_layer.add_leaf(
        "MappingInformationType",
        vec![Property::Str("ByPolygonVertex".into())],
    );
    uv_layer.add_leaf(
        "ReferenceInformationType",
        vec![Property::Str("IndexToDirect".into())],
    );
    uv_layer.add_leaf("UV", vec![Property::FloatArray(uvs)]);
    uv_layer.add_leaf("UVIndex", vec![Property::IntArray(uv_indices)]);
    geometry.add(uv_layer);

    let mut material_layer = FbxNode::with("LayerElementMaterial", vec![Property::I32(0)]);
    material_layer.add_leaf("Version", vec![Property::I32(101)]);
    material_layer.add_leaf("Name", vec![Property::Str(String::new())]);
    material_layer.add_leaf(
        "MappingInformationType",
        vec![Property::Str("ByPolygon".into())],
    );
    material_layer.add_leaf(
        "ReferenceInformationType",
        vec![Property::Str("IndexToDirect".into())],
    );
    material_layer.add_leaf("Materials", vec![Property::IntArray(triangle_materials)]);
    geometry.add(material_layer);

    let mut layer = FbxNode::with("Layer", vec![Property::I32(0)]);
    layer.add_leaf("Version", vec![Property::I32(100)]);
    for element in ["LayerElementNormal", "LayerElementMaterial", "LayerElementUV"] {
        let mut entry = FbxNode::new("LayerElement");
        entry.add_leaf("Type", vec![Property::Str(element.into())]);
        entry.add_leaf("TypedIndex", vec![Property::I32(0)]);
        layer.add(entry);
    }
    geometry.add(layer);
    objects.add(geometry);

    // The model node carries the transform.
    let model_id = ids.next();
    let mut model = FbxNode::with(
        "Model",
        vec![
            Property::I64(model_id),
            Property::Str(class_name(name, "Model")),
            Property::Str("Mesh".into()),
        ],
    );
    model.add_leaf("Version", vec![Property::I32(232)]);

    let translation = mesh.model_matrix.w_axis;
    let mut p70 = FbxNode::new("Properties70");
    p70.add(FbxNode::p70(
        "Lcl Translation",
        "Lcl Translation",
        "",
        "A",
        vec![
            Property::F64(translation.x as f64),
            Property::F64(translation.y as f64),
            Property::F64(translation.z as f64),
        ],
    ));
    model.add(p70);
    objects.add(model);

    // model → parent (or the scene root 0), geometry → model.
    connections.add_leaf(
        "C",
        vec![
            Property::Str("OO".into()),
            Property::I64(model_id),
            Property::I64(parent),
        ],
    );
    connections.add_leaf(
        "C",
        vec![
            Property::Str("OO".into()),
            Property::I64(geometry_id),
            Property::I64(model_id),
        ],
    );

    for (surface_index, surface) in mesh.surfaces.iter().enumerate() {
        let material = &surface.material;
        let material_id = ids.next();

        let mut node = FbxNode::with(
            "Material",
            vec![
                Property::I64(material_id),
                Property::Str(class_name(&format!("{name}_Mat{surface_index}"), "Material")),
                Property::Str(String::new()),
            ],
        );
        node.add_leaf("Version", vec![Property::I32(102)]);
        node.add_leaf("ShadingModel", vec![Property::Str("phong".into())]);

        let mut p70 = FbxNode::new("Properties70");
        p70.add(FbxNode::p70(
            "DiffuseColor",
            "Color",
            "",
            "A",
            vec![Property::F64(1.0), Property::F64(1.0), Property::F64(1.0)],
        ));
        p70.add(FbxNode::p70(
            "SpecularFactor",
            "Number",
            "",
            "A",
            vec![Property::F64(material.specular as f64)],
        ));
        p70.add(FbxNode::p70(
            "TransparencyFactor",
            "Number",
            "",
            "A",
            vec![Property::F64(material.transparency as f64)],
        ));
        if material.power > 0.0 {
            p70.add(FbxNode::p70(
                "EmissiveFactor",
                "Number",
                "",
                "A",
                vec![Property::F64(material.power as f64)],
            ));
        }
        node.add(p70);
        objects.add(node);

        connections.add_leaf(
            "C",
            vec![
                Property::Str("OO".into()),
                Property::I64(material_id),
                Property::I64(model_id),
            ],
        );

        for &(kind, texture_id) in texture_ids {
            let channel = match kind {
                TextureType::Diffuse => "DiffuseColor",
                TextureType::Emission => "EmissiveColor",
            };
            connections.add_leaf(
                "C",
                vec![
                    Property::Str("OP".into()),
                    Property::I64(texture_id),
                    Property::I64(material_id),
                    Property::Str(channel.into()),
                ],
            );
        }
    }
}

fn write_footer(out: &mut Vec<u8>) {
    // Top-level null record ends the node list.
    out.extend_from_slice(&[0u8; 13]);
    out.extend_from_slice(&GENERIC_FOOTID);

    while out.len() % 16 != 0 {
        out.push(0);
    }

    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&FBX_VERSION.to_le_bytes());
    out.extend_from_slice(&[0u8; 120]);
    out.extend_from_slice(&FOOT_MAGIC);
}
