//! Qubicle binary tree `.qbt` import.
//!
//! Container: `QB 2` magic, version, global scale, an optional color map,
//! then a data tree of matrix / model / compound nodes. Matrix voxel data is
//! zlib compressed, four bytes per cell iterated x-major, then z, then y;
//! a zero mask byte means empty space. Positions are already y-up.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use glam::IVec3;
use voxmill_voxel::{Color, SceneNode, TextureType, VoxelModel, VoxelScene};

use crate::stream::Reader;
use crate::{Error, Result, VoxelFormat};

use super::PaletteBuilder;

const MAGIC: u32 = 0x3220_4251; // "QB 2"

#[derive(Default)]
pub struct QubicleTreeFormat;

impl VoxelFormat for QubicleTreeFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        let mut reader = Reader::new(data);

        if reader.read_u32()? != MAGIC {
            return Err(Error::FormatUnknown("missing QB 2 signature".into()));
        }
        let major = reader.read_u8()?;
        let minor = reader.read_u8()?;
        if major != 1 {
            return Err(Error::VersionUnsupported(format!("{major}.{minor}")));
        }

        // Global scale, unused for import.
        let _ = reader.read_f32()?;
        let _ = reader.read_f32()?;
        let _ = reader.read_f32()?;

        let section = reader.read_bytes(8)?;
        let mut color_map: Vec<Color> = Vec::new();
        if section == b"COLORMAP" {
            let count = reader.read_u32()?;
            for _ in 0..count {
                let bytes = reader.read_bytes(4)?;
                color_map.push(Color::new(bytes[0], bytes[1], bytes[2], bytes[3]));
            }
            let datatree = reader.read_bytes(8)?;
            if datatree != b"DATATREE" {
                return Err(Error::Parse("expected DATATREE section".into()));
            }
        } else if section != b"DATATREE" {
            return Err(Error::Parse("expected COLORMAP or DATATREE section".into()));
        }

        let mut loader = Loader {
            palette: PaletteBuilder::new(),
            color_map,
            pending: Vec::new(),
        };
        loader.load_node(&mut reader)?;

        let textures = {
            let mut map = HashMap::new();
            map.insert(TextureType::Diffuse, Arc::new(loader.palette.palette));
            map
        };

        let mut scene = VoxelScene::new();
        for (mut model, position) in loader.pending {
            model.textures = textures.clone();
            let model = Arc::new(model);

            let mut node = SceneNode::with_model(model.clone());
            node.position = position;
            scene.root.add_child(node);
            scene.models.push(model);
        }

        Ok(scene)
    }
}

struct Loader {
    palette: PaletteBuilder,
    color_map: Vec<Color>,
    pending: Vec<(VoxelModel, glam::Vec3)>,
}

impl Loader {
    fn load_node(&mut self, reader: &mut Reader) -> Result<()> {
        let kind = reader.read_u32()?;
        let size = reader.read_u32()? as usize;

        match kind {
            0 => self.load_matrix(reader),
            1 => self.load_model(reader),
            2 => self.load_compound(reader),
            _ => reader.skip(size),
        }
    }

    fn load_model(&mut self, reader: &mut Reader) -> Result<()> {
        let children = reader.read_u32()?;
        for _ in 0..children {
            self.load_node(reader)?;
        }
        Ok(())
    }

    fn load_matrix(&mut self, reader: &mut Reader) -> Result<()> {
        let name_len = reader.read_u32()? as usize;
        let name = String::from_utf8_lossy(reader.read_bytes(name_len)?).into_owned();

        let position = reader.read_ivec3()?;
        let _local_scale = reader.read_ivec3()?;
        let _pivot = (reader.read_f32()?, reader.read_f32()?, reader.read_f32()?);
        let size = reader.read_ivec3()?;

        let compressed_size = reader.read_u32()? as usize;
        let compressed = reader.read_bytes(compressed_size)?;
        let mut voxels = Vec::new();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut voxels)
            .map_err(|e| Error::Parse(format!("bad qbt zlib stream: {e}")))?;

        let expected = (size.x * size.y * size.z) as usize * 4;
        if voxels.len() < expected {
            return Err(Error::Parse("truncated qbt voxel data".into()));
        }

        let mut model = VoxelModel::new();
        model.name = name;

        let mut cursor = 0;
        for x in 0..size.x {
            for z in 0..size.z {
                for y in 0..size.y {
                    let cell = &voxels[cursor..cursor + 4];
                    cursor += 4;

                    let mask = cell[3];
                    if mask == 0 {
                        continue;
                    }

                    let color = if self.color_map.is_empty() {
                        Color::new(cell[0], cell[1], cell[2], 255)
                    } else {
                        self.color_map
                            .get(cell[0] as usize)
                            .copied()
                            .unwrap_or(Color::WHITE)
                    };

                    if let Some(column) = self.palette.column(color) {
                        model.set_voxel(IVec3::new(x, y, z), 0, column, false);
                    }
                }
            }
        }

        model.generate_visibility();
        self.pending.push((model, position.as_vec3()));
        Ok(())
    }

    fn load_compound(&mut self, reader: &mut Reader) -> Result<()> {
        // Compounds carry their own matrix payload followed by children; the
        // matrix part mirrors load_matrix.
        self.load_matrix(reader)?;
        let children = reader.read_u32()?;
        for _ in 0..children {
            self.load_node(reader)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write as _;

    use crate::stream::Writer;

    use super::*;

    fn tiny_qbt() -> Vec<u8> {
        let mut file = Writer::new();
        file.write_u32(MAGIC);
        file.write_u8(1);
        file.write_u8(0);
        file.write_f32(1.0);
        file.write_f32(1.0);
        file.write_f32(1.0);
        file.write_bytes(b"DATATREE");

        // Matrix node: 1x2x1 with both cells set.
        let mut voxels = Vec::new();
        voxels.extend_from_slice(&[255, 0, 0, 1]);
        voxels.extend_from_slice(&[0, 255, 0, 1]);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&voxels).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut node = Writer::new();
        node.write_u32(4);
        node.write_bytes(b"cell");
        node.write_ivec3(IVec3::new(1, 2, 3)); // position
        node.write_ivec3(IVec3::ONE); // local scale
        node.write_f32(0.0);
        node.write_f32(0.0);
        node.write_f32(0.0);
        node.write_ivec3(IVec3::new(1, 2, 1)); // size
        node.write_u32(compressed.len() as u32);
        node.write_bytes(&compressed);
        let node = node.into_bytes();

        file.write_u32(0); // matrix
        file.write_u32(node.len() as u32);
        file.write_bytes(&node);
        file.into_bytes()
    }

    #[test]
    fn imports_matrix_nodes() {
        let scene = QubicleTreeFormat.load(&tiny_qbt()).unwrap();
        assert_eq!(scene.models.len(), 1);

        let model = &scene.models[0];
        assert_eq!(model.name, "cell");
        assert_eq!(model.voxel_count(), 2);
        assert!(model.get_voxel(IVec3::new(0, 0, 0)).is_some());
        assert!(model.get_voxel(IVec3::new(0, 1, 0)).is_some());

        assert_eq!(scene.root.children()[0].position, glam::Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn wrong_magic_is_unknown() {
        assert!(matches!(
            QubicleTreeFormat.load(b"XXXXxxxx"),
            Err(Error::FormatUnknown(_))
        ));
    }
}
