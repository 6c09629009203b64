//! Qubicle project `.qbcl` import.
//!
//! Version-2 container: a thumbnail, seven metadata strings, then a node
//! tree whose matrix nodes hold zlib-compressed voxel data. Inside the
//! decompressed stream a pixel with alpha 2 is an RLE marker whose red
//! channel is the run length.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use glam::IVec3;
use tracing::trace;
use voxmill_voxel::{Color, SceneNode, TextureType, VoxelModel, VoxelScene};

use crate::stream::Reader;
use crate::{Error, Result, VoxelFormat};

use super::PaletteBuilder;

#[derive(Default)]
pub struct QubicleProjectFormat;

impl VoxelFormat for QubicleProjectFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        let mut reader = Reader::new(data);

        let signature = reader.read_bytes(4)?;
        if signature != b"QBCL" {
            return Err(Error::FormatUnknown("missing QBCL signature".into()));
        }
        reader.skip(4)?; // program version

        let version = reader.read_i32()?;
        if version != 2 {
            return Err(Error::VersionUnsupported(version.to_string()));
        }

        // BGRA thumbnail.
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        reader.skip((width * height * 4) as usize)?;

        // Seven metadata strings, in GUI order.
        for _ in 0..7 {
            let size = reader.read_u32()? as usize;
            reader.skip(size)?;
        }

        reader.skip(16)?; // timestamp

        let mut loader = Loader {
            palette: PaletteBuilder::new(),
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
    pending: Vec<(VoxelModel, glam::Vec3)>,
}

impl Loader {
    fn load_node(&mut self, reader: &mut Reader) -> Result<()> {
        let kind = reader.read_u32()?;
        reader.skip(4)?; // reserved

        match kind {
            0 => self.load_matrix(reader),
            1 => self.load_model(reader),
            other => Err(Error::Parse(format!("unknown qbcl node type {other}"))),
        }
    }

    fn load_model(&mut self, reader: &mut Reader) -> Result<()> {
        let size = reader.read_u32()? as usize;
        reader.skip(size)?;
        reader.skip(39)?; // constant block of unknown purpose

        let children = reader.read_u32()?;
        for _ in 0..children {
            self.load_node(reader)?;
        }
        Ok(())
    }

    fn load_matrix(&mut self, reader: &mut Reader) -> Result<()> {
        let name_len = reader.read_u32()? as usize;
        let name = String::from_utf8_lossy(reader.read_bytes(name_len)?).into_owned();
        reader.skip(3)?; // constant 0x01 0x01 0x00

        // x z y order, like .qb.
        let sx = reader.read_i32()?;
        let sz = reader.read_i32()?;
        let sy = reader.read_i32()?;
        let size = IVec3::new(sx, sy, sz);

        let px = reader.read_i32()?;
        let pz = reader.read_i32()?;
        let py = reader.read_i32()?;

        reader.skip(12)?; // pivot

        let compressed_size = reader.read_u32()? as usize;
        let compressed = reader.read_bytes(compressed_size)?;
        let mut voxels = Vec::new();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut voxels)
            .map_err(|e| Error::Parse(format!("bad qbcl zlib stream: {e}")))?;

        trace!(name = %name, voxels = voxels.len() / 4, "qbcl matrix");

        let mut model = VoxelModel::new();
        model.name = name;

        let mut stream = Reader::new(&voxels);
        let mut index: i32 = 0;

        while !stream.is_eof() {
            let mut z: i32 = 0;
            let count = stream.read_u16()? as usize;

            let mut entry = 0;
            while entry < count {
                let data = stream.read_u32()?;
                entry += 1;

                let marker = Color::from_rgba(data);
                if marker.a == 2 {
                    // RLE: red channel is the run length, next value is the
                    // repeated color.
                    let value = stream.read_u32()?;
                    entry += 1;
                    for _ in 0..marker.r {
                        self.place(&mut model, size, index, z, value);
                        z += 1;
                    }
                } else {
                    self.place(&mut model, size, index, z, data);
                    z += 1;
                }
            }

            index += 1;
        }

        model.generate_visibility();

        let mut position = glam::Vec3::new(px as f32, py as f32, pz as f32);
        position += size.as_vec3() / 2.0;

        self.pending.push((model, position));
        Ok(())
    }

    fn place(&mut self, model: &mut VoxelModel, size: IVec3, index: i32, z: i32, packed: u32) {
        if let Some(column) = self.palette.column(Color::from_rgba(packed)) {
            let y = index % size.y.max(1);
            let x = index / size.y.max(1);
            let pos = IVec3::new(x, (size.y - 1) - y, z);
            model.set_voxel(pos, 0, column, false);
        }
    }
}

#[cfg(test)]
mod test {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write as _;

    use crate::stream::Writer;

    use super::*;

    fn tiny_qbcl() -> Vec<u8> {
        let mut file = Writer::new();
        file.write_bytes(b"QBCL");
        file.write_bytes(&[3, 1, 0, 0]); // program version
        file.write_i32(2); // file version
        file.write_u32(0); // thumbnail width
        file.write_u32(0); // thumbnail height
        for _ in 0..7 {
            file.write_u32(0); // empty metadata strings
        }
        file.write_bytes(&[0; 16]); // timestamp

        // Matrix node.
        file.write_u32(0); // type: matrix
        file.write_u32(0); // reserved
        file.write_u32(3);
        file.write_bytes(b"box");
        file.write_bytes(&[1, 1, 0]);
        // Size 1x1x2 in x z y order.
        file.write_i32(1);
        file.write_i32(2);
        file.write_i32(1);
        // Position.
        file.write_i32(0);
        file.write_i32(0);
        file.write_i32(0);
        file.write_bytes(&[0; 12]); // pivot

        // Voxel payload: one column, two voxels.
        let mut payload = Writer::new();
        payload.write_u16(2);
        payload.write_u32(Color::new(10, 20, 30, 255).as_rgba());
        payload.write_u32(Color::new(40, 50, 60, 255).as_rgba());

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
        encoder.write_all(payload.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        file.write_u32(compressed.len() as u32);
        file.write_bytes(&compressed);
        file.into_bytes()
    }

    #[test]
    fn imports_compressed_matrices() {
        let scene = QubicleProjectFormat.load(&tiny_qbcl()).unwrap();
        assert_eq!(scene.models.len(), 1);
        let model = &scene.models[0];
        assert_eq!(model.name, "box");
        assert_eq!(model.voxel_count(), 2);
        assert_eq!(model.palette_width(), 2);
    }

    #[test]
    fn version_must_be_two() {
        let mut bytes = tiny_qbcl();
        bytes[8..12].copy_from_slice(&1i32.to_le_bytes());
        assert!(matches!(
            QubicleProjectFormat.load(&bytes),
            Err(Error::VersionUnsupported(_))
        ));
    }
}
