//! Qubicle binary `.qb` import.
//!
//! Header flags select the color byte order (RGBA or BGRA), the z-axis
//! orientation and whether slices are RLE compressed. Runs are
//! `(CODEFLAG, count, value)` triples; `NEXTSLICEFLAG` ends a slice.

use std::collections::HashMap;
use std::sync::Arc;

use glam::IVec3;
use tracing::trace;
use voxmill_voxel::{Color, SceneNode, TextureType, VoxelModel, VoxelScene};

use crate::stream::Reader;
use crate::{Error, Result, VoxelFormat};

use super::PaletteBuilder;

const CODEFLAG: u32 = 2;
const NEXTSLICEFLAG: u32 = 6;

#[derive(Default)]
pub struct QubicleBinaryFormat;

struct Header {
    color_format: u32,
    z_axis_left: bool,
    compressed: bool,
    matrix_count: u32,
}

impl VoxelFormat for QubicleBinaryFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        let mut reader = Reader::new(data);

        let version = reader.read_bytes(4)?;
        if version != [1, 1, 0, 0] {
            return Err(Error::VersionUnsupported(format!(
                "{}.{}.{}.{}",
                version[0], version[1], version[2], version[3]
            )));
        }

        let header = Header {
            color_format: reader.read_u32()?,
            z_axis_left: reader.read_u32()? == 1,
            compressed: reader.read_u32()? != 0,
            matrix_count: {
                let _visibility_encoded = reader.read_u32()?;
                reader.read_u32()?
            },
        };

        trace!(matrices = header.matrix_count, compressed = header.compressed, "qb header");

        let mut palette = PaletteBuilder::new();
        let mut pending: Vec<(VoxelModel, glam::Vec3)> = Vec::new();

        for _ in 0..header.matrix_count {
            let name_len = reader.read_u8()? as usize;
            let name = String::from_utf8_lossy(reader.read_bytes(name_len)?).into_owned();

            // Sizes and positions are stored x, z-up, y: read as x z y.
            let size = read_swizzled(&mut reader)?;
            let matrix_pos = read_swizzled(&mut reader)?;

            let mut model = VoxelModel::new();
            model.name = name;

            if header.compressed {
                read_rle(&mut reader, &header, size, &mut model, &mut palette)?;
            } else {
                read_uncompressed(&mut reader, &header, size, &mut model, &mut palette)?;
            }

            model.generate_visibility();

            let mut position = matrix_pos.as_vec3() + size.as_vec3() / 2.0;
            let tmp = position.y;
            position.y = position.z;
            position.z = tmp;
            if header.z_axis_left {
                position.z = -position.z;
            }

            pending.push((model, position));
        }

        let textures = {
            let mut map = HashMap::new();
            map.insert(TextureType::Diffuse, Arc::new(palette.palette));
            map
        };

        let mut scene = VoxelScene::new();
        for (mut model, position) in pending {
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

fn read_swizzled(reader: &mut Reader) -> Result<IVec3> {
    let x = reader.read_i32()?;
    let z = reader.read_i32()?;
    let y = reader.read_i32()?;
    Ok(IVec3::new(x, y, z))
}

fn decode_color(header: &Header, packed: u32) -> Color {
    if header.color_format == 0 {
        Color::from_rgba(packed)
    } else {
        Color::from_bgra(packed)
    }
}

fn place(header: &Header, size: IVec3, x: i32, y: i32, slice: i32) -> IVec3 {
    let mut pos = IVec3::new(x, slice, y);
    if !header.z_axis_left {
        pos.y = (size.y - 1) - pos.y;
    }
    pos
}

fn read_uncompressed(
    reader: &mut Reader,
    header: &Header,
    size: IVec3,
    model: &mut VoxelModel,
    palette: &mut PaletteBuilder,
) -> Result<()> {
    for slice in 0..size.y {
        for y in 0..size.z {
            for x in 0..size.x {
                let packed = reader.read_u32()?;
                if let Some(column) = palette.column(decode_color(header, packed)) {
                    model.set_voxel(place(header, size, x, y, slice), 0, column, false);
                }
            }
        }
    }
    Ok(())
}

fn read_rle(
    reader: &mut Reader,
    header: &Header,
    size: IVec3,
    model: &mut VoxelModel,
    palette: &mut PaletteBuilder,
) -> Result<()> {
    for slice in 0..size.y {
        let mut index: i32 = 0;

        loop {
            let data = reader.read_u32()?;
            if data == NEXTSLICEFLAG {
                break;
            }

            let (count, value) = if data == CODEFLAG {
                let count = reader.read_u32()?;
                (count, reader.read_u32()?)
            } else {
                (1, data)
            };

            for _ in 0..count {
                let x = index % size.x;
                let y = index / size.x;
                index += 1;

                if let Some(column) = palette.column(decode_color(header, value)) {
                    model.set_voxel(place(header, size, x, y, slice), 0, column, false);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::stream::Writer;

    use super::*;

    fn header(compressed: bool, matrices: u32) -> Writer {
        let mut file = Writer::new();
        file.write_bytes(&[1, 1, 0, 0]); // version
        file.write_u32(0); // RGBA
        file.write_u32(0); // right-handed z
        file.write_u32(u32::from(compressed));
        file.write_u32(0); // no encoded visibility masks
        file.write_u32(matrices);
        file
    }

    fn matrix_header(file: &mut Writer, name: &str, size: (i32, i32, i32)) {
        file.write_u8(name.len() as u8);
        file.write_bytes(name.as_bytes());
        file.write_i32(size.0);
        file.write_i32(size.1);
        file.write_i32(size.2);
        file.write_i32(0);
        file.write_i32(0);
        file.write_i32(0);
    }

    #[test]
    fn uncompressed_voxels_import() {
        let mut file = header(false, 1);
        matrix_header(&mut file, "box", (2, 1, 1));
        // Two voxels, red and empty.
        file.write_u32(Color::new(255, 0, 0, 255).as_rgba());
        file.write_u32(0);

        let scene = QubicleBinaryFormat.load(&file.into_bytes()).unwrap();
        let model = &scene.models[0];
        assert_eq!(model.name, "box");
        assert_eq!(model.voxel_count(), 1);
        assert_eq!(
            model.palette(TextureType::Diffuse).unwrap().get_pixel(0, 0),
            Color::new(255, 0, 0, 255)
        );
    }

    #[test]
    fn rle_runs_expand() {
        let mut file = header(true, 1);
        matrix_header(&mut file, "bar", (4, 1, 1));
        // One slice: a run of 3 green voxels, one single blue, end of slice.
        file.write_u32(CODEFLAG);
        file.write_u32(3);
        file.write_u32(Color::new(0, 255, 0, 255).as_rgba());
        file.write_u32(Color::new(0, 0, 255, 255).as_rgba());
        file.write_u32(NEXTSLICEFLAG);

        let scene = QubicleBinaryFormat.load(&file.into_bytes()).unwrap();
        assert_eq!(scene.models[0].voxel_count(), 4);
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut file = Writer::new();
        file.write_bytes(&[2, 0, 0, 0]);
        assert!(matches!(
            QubicleBinaryFormat.load(&file.into_bytes()),
            Err(Error::VersionUnsupported(_))
        ));
    }
}
