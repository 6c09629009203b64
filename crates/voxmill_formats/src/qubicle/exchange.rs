//! Qubicle exchange `.qef` import.
//!
//! A plain text format: three header lines, the grid size, a color count,
//! the colors as float triples, then one `x y z color mask` line per voxel.

use std::collections::HashMap;
use std::sync::Arc;

use glam::IVec3;
use voxmill_voxel::{Color, SceneNode, Texture, TextureType, VoxelModel, VoxelScene};

use crate::{Error, Result, VoxelFormat};

#[derive(Default)]
pub struct QubicleExchangeFormat;

impl VoxelFormat for QubicleExchangeFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::Parse("qef file is not valid text".into()))?;
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| Error::truncated("qef header"))?;
        if !header.starts_with("Qubicle Exchange Format") {
            return Err(Error::FormatUnknown("missing QEF header line".into()));
        }

        let version = lines
            .next()
            .ok_or_else(|| Error::truncated("qef version"))?;
        if !version.trim().starts_with("Version 0.2") {
            return Err(Error::VersionUnsupported(version.trim().to_string()));
        }
        let _site = lines.next().ok_or_else(|| Error::truncated("qef header"))?;

        let size = parse_numbers::<i64>(lines.next().ok_or_else(|| Error::truncated("size"))?, 3)?;
        let _size = IVec3::new(size[0] as i32, size[1] as i32, size[2] as i32);

        let color_count =
            parse_numbers::<i64>(lines.next().ok_or_else(|| Error::truncated("color count"))?, 1)?[0];

        let mut palette = Texture::new();
        for _ in 0..color_count {
            let rgb = parse_numbers::<f32>(
                lines.next().ok_or_else(|| Error::truncated("color line"))?,
                3,
            )?;
            palette.add_pixel(Color::new(
                (rgb[0] * 255.0).round() as u8,
                (rgb[1] * 255.0).round() as u8,
                (rgb[2] * 255.0).round() as u8,
                255,
            ));
        }

        let mut model = VoxelModel::new();
        for line in lines {
            let fields = parse_numbers::<i64>(line, 5)?;
            let pos = IVec3::new(fields[0] as i32, fields[1] as i32, fields[2] as i32);
            let color = fields[3].clamp(0, 255) as u8;
            // The stored visibility mask is ignored; masks are re-derived.
            model.set_voxel(pos, 0, color, false);
        }

        model.generate_visibility();
        model.textures = {
            let mut map = HashMap::new();
            map.insert(TextureType::Diffuse, Arc::new(palette));
            map
        };

        let model = Arc::new(model);
        let mut scene = VoxelScene::new();
        scene.root.add_child(SceneNode::with_model(model.clone()));
        scene.models.push(model);
        Ok(scene)
    }
}

fn parse_numbers<T: std::str::FromStr>(line: &str, expected: usize) -> Result<Vec<T>> {
    let numbers: Vec<T> = line
        .split_whitespace()
        .take(expected)
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Parse(format!("bad numeric line: {line:?}")))?;

    if numbers.len() < expected {
        return Err(Error::Parse(format!("short numeric line: {line:?}")));
    }
    Ok(numbers)
}

#[cfg(test)]
mod test {
    use super::*;

    const TINY_QEF: &str = "\
Qubicle Exchange Format
Version 0.2
www.minddesk.com
4 4 4
2
1.0 0.0 0.0
0.0 0.0 1.0
0 0 0 0 126
1 0 0 1 126
";

    #[test]
    fn imports_text_voxels() {
        let scene = QubicleExchangeFormat.load(TINY_QEF.as_bytes()).unwrap();
        let model = &scene.models[0];

        assert_eq!(model.voxel_count(), 2);
        assert_eq!(model.get_voxel(IVec3::new(1, 0, 0)).unwrap().color, 1);

        let palette = model.palette(TextureType::Diffuse).unwrap();
        assert_eq!(palette.get_pixel(0, 0), Color::new(255, 0, 0, 255));
        assert_eq!(palette.get_pixel(1, 0), Color::new(0, 0, 255, 255));
    }

    #[test]
    fn version_line_is_checked() {
        let bad = TINY_QEF.replace("Version 0.2", "Version 0.1");
        assert!(matches!(
            QubicleExchangeFormat.load(bad.as_bytes()),
            Err(Error::VersionUnsupported(_))
        ));
    }

    #[test]
    fn garbage_is_not_a_qef() {
        assert!(QubicleExchangeFormat.load(b"hello world").is_err());
    }
}
