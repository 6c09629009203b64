//! Kenney Shape `.kenshape` import.
//!
//! A zlib-compressed JSON document describing a 2-D tile grid; every tile
//! has a palette color and a depth, and the importer extrudes the tiles
//! symmetrically around the depth axis.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use glam::IVec3;
use serde::Deserialize;
use voxmill_voxel::{Color, SceneNode, Texture, TextureType, VoxelModel, VoxelScene};

use crate::{Error, Result, VoxelFormat};

#[derive(Default)]
pub struct KenshapeFormat;

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    title: String,
    size: Size,
    tiles: Vec<Tile>,
    colors: Vec<String>,
}

#[derive(Deserialize)]
struct Size {
    x: i32,
    y: i32,
}

#[derive(Deserialize)]
struct Tile {
    shape: i32,
    #[serde(default)]
    color: i32,
    #[serde(default)]
    depth: i32,
}

impl VoxelFormat for KenshapeFormat {
    fn load(&mut self, data: &[u8]) -> Result<VoxelScene> {
        let mut json = Vec::new();
        ZlibDecoder::new(data)
            .read_to_end(&mut json)
            .map_err(|_| Error::FormatUnknown("kenshape payload is not zlib".into()))?;

        let document: Document = serde_json::from_slice(&json)
            .map_err(|e| Error::Parse(format!("bad kenshape json: {e}")))?;

        let mut palette = Texture::new();
        for hex in &document.colors {
            palette.add_pixel(parse_hex_color(hex)?);
        }

        let max_depth = document
            .tiles
            .iter()
            .filter(|tile| tile.shape > 0)
            .map(|tile| tile.depth)
            .max()
            .unwrap_or(0);

        let mut model = VoxelModel::new();
        model.name = document.title.clone();

        for (index, tile) in document.tiles.iter().enumerate() {
            if tile.shape <= 0 || tile.depth <= 0 {
                continue;
            }

            let x = index as i32 % document.size.x;
            let row = index as i32 / document.size.x;
            // Tiles are stored top row first.
            let y = (document.size.y - 1) - row;

            let color = tile.color.clamp(0, 255) as u8;
            let z0 = (max_depth - tile.depth) / 2;
            for z in z0..z0 + tile.depth {
                model.set_voxel(IVec3::new(x, y, z), 0, color, false);
            }
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

fn parse_hex_color(hex: &str) -> Result<Color> {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 {
        return Err(Error::Parse(format!("bad palette color {hex:?}")));
    }
    let value = u32::from_str_radix(digits, 16)
        .map_err(|_| Error::Parse(format!("bad palette color {hex:?}")))?;
    Ok(Color::new(
        (value >> 16) as u8,
        (value >> 8) as u8,
        value as u8,
        255,
    ))
}
