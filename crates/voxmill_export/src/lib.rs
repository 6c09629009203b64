//! Mesh exporters.
//!
//! Every exporter consumes the core [`Mesh`](voxmill_mesh::Mesh) model and
//! writes industry formats: glTF/GLB, OBJ, PLY, binary FBX and Godot ESCN.
//! Exports are lossy by design; only the editor-native voxel format keeps
//! internal state.

pub mod error;
pub mod escn;
pub mod fbx;
pub mod gltf;
pub mod obj;
pub mod ply;
pub mod registry;

pub use error::{Error, Result};
pub use registry::{ExporterKind, ExportSettings};

use std::path::Path;

use voxmill_mesh::Mesh;

/// A mesh file exporter. `save` writes the main file and any sidecars
/// (binary buffers, textures) next to it.
pub trait MeshExporter {
    fn save(&mut self, path: &Path, meshes: &[Mesh]) -> Result<()>;
}

/// Applies the world-space setting: bakes each mesh's model matrix into its
/// vertices when requested.
pub(crate) fn apply_world_space(meshes: &[Mesh], world_space: bool) -> Vec<Mesh> {
    meshes
        .iter()
        .map(|mesh| {
            let mut copy = Mesh {
                name: mesh.name.clone(),
                surfaces: mesh
                    .surfaces
                    .iter()
                    .map(|s| {
                        let mut surface = voxmill_mesh::Surface::new(s.material.clone());
                        surface.vertices = s.vertices.clone();
                        surface.indices = s.indices.clone();
                        surface
                    })
                    .collect(),
                textures: mesh.textures.clone(),
                model_matrix: mesh.model_matrix,
                frame_time: mesh.frame_time,
            };
            if world_space {
                copy.bake_transform();
            }
            copy
        })
        .collect()
}

/// Writes the diffuse (and emission) palettes as PNG sidecars named
/// `<stem>.albedo.png` / `<stem>.emission.png`. Returns the file names.
pub(crate) fn save_texture_sidecars(
    path: &Path,
    meshes: &[Mesh],
) -> Result<Vec<(voxmill_voxel::TextureType, String)>> {
    use voxmill_voxel::TextureType;

    let mut written = Vec::new();
    let Some(mesh) = meshes.first() else {
        return Ok(written);
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("texture");

    for (kind, suffix) in [
        (TextureType::Diffuse, "albedo"),
        (TextureType::Emission, "emission"),
    ] {
        if let Some(texture) = mesh.textures.get(&kind) {
            if texture.width() == 0 {
                continue;
            }
            let name = format!("{stem}.{suffix}.png");
            let png = texture
                .as_png()
                .map_err(|e| Error::Encode(format!("texture encode failed: {e}")))?;
            std::fs::write(path.with_file_name(&name), png)?;
            written.push((kind, name));
        }
    }

    Ok(written)
}
