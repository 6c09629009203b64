//! ASCII PLY export.

use std::fmt::Write as _;
use std::path::Path;

use voxmill_mesh::Mesh;

use crate::{apply_world_space, Error, ExportSettings, MeshExporter, Result};

pub struct PlyExporter {
    settings: ExportSettings,
}

impl PlyExporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }
}

impl MeshExporter for PlyExporter {
    fn save(&mut self, path: &Path, meshes: &[Mesh]) -> Result<()> {
        if meshes.is_empty() {
            return Err(Error::InvalidArgument("nothing to export".into()));
        }
        let mut meshes = apply_world_space(meshes, self.settings.world_space);
        for mesh in &mut meshes {
            mesh.bake_transform();
        }

        let vertex_count: usize = meshes.iter().map(Mesh::vertex_count).sum();
        let face_count: usize = meshes.iter().map(Mesh::triangle_count).sum();

        let mut ply = String::new();
        let _ = writeln!(ply, "ply");
        let _ = writeln!(ply, "format ascii 1.0");
        let _ = writeln!(ply, "comment voxmill {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(ply, "element vertex {vertex_count}");
        for property in ["x", "y", "z", "nx", "ny", "nz", "s", "t"] {
            let _ = writeln!(ply, "property float {property}");
        }
        let _ = writeln!(ply, "element face {face_count}");
        let _ = writeln!(ply, "property list uchar uint vertex_indices");
        let _ = writeln!(ply, "end_header");

        for mesh in &meshes {
            for surface in &mesh.surfaces {
                for vertex in &surface.vertices {
                    let _ = writeln!(
                        ply,
                        "{} {} {} {} {} {} {} {}",
                        vertex.pos.x,
                        vertex.pos.y,
                        vertex.pos.z,
                        vertex.normal.x,
                        vertex.normal.y,
                        vertex.normal.z,
                        vertex.uv.x,
                        vertex.uv.y
                    );
                }
            }
        }

        let mut base = 0usize;
        for mesh in &meshes {
            for surface in &mesh.surfaces {
                for triangle in surface.indices.chunks_exact(3) {
                    let _ = writeln!(
                        ply,
                        "3 {} {} {}",
                        base + triangle[0] as usize,
                        base + triangle[1] as usize,
                        base + triangle[2] as usize
                    );
                }
                base += surface.vertices.len();
            }
        }

        std::fs::write(path, ply)?;
        Ok(())
    }
}
