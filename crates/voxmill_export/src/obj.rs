//! Wavefront OBJ export (with an MTL sidecar and palette PNGs).

use std::fmt::Write as _;
use std::path::Path;

use voxmill_mesh::Mesh;
use voxmill_voxel::TextureType;

use crate::{apply_world_space, save_texture_sidecars, Error, ExportSettings, MeshExporter, Result};

pub struct ObjExporter {
    settings: ExportSettings,
}

impl ObjExporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }
}

impl MeshExporter for ObjExporter {
    fn save(&mut self, path: &Path, meshes: &[Mesh]) -> Result<()> {
        if meshes.is_empty() {
            return Err(Error::InvalidArgument("nothing to export".into()));
        }
        let mut meshes = apply_world_space(meshes, self.settings.world_space);
        // OBJ has no node transforms; always bake.
        for mesh in &mut meshes {
            mesh.bake_transform();
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mesh")
            .to_owned();

        let sidecars = save_texture_sidecars(path, &meshes)?;
        let albedo = sidecars
            .iter()
            .find(|(kind, _)| *kind == TextureType::Diffuse)
            .map(|(_, name)| name.clone());

        let mut obj = String::new();
        let mut mtl = String::new();
        let _ = writeln!(obj, "# voxmill {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(obj, "mtllib {stem}.mtl");

        let mut vertex_base = 1usize;
        let mut material_id = 0usize;

        for (mesh_index, mesh) in meshes.iter().enumerate() {
            let name = if mesh.name.is_empty() {
                format!("mesh{mesh_index}")
            } else {
                mesh.name.clone()
            };
            let _ = writeln!(obj, "o {name}");

            for surface in &mesh.surfaces {
                material_id += 1;
                let material_name = format!("Mat{material_id}");

                let material = &surface.material;
                let _ = writeln!(mtl, "newmtl {material_name}");
                let _ = writeln!(mtl, "Kd 1.0 1.0 1.0");
                let _ = writeln!(mtl, "Ks {:.4} {:.4} {:.4}", material.specular, material.specular, material.specular);
                let _ = writeln!(mtl, "d {:.4}", 1.0 - material.transparency);
                if material.ior > 0.0 {
                    let _ = writeln!(mtl, "Ni {:.4}", material.ior);
                }
                if let Some(albedo) = &albedo {
                    let _ = writeln!(mtl, "map_Kd {albedo}");
                }
                let _ = writeln!(mtl);

                for vertex in &surface.vertices {
                    let _ = writeln!(obj, "v {} {} {}", vertex.pos.x, vertex.pos.y, vertex.pos.z);
                }
                for vertex in &surface.vertices {
                    let _ = writeln!(obj, "vt {} {}", vertex.uv.x, 1.0 - vertex.uv.y);
                }
                for vertex in &surface.vertices {
                    let _ = writeln!(
                        obj,
                        "vn {} {} {}",
                        vertex.normal.x, vertex.normal.y, vertex.normal.z
                    );
                }

                let _ = writeln!(obj, "usemtl {material_name}");
                for triangle in surface.indices.chunks_exact(3) {
                    let a = vertex_base + triangle[0] as usize;
                    let b = vertex_base + triangle[1] as usize;
                    let c = vertex_base + triangle[2] as usize;
                    let _ = writeln!(obj, "f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}");
                }

                vertex_base += surface.vertices.len();
            }
        }

        std::fs::write(path, obj)?;
        std::fs::write(path.with_file_name(format!("{stem}.mtl")), mtl)?;
        Ok(())
    }
}
