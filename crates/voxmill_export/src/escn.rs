//! Godot `.escn` text scene export.

use std::fmt::Write as _;
use std::path::Path;

use voxmill_mesh::Mesh;
use voxmill_voxel::TextureType;

use crate::{apply_world_space, save_texture_sidecars, Error, ExportSettings, MeshExporter, Result};

pub struct EscnExporter {
    settings: ExportSettings,
}

impl EscnExporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }
}

impl MeshExporter for EscnExporter {
    fn save(&mut self, path: &Path, meshes: &[Mesh]) -> Result<()> {
        if meshes.is_empty() {
            return Err(Error::InvalidArgument("nothing to export".into()));
        }
        let meshes = apply_world_space(meshes, self.settings.world_space);
        let sidecars = save_texture_sidecars(path, &meshes)?;
        let albedo = sidecars
            .iter()
            .find(|(kind, _)| *kind == TextureType::Diffuse)
            .map(|(_, name)| name.clone());

        let surface_count: usize = meshes.iter().map(|m| m.surfaces.len()).sum();
        // Texture + one material per surface + one ArrayMesh per mesh.
        let load_steps = 1 + usize::from(albedo.is_some()) + surface_count + meshes.len();

        let mut out = String::new();
        let _ = writeln!(out, "[gd_scene load_steps={load_steps} format=2]");
        let _ = writeln!(out);

        let mut resource_id = 0usize;
        let texture_id = albedo.as_ref().map(|name| {
            resource_id += 1;
            let _ = writeln!(out, "[ext_resource path=\"res://{name}\" type=\"Texture\" id={resource_id}]");
            let _ = writeln!(out);
            resource_id
        });

        let mut sub_id = 0usize;
        let mut material_ids = Vec::new();
        for mesh in &meshes {
            for surface in &mesh.surfaces {
                sub_id += 1;
                material_ids.push(sub_id);

                let material = &surface.material;
                let _ = writeln!(out, "[sub_resource type=\"SpatialMaterial\" id={sub_id}]");
                if let Some(texture_id) = texture_id {
                    let _ = writeln!(out, "albedo_texture = ExtResource( {texture_id} )");
                }
                let _ = writeln!(out, "metallic = {}", material.metallic);
                let _ = writeln!(out, "roughness = {}", material.roughness);
                if material.power > 0.0 {
                    let _ = writeln!(out, "emission_enabled = true");
                    let _ = writeln!(out, "emission_energy = {}", material.power);
                }
                if material.transparency > 0.0 {
                    let _ = writeln!(out, "flags_transparent = true");
                }
                let _ = writeln!(out);
            }
        }

        let mut mesh_ids = Vec::new();
        let mut material_cursor = 0usize;
        for mesh in &meshes {
            sub_id += 1;
            mesh_ids.push(sub_id);
            let _ = writeln!(out, "[sub_resource type=\"ArrayMesh\" id={sub_id}]");

            for (surface_index, surface) in mesh.surfaces.iter().enumerate() {
                let _ = write!(out, "surfaces/{surface_index} = {{\"primitive\":4,\"arrays\":[");

                let _ = write!(out, "Vector3Array(");
                write_floats(
                    &mut out,
                    surface.vertices.iter().flat_map(|v| [v.pos.x, v.pos.y, v.pos.z]),
                );
                let _ = write!(out, "),Vector3Array(");
                write_floats(
                    &mut out,
                    surface
                        .vertices
                        .iter()
                        .flat_map(|v| [v.normal.x, v.normal.y, v.normal.z]),
                );
                let _ = write!(out, "),null,null,Vector2Array(");
                write_floats(&mut out, surface.vertices.iter().flat_map(|v| [v.uv.x, v.uv.y]));
                let _ = write!(out, "),null,null,null,IntArray(");
                let mut first = true;
                for &index in &surface.indices {
                    if !first {
                        let _ = write!(out, ",");
                    }
                    first = false;
                    let _ = write!(out, "{index}");
                }
                let _ = writeln!(out, ")],\"morph_arrays\":[]}}");

                let _ = writeln!(
                    out,
                    "surface_materials/{surface_index} = SubResource( {} )",
                    material_ids[material_cursor]
                );
                material_cursor += 1;
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "[node name=\"root\" type=\"Spatial\"]");
        let _ = writeln!(out);
        for (index, mesh) in meshes.iter().enumerate() {
            let name = if mesh.name.is_empty() {
                format!("mesh{index}")
            } else {
                mesh.name.replace(|c: char| !c.is_alphanumeric(), "_")
            };
            let _ = writeln!(
                out,
                "[node name=\"{name}\" type=\"MeshInstance\" parent=\".\"]"
            );
            let _ = writeln!(out, "mesh = SubResource( {} )", mesh_ids[index]);

            if !self.settings.world_space {
                let m = mesh.model_matrix;
                let basis = [
                    m.x_axis.x, m.y_axis.x, m.z_axis.x, m.x_axis.y, m.y_axis.y, m.z_axis.y,
                    m.x_axis.z, m.y_axis.z, m.z_axis.z,
                ];
                let origin = [m.w_axis.x, m.w_axis.y, m.w_axis.z];
                let _ = write!(out, "transform = Transform( ");
                for value in basis.iter().chain(origin.iter()) {
                    let _ = write!(out, "{value}, ");
                }
                let len = out.len();
                out.truncate(len - 2);
                let _ = writeln!(out, " )");
            }
            let _ = writeln!(out);
        }

        std::fs::write(path, out)?;
        Ok(())
    }
}

fn write_floats(out: &mut String, values: impl Iterator<Item = f32>) {
    let mut first = true;
    for value in values {
        if !first {
            let _ = write!(out, ",");
        }
        first = false;
        let _ = write!(out, "{value}");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scene_references_meshes_and_materials() {
        use glam::IVec3;
        use voxmill_mesh::{Mesher, SimpleMesher};
        use voxmill_voxel::VoxelModel;

        let mut model = VoxelModel::new();
        model.name = "cube".into();
        model.set_voxel(IVec3::ZERO, 0, 0, false);
        model.generate_visibility();
        let meshes = vec![SimpleMesher.generate_mesh(&model).unwrap()];

        let dir = std::env::temp_dir().join("voxmill_escn_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cube.escn");

        EscnExporter::new(ExportSettings::default())
            .save(&path, &meshes)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[gd_scene"));
        assert!(text.contains("[sub_resource type=\"ArrayMesh\""));
        assert!(text.contains("[sub_resource type=\"SpatialMaterial\""));
        assert!(text.contains("[node name=\"cube\" type=\"MeshInstance\""));
    }
}
