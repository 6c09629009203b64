//! The mesh container.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Mat4;
use voxmill_voxel::{material, Texture, TextureType};

use crate::Surface;

/// A self-contained triangle mesh: surfaces grouped by material, the
/// textures they sample, and the transform of the scene node the mesh came
/// from. Has no back-references into the voxel layer.
pub struct Mesh {
    pub name: String,
    pub surfaces: Vec<Surface>,
    pub textures: HashMap<TextureType, Arc<Texture>>,
    pub model_matrix: Mat4,
    /// For animation frames: cumulative end time in milliseconds, 0 for
    /// static meshes.
    pub frame_time: u32,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            name: String::new(),
            surfaces: Vec::new(),
            textures: HashMap::new(),
            model_matrix: Mat4::IDENTITY,
            frame_time: 0,
        }
    }
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.surfaces.iter().map(Surface::vertex_count).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.surfaces.iter().map(Surface::face_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.iter().all(|s| s.indices.is_empty())
    }

    /// Appends another mesh, folding surfaces with an identical material
    /// handle together.
    pub fn merge(&mut self, other: Mesh) {
        for surface in other.surfaces {
            match self
                .surfaces
                .iter_mut()
                .find(|s| material::same_material(&s.material, &surface.material))
            {
                Some(target) => target.merge(&surface),
                None => self.surfaces.push(surface),
            }
        }
        for (kind, texture) in other.textures {
            self.textures.entry(kind).or_insert(texture);
        }
    }

    /// Bakes the model matrix into the vertex data and resets it to the
    /// identity. Normals are rotated, not translated.
    pub fn bake_transform(&mut self) {
        if self.model_matrix == Mat4::IDENTITY {
            return;
        }
        let matrix = self.model_matrix;
        for surface in &mut self.surfaces {
            for vertex in &mut surface.vertices {
                vertex.pos = matrix.transform_point3(vertex.pos);
                vertex.normal = matrix.transform_vector3(vertex.normal).normalize();
            }
        }
        self.model_matrix = Mat4::IDENTITY;
    }
}

#[cfg(test)]
mod test {
    use glam::{Vec2, Vec3};
    use voxmill_voxel::{Material, MaterialRef};

    use crate::Vertex;

    use super::*;

    fn mesh_with_quad(material: &MaterialRef) -> Mesh {
        let mut surface = Surface::new(material.clone());
        for i in 0..4 {
            surface
                .vertices
                .push(Vertex::new(Vec3::splat(i as f32), Vec3::Y, Vec2::ZERO));
        }
        surface.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);

        Mesh {
            surfaces: vec![surface],
            ..Mesh::new()
        }
    }

    #[test]
    fn merge_folds_same_material_surfaces() {
        let material = MaterialRef::new(Material::default());
        let mut a = mesh_with_quad(&material);
        let b = mesh_with_quad(&material);

        a.merge(b);
        assert_eq!(a.surfaces.len(), 1);
        assert_eq!(a.triangle_count(), 4);
    }

    #[test]
    fn merge_keeps_distinct_materials_apart() {
        let mut a = mesh_with_quad(&MaterialRef::new(Material::default()));
        let b = mesh_with_quad(&MaterialRef::new(Material::default()));

        a.merge(b);
        assert_eq!(a.surfaces.len(), 2);
    }

    #[test]
    fn bake_transform_moves_vertices() {
        let material = MaterialRef::new(Material::default());
        let mut mesh = mesh_with_quad(&material);
        mesh.model_matrix = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));

        mesh.bake_transform();
        assert_eq!(mesh.model_matrix, Mat4::IDENTITY);
        assert_eq!(mesh.surfaces[0].vertices[0].pos, Vec3::new(5.0, 0.0, 0.0));
    }
}
