//! A vertex/index buffer pair, homogeneous in material.

use voxmill_voxel::MaterialRef;

use crate::Vertex;

/// A growable vertex and triangle-index buffer with its material.
pub struct Surface {
    pub material: MaterialRef,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Surface {
    pub fn new(material: MaterialRef) -> Self {
        Self {
            material,
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether adding one more quad would push past `max_index` vertices.
    /// Relevant for 16-bit index targets; meshers split onto a fresh surface
    /// when this trips.
    #[inline]
    pub fn is_index_limit_near(&self, max_index: usize) -> bool {
        self.vertices.len() + 4 > max_index
    }

    /// Appends another surface of the same material, offsetting its indices.
    pub fn merge(&mut self, other: &Surface) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
    }
}

#[cfg(test)]
mod test {
    use glam::{Vec2, Vec3};
    use voxmill_voxel::{Material, MaterialRef};

    use super::*;

    fn quad(material: MaterialRef) -> Surface {
        let mut surface = Surface::new(material);
        for i in 0..4 {
            surface
                .vertices
                .push(Vertex::new(Vec3::splat(i as f32), Vec3::Y, Vec2::ZERO));
        }
        surface.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
        surface
    }

    #[test]
    fn merge_offsets_indices() {
        let material = MaterialRef::new(Material::default());
        let mut a = quad(material.clone());
        let b = quad(material);

        a.merge(&b);
        assert_eq!(a.vertex_count(), 8);
        assert_eq!(a.face_count(), 4);
        assert_eq!(&a.indices[6..], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn index_limit_detection() {
        let material = MaterialRef::new(Material::default());
        let surface = quad(material);
        assert!(surface.is_index_limit_near(7));
        assert!(!surface.is_index_limit_near(8));
    }
}
