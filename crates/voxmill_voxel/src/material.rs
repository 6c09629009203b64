//! Shared material records.

use std::sync::Arc;

/// Scalar material properties attached to a surface.
///
/// Materials are shared by handle ([`MaterialRef`]): two materials with
/// identical values stay distinct because they were authored distinctly, so
/// equality of handles is pointer equality, not value equality.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub metallic: f32,
    pub specular: f32,
    pub roughness: f32,
    pub ior: f32,
    /// Emission power. Anything above zero makes the material emissive.
    pub power: f32,
    pub transparency: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            metallic: 0.0,
            specular: 0.0,
            roughness: 0.0,
            ior: 0.0,
            power: 0.0,
            transparency: 0.0,
        }
    }
}

impl Material {
    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.transparency != 0.0
    }

    #[inline]
    pub fn is_emissive(&self) -> bool {
        self.power > 0.0
    }
}

/// A shared material handle.
pub type MaterialRef = Arc<Material>;

/// Identity comparison of two material handles.
#[inline]
pub fn same_material(a: &MaterialRef, b: &MaterialRef) -> bool {
    Arc::ptr_eq(a, b)
}
