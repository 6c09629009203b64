//! Incremental mesh construction with vertex deduplication.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use voxmill_voxel::{MaterialRef, Texture, TextureType};

use crate::{Mesh, Surface, Vertex};

/// The index type a mesh is built for. 16-bit targets (WebGL and friends)
/// cap a surface at `u16::MAX` vertices; the builder rolls onto a fresh
/// surface of the same material when a quad would not fit anymore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    #[inline]
    pub fn max_index(self) -> usize {
        match self {
            IndexWidth::U16 => u16::MAX as usize,
            IndexWidth::U32 => u32::MAX as usize,
        }
    }
}

/// Dedup key: the raw bits of `(pos, normal, uv)` hashed with the 3-prime
/// scheme.
struct VertexKey {
    bits: [u32; 8],
    hash: u64,
}

impl VertexKey {
    fn of(vertex: &Vertex) -> Self {
        Self {
            bits: vertex.dedup_key(),
            hash: vertex.dedup_hash(),
        }
    }
}

impl PartialEq for VertexKey {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl Eq for VertexKey {}

impl Hash for VertexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

struct SurfaceBuilder {
    surface: Surface,
    lookup: HashMap<VertexKey, u32>,
}

impl SurfaceBuilder {
    fn new(material: MaterialRef) -> Self {
        Self {
            surface: Surface::new(material),
            lookup: HashMap::new(),
        }
    }

    fn add_vertex(&mut self, vertex: Vertex) -> u32 {
        let key = VertexKey::of(&vertex);
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.surface.vertices.len() as u32;
        self.surface.vertices.push(vertex);
        self.lookup.insert(key, index);
        index
    }

    fn add_triangle(&mut self, a: Vertex, b: Vertex, c: Vertex) {
        let ia = self.add_vertex(a);
        let ib = self.add_vertex(b);
        let ic = self.add_vertex(c);
        self.surface.indices.extend_from_slice(&[ia, ib, ic]);
    }
}

/// Builds a [`Mesh`] face by face, deduplicating vertices per surface and
/// grouping faces by material.
pub struct MeshBuilder {
    surfaces: Vec<SurfaceBuilder>,
    /// Active surface per material handle (keyed by pointer identity).
    active: HashMap<usize, usize>,
    textures: HashMap<TextureType, Arc<Texture>>,
    index_width: IndexWidth,
    pub name: String,
    pub model_matrix: Mat4,
    pub frame_time: u32,
}

impl Default for MeshBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::with_index_width(IndexWidth::U32)
    }

    pub fn with_index_width(index_width: IndexWidth) -> Self {
        Self {
            surfaces: Vec::new(),
            active: HashMap::new(),
            textures: HashMap::new(),
            index_width,
            name: String::new(),
            model_matrix: Mat4::IDENTITY,
            frame_time: 0,
        }
    }

    /// Sets the textures the mesh will carry; the diffuse palette width also
    /// drives palette UVs.
    pub fn set_textures(&mut self, textures: HashMap<TextureType, Arc<Texture>>) {
        self.textures = textures;
    }

    pub fn texture(&self, kind: TextureType) -> Option<&Arc<Texture>> {
        self.textures.get(&kind)
    }

    /// The palette UV of a color index: the pixel center on the one-row
    /// diffuse palette.
    pub fn palette_uv(&self, color: u8) -> Vec2 {
        let width = self
            .textures
            .get(&TextureType::Diffuse)
            .map(|t| t.width().max(1))
            .unwrap_or(1);
        Vec2::new((color as f32 + 0.5) / width as f32, 0.5)
    }

    fn surface_for(&mut self, material: &MaterialRef) -> &mut SurfaceBuilder {
        let key = Arc::as_ptr(material) as usize;
        let max_index = self.index_width.max_index();

        let reusable = self
            .active
            .get(&key)
            .copied()
            .filter(|&index| !self.surfaces[index].surface.is_index_limit_near(max_index));

        let index = match reusable {
            Some(index) => index,
            None => {
                let index = self.surfaces.len();
                self.surfaces.push(SurfaceBuilder::new(material.clone()));
                self.active.insert(key, index);
                index
            }
        };
        &mut self.surfaces[index]
    }

    /// Adds one triangle. The order must be counter-clockwise seen from
    /// outside.
    pub fn add_triangle(&mut self, a: Vertex, b: Vertex, c: Vertex, material: &MaterialRef) {
        self.surface_for(material).add_triangle(a, b, c);
    }

    /// Adds a quad from its four corner positions and per-corner UVs.
    ///
    /// `corners` are `[base, base+du, base+dv, base+du+dv]`. The winding is
    /// derived from the outward normal: the emitted triangles are
    /// `(v1, v2, v4), (v1, v4, v3)`, reversed when `du × dv` points against
    /// the normal, so `(v2-v1) × (v3-v1)` always matches the normal's sign.
    pub fn add_quad(
        &mut self,
        corners: [Vec3; 4],
        normal: Vec3,
        uvs: [Vec2; 4],
        material: &MaterialRef,
    ) {
        let [p1, p2, p3, p4] = corners;
        let v1 = Vertex::new(p1, normal, uvs[0]);
        let v2 = Vertex::new(p2, normal, uvs[1]);
        let v3 = Vertex::new(p3, normal, uvs[2]);
        let v4 = Vertex::new(p4, normal, uvs[3]);

        let surface = self.surface_for(material);
        if (p2 - p1).cross(p3 - p1).dot(normal) >= 0.0 {
            surface.add_triangle(v1, v2, v4);
            surface.add_triangle(v1, v4, v3);
        } else {
            surface.add_triangle(v4, v2, v1);
            surface.add_triangle(v3, v4, v1);
        }
    }

    /// Adds a palette-colored quad.
    pub fn add_palette_quad(
        &mut self,
        corners: [Vec3; 4],
        normal: Vec3,
        color: u8,
        material: &MaterialRef,
    ) {
        let uv = self.palette_uv(color);
        self.add_quad(corners, normal, [uv; 4], material);
    }

    pub fn build(self) -> Mesh {
        Mesh {
            name: self.name,
            surfaces: self
                .surfaces
                .into_iter()
                .map(|builder| builder.surface)
                .filter(|surface| !surface.indices.is_empty())
                .collect(),
            textures: self.textures,
            model_matrix: self.model_matrix,
            frame_time: self.frame_time,
        }
    }
}
