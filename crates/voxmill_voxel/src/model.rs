//! One scene leaf: a voxel grid with its materials and palettes.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{IVec3, Vec3};
use voxmill_math::BBox;

use crate::{
    Material, MaterialRef, Texture, TextureType, Visibility, VisibilityAnalyzer, Voxel, VoxelSpace,
};

/// A single voxel model: sparse voxel storage, the bounding box over set
/// cells, its material table and color palettes.
///
/// Importers build models, run a visibility pass, and then share them into
/// the scene as `Arc<VoxelModel>` handles.
pub struct VoxelModel {
    pub name: String,
    space: VoxelSpace,
    pub bbox: BBox,
    /// Materials referenced by voxel material indices. Index 0 is the default
    /// material; indices out of range resolve to it.
    pub materials: Vec<MaterialRef>,
    pub textures: HashMap<TextureType, Arc<Texture>>,
    /// Offset of the model origin from its pivot point.
    pub pivot: Vec3,
    /// For animation frames: how long this frame lasts, in milliseconds.
    pub frame_time: u32,
}

impl Default for VoxelModel {
    fn default() -> Self {
        Self::new()
    }
}

impl VoxelModel {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            space: VoxelSpace::new(),
            bbox: BBox::default(),
            materials: vec![MaterialRef::new(Material::default())],
            textures: HashMap::new(),
            pivot: Vec3::ZERO,
            frame_time: 0,
        }
    }

    #[inline]
    pub fn voxels(&self) -> &VoxelSpace {
        &self.space
    }

    #[inline]
    pub fn voxels_mut(&mut self) -> &mut VoxelSpace {
        &mut self.space
    }

    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.space.len()
    }

    /// Sets a voxel and grows the model bounding box.
    pub fn set_voxel(&mut self, pos: IVec3, material: u8, color: u8, transparent: bool) {
        self.space.insert(pos, Voxel::new(material, color, transparent));
        self.bbox.expand(pos);
    }

    /// As [`set_voxel`](VoxelModel::set_voxel), with an explicit visibility
    /// mask (used when a format persists masks).
    pub fn set_voxel_with_mask(
        &mut self,
        pos: IVec3,
        material: u8,
        color: u8,
        transparent: bool,
        mask: Visibility,
    ) {
        let mut voxel = Voxel::new(material, color, transparent);
        voxel.visibility = mask;
        self.space.insert(pos, voxel);
        self.bbox.expand(pos);
    }

    /// Removes a voxel and incrementally repairs neighboring visibility.
    pub fn remove_voxel(&mut self, pos: IVec3) {
        self.space.erase(pos);
        VisibilityAnalyzer::update_at(&mut self.space, pos);
    }

    #[inline]
    pub fn get_voxel(&self, pos: IVec3) -> Option<&Voxel> {
        self.space.find(pos)
    }

    /// The material behind a voxel's material index; out-of-range indices
    /// resolve to the default material.
    pub fn material(&self, index: u8) -> &MaterialRef {
        self.materials.get(index as usize).unwrap_or(&self.materials[0])
    }

    pub fn palette(&self, kind: TextureType) -> Option<&Arc<Texture>> {
        self.textures.get(&kind)
    }

    /// Width of the diffuse palette, used for palette UVs. At least 1.
    pub fn palette_width(&self) -> u32 {
        self.palette(TextureType::Diffuse)
            .map(|t| t.width().max(1))
            .unwrap_or(1)
    }

    /// Runs a full visibility pass over the model's dirty chunks.
    pub fn generate_visibility(&mut self) {
        VisibilityAnalyzer::generate(&mut self.space);
    }

    /// Recomputes the bounding box from the stored voxels.
    pub fn recalc_bbox(&mut self) {
        self.space.shrink_inner();
        self.bbox = self.space.calculate_bbox();
    }

    pub fn clear(&mut self) {
        self.space.clear();
        self.bbox = BBox::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_voxel_tracks_bbox() {
        let mut model = VoxelModel::new();
        model.set_voxel(IVec3::new(1, 2, 3), 0, 1, false);
        model.set_voxel(IVec3::new(-2, 0, 0), 0, 1, false);

        assert_eq!(model.bbox.beg, IVec3::new(-2, 0, 0));
        assert_eq!(model.bbox.end, IVec3::new(2, 3, 4));
        assert_eq!(model.voxel_count(), 2);
    }

    #[test]
    fn missing_materials_resolve_to_default() {
        let model = VoxelModel::new();
        assert_eq!(model.material(200).transparency, 0.0);
    }

    #[test]
    fn remove_voxel_restores_neighbor_visibility() {
        let mut model = VoxelModel::new();
        model.set_voxel(IVec3::new(0, 0, 0), 0, 1, false);
        model.set_voxel(IVec3::new(1, 0, 0), 0, 1, false);
        model.generate_visibility();

        assert!(!model
            .get_voxel(IVec3::ZERO)
            .unwrap()
            .visibility
            .contains(Visibility::RIGHT));

        model.remove_voxel(IVec3::new(1, 0, 0));
        assert_eq!(
            model.get_voxel(IVec3::ZERO).unwrap().visibility,
            Visibility::VISIBLE
        );
    }
}
