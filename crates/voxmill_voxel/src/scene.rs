//! The scene tree.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use voxmill_math::transform;

use crate::VoxelModel;

/// An ordered sequence of models played as animation frames.
#[derive(Default)]
pub struct VoxelAnimation {
    frames: Vec<AnimationFrame>,
}

pub struct AnimationFrame {
    pub model: Arc<VoxelModel>,
    /// Cumulative end time of this frame in milliseconds.
    pub time_ms: u32,
}

impl VoxelAnimation {
    /// Default frame duration when the source format has no timing data.
    pub const FRAME_TIME: u32 = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_frame(&mut self, model: Arc<VoxelModel>, time_ms: u32) {
        self.frames.push(AnimationFrame { model, time_ms });
    }

    #[inline]
    pub fn frames(&self) -> &[AnimationFrame] {
        &self.frames
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// A node of the scene tree.
///
/// The tree owns its nodes; models and animations are shared handles. A node
/// references a model or an animation, never both.
pub struct SceneNode {
    pub name: String,
    pub position: Vec3,
    /// Euler rotation in radians.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub visible: bool,
    pub model: Option<Arc<VoxelModel>>,
    pub animation: Option<Arc<VoxelAnimation>>,
    children: Vec<SceneNode>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            visible: true,
            model: None,
            animation: None,
            children: Vec::new(),
        }
    }
}

impl SceneNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<VoxelModel>) -> Self {
        Self {
            name: model.name.clone(),
            model: Some(model),
            ..Self::default()
        }
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    #[inline]
    pub fn children(&self) -> &[SceneNode] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut [SceneNode] {
        &mut self.children
    }

    /// The node's own model matrix from its SRT; composed with parent
    /// matrices during traversal.
    pub fn model_matrix(&self) -> Mat4 {
        transform::compose_srt(self.position, self.rotation, self.scale)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(SceneNode::subtree_len).sum::<usize>()
    }
}

/// Everything an importer produces: the models, the scene tree referencing
/// them, and any animations.
#[derive(Default)]
pub struct VoxelScene {
    pub models: Vec<Arc<VoxelModel>>,
    pub root: SceneNode,
    pub animations: Vec<Arc<VoxelAnimation>>,
}

impl VoxelScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scene holding a single model under the root.
    pub fn from_model(model: VoxelModel) -> Self {
        let model = Arc::new(model);
        let mut root = SceneNode::new();
        root.add_child(SceneNode::with_model(model.clone()));
        Self {
            models: vec![model],
            root,
            animations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use glam::IVec3;

    use super::*;

    #[test]
    fn node_matrix_applies_translation() {
        let mut node = SceneNode::new();
        node.position = Vec3::new(1.0, 2.0, 3.0);

        let p = node.model_matrix().transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn scene_from_model_links_the_model() {
        let mut model = VoxelModel::new();
        model.set_voxel(IVec3::ZERO, 0, 1, false);
        let scene = VoxelScene::from_model(model);

        assert_eq!(scene.models.len(), 1);
        assert_eq!(scene.root.subtree_len(), 2);
        assert!(scene.root.children()[0].model.is_some());
    }

    #[test]
    fn animation_frames_keep_cumulative_times() {
        let mut anim = VoxelAnimation::new();
        anim.add_frame(Arc::new(VoxelModel::new()), 100);
        anim.add_frame(Arc::new(VoxelModel::new()), 200);

        assert_eq!(anim.frames()[1].time_ms, 200);
    }
}
