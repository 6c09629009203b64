//! The mesher contract and registry.

use glam::Mat4;
use tracing::debug;
use voxmill_math::{BBox, Frustum};
use voxmill_voxel::{ChunkMeta, SceneNode, VoxelModel};

use crate::{pool, GreedyChunkedMesher, GreedyMesher, Mesh, SimpleMesher};

/// One meshed chunk.
pub struct MeshChunk {
    pub unique_id: u64,
    pub inner_bbox: BBox,
    pub total_bbox: BBox,
    pub mesh: Mesh,
}

/// Common contract of all meshers.
///
/// `generate_chunks` queries the model's chunks (optionally only dirty ones,
/// optionally frustum-culled), clears their dirty flags, and meshes one task
/// per chunk on the worker pool. Results come back in chunk order. Meshing
/// never fails on data: malformed voxels resolve to the default material and
/// an empty chunk set yields an empty list.
pub trait Mesher: Sync {
    /// Meshes a single chunk of the model.
    fn mesh_chunk(&self, model: &VoxelModel, chunk: &ChunkMeta) -> Mesh;

    /// Meshes the model chunk by chunk.
    fn generate_chunks(
        &self,
        model: &VoxelModel,
        only_dirty: bool,
        frustum: Option<&Frustum>,
    ) -> Vec<MeshChunk> {
        let chunks = if only_dirty {
            model.voxels().query_dirty_chunks(frustum)
        } else {
            model.voxels().query_chunks(frustum)
        };

        debug!(model = %model.name, chunks = chunks.len(), only_dirty, "meshing chunks");

        for meta in &chunks {
            model.voxels().mark_as_processed(meta);
        }

        pool::parallel_map(chunks, |meta| MeshChunk {
            unique_id: meta.unique_id,
            inner_bbox: meta.inner_bbox,
            total_bbox: meta.total_bbox,
            mesh: self.mesh_chunk(model, &meta),
        })
    }

    /// Meshes the whole model into one mesh, merging all chunks.
    fn generate_mesh(&self, model: &VoxelModel) -> Option<Mesh> {
        let mut chunks = self.generate_chunks(model, false, None).into_iter();
        let mut mesh = chunks.next()?.mesh;
        for chunk in chunks {
            mesh.merge(chunk.mesh);
        }
        mesh.name = model.name.clone();
        Some(mesh)
    }

    /// Meshes every model and animation frame reachable from `root`,
    /// composing node transforms into each mesh's model matrix.
    fn generate_scene(&self, root: &SceneNode) -> Vec<Mesh> {
        fn walk<M: Mesher + ?Sized>(mesher: &M, node: &SceneNode, parent: Mat4, out: &mut Vec<Mesh>) {
            let matrix = parent * node.model_matrix();

            if let Some(model) = &node.model {
                if model.voxel_count() > 0 {
                    if let Some(mut mesh) = mesher.generate_mesh(model) {
                        mesh.model_matrix = matrix;
                        if mesh.name.is_empty() {
                            mesh.name = node.name.clone();
                        }
                        out.push(mesh);
                    }
                }
            }

            if let Some(animation) = &node.animation {
                for frame in animation.frames() {
                    if let Some(mut mesh) = mesher.generate_mesh(&frame.model) {
                        mesh.model_matrix = matrix;
                        mesh.frame_time = frame.time_ms;
                        if mesh.name.is_empty() {
                            mesh.name = node.name.clone();
                        }
                        out.push(mesh);
                    }
                }
            }

            for child in node.children() {
                walk(mesher, child, matrix, out);
            }
        }

        let mut meshes = Vec::new();
        walk(self, root, Mat4::IDENTITY, &mut meshes);
        meshes
    }
}

/// Which mesher to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MesherKind {
    /// One quad per visible voxel face.
    Simple,
    /// Greedy merging, one output mesh per model with cross-chunk merging.
    Greedy,
    /// Greedy merging per chunk, one output mesh per chunk.
    GreedyChunked,
    /// Greedy merging with a generated texture atlas.
    GreedyTextured,
}

impl MesherKind {
    pub fn create(self) -> Box<dyn Mesher> {
        match self {
            MesherKind::Simple => Box::new(SimpleMesher),
            MesherKind::Greedy => Box::new(GreedyMesher::new(false)),
            MesherKind::GreedyChunked => Box::new(GreedyChunkedMesher),
            MesherKind::GreedyTextured => Box::new(GreedyMesher::new(true)),
        }
    }
}
