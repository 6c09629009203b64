//! The chunk map: sparse storage over dense chunks.

use glam::IVec3;
use indexmap::IndexMap;
use voxmill_math::{hash_ivec3, BBox, Frustum, PositionHash};

use crate::{Chunk, Voxel, CHUNK_SIZE};

/// Metadata handed out by the chunk queries.
#[derive(Clone, Copy)]
pub struct ChunkMeta<'a> {
    /// Stable opaque identifier for the chunk (for its lifetime).
    pub unique_id: u64,
    /// World position of the chunk's first cell.
    pub origin: IVec3,
    /// The full world-space extent of the chunk.
    pub total_bbox: BBox,
    /// World-space bounding box of the cells inside the chunk.
    pub inner_bbox: BBox,
    pub chunk: &'a Chunk,
}

/// Sparse voxel storage: a map from chunk origins to dense [`Chunk`]s.
///
/// Origins are canonicalized by flooring world positions to a multiple of
/// [`CHUNK_SIZE`], so chunks never overlap and every world position belongs
/// to exactly one chunk. The map iterates in insertion order, which is the
/// stable chunk order all queries and meshes follow.
#[derive(Default)]
pub struct VoxelSpace {
    chunks: IndexMap<IVec3, Chunk, PositionHash>,
    count: usize,
}

/// The chunk origin enclosing `pos`.
#[inline]
pub fn chunk_origin(pos: IVec3) -> IVec3 {
    // CHUNK_SIZE is a power of two, so masking floors correctly for negative
    // coordinates as well.
    const MASK: i32 = !(CHUNK_SIZE - 1);
    IVec3::new(pos.x & MASK, pos.y & MASK, pos.z & MASK)
}

impl VoxelSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instantiated voxels across all chunks.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn chunk_at(&self, origin: IVec3) -> Option<&Chunk> {
        self.chunks.get(&origin)
    }

    #[inline]
    pub(crate) fn chunk_mut(&mut self, origin: IVec3) -> Option<&mut Chunk> {
        self.chunks.get_mut(&origin)
    }

    /// Writes a voxel, creating the enclosing chunk on first touch. Existing
    /// cells are overwritten.
    pub fn insert(&mut self, pos: IVec3, voxel: Voxel) {
        let origin = chunk_origin(pos);
        let chunk = self.chunks.entry(origin).or_default();
        if chunk.insert(pos - origin, voxel) {
            self.count += 1;
        }
    }

    /// Erases the voxel at `pos` and returns the position of the next
    /// instantiated voxel in iteration order, so sweeps can continue across
    /// chunk borders.
    pub fn erase(&mut self, pos: IVec3) -> Option<IVec3> {
        let origin = chunk_origin(pos);
        let chunk = self.chunks.get_mut(&origin)?;
        if chunk.erase(pos - origin) {
            self.count -= 1;
        }
        self.next_voxel(pos)
    }

    #[inline]
    pub fn find(&self, pos: IVec3) -> Option<&Voxel> {
        let origin = chunk_origin(pos);
        self.chunks.get(&origin)?.find(pos - origin)
    }

    #[inline]
    pub fn find_mut(&mut self, pos: IVec3) -> Option<&mut Voxel> {
        let origin = chunk_origin(pos);
        let chunk = self.chunks.get_mut(&origin)?;
        let voxel = chunk.get_mut(pos - origin);
        voxel.is_instantiated().then(|| voxel)
    }

    /// As [`find`](VoxelSpace::find), filtered on the transparency class.
    #[inline]
    pub fn find_filtered(&self, pos: IVec3, opaque: bool) -> Option<&Voxel> {
        self.find(pos).filter(|v| v.is_transparent() != opaque)
    }

    #[inline]
    pub fn find_visible(&self, pos: IVec3) -> Option<&Voxel> {
        self.find(pos).filter(|v| v.is_visible())
    }

    #[inline]
    pub fn find_visible_filtered(&self, pos: IVec3, opaque: bool) -> Option<&Voxel> {
        self.find_visible(pos).filter(|v| v.is_transparent() != opaque)
    }

    /// Every visible voxel of the requested transparency class, in iteration
    /// order. A full scan, for debugging and single-pass meshers.
    pub fn query_visible(&self, opaque: bool) -> IndexMap<IVec3, &Voxel, PositionHash> {
        let mut result = IndexMap::default();
        for (pos, voxel) in self.iter() {
            if voxel.is_visible() && voxel.is_transparent() != opaque {
                result.insert(pos, voxel);
            }
        }
        result
    }

    fn chunk_meta<'a>(&self, origin: IVec3, chunk: &'a Chunk) -> ChunkMeta<'a> {
        ChunkMeta {
            unique_id: hash_ivec3(origin),
            origin,
            total_bbox: BBox::new(origin, origin + IVec3::splat(CHUNK_SIZE)),
            inner_bbox: chunk.inner_bbox().translated(origin),
            chunk,
        }
    }

    /// Enumerates chunks; with a frustum, only chunks whose total bounding
    /// box intersects it.
    pub fn query_chunks(&self, frustum: Option<&Frustum>) -> Vec<ChunkMeta<'_>> {
        self.chunks
            .iter()
            .map(|(&origin, chunk)| self.chunk_meta(origin, chunk))
            .filter(|meta| frustum.map_or(true, |f| f.intersects_bbox(&meta.total_bbox)))
            .collect()
    }

    /// As [`query_chunks`](VoxelSpace::query_chunks), restricted to dirty
    /// chunks. Does not clear dirty flags.
    pub fn query_dirty_chunks(&self, frustum: Option<&Frustum>) -> Vec<ChunkMeta<'_>> {
        self.chunks
            .iter()
            .filter(|(_, chunk)| chunk.is_dirty())
            .map(|(&origin, chunk)| self.chunk_meta(origin, chunk))
            .filter(|meta| frustum.map_or(true, |f| f.intersects_bbox(&meta.total_bbox)))
            .collect()
    }

    /// Clears the dirty flag of the chunk behind `meta`.
    pub fn mark_as_processed(&self, meta: &ChunkMeta) {
        if let Some(chunk) = self.chunks.get(&meta.origin) {
            chunk.mark_processed();
        }
    }

    /// Tightens inner bounding boxes left loose by erases.
    pub fn shrink_inner(&mut self) {
        for chunk in self.chunks.values_mut() {
            chunk.shrink();
        }
    }

    /// The bounding box over all instantiated cells, merged from the chunk
    /// inner boxes.
    pub fn calculate_bbox(&self) -> BBox {
        let mut bbox = BBox::default();
        for (&origin, chunk) in &self.chunks {
            bbox.merge(&chunk.inner_bbox().translated(origin));
        }
        bbox
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.count = 0;
    }

    /// The first instantiated voxel at or after `after` (exclusive) in
    /// iteration order: chunk-major, then z-y-x inside each chunk.
    pub fn next_voxel(&self, after: IVec3) -> Option<IVec3> {
        let origin = chunk_origin(after);
        let mut index = match self.chunks.get_index_of(&origin) {
            Some(index) => {
                let chunk = &self.chunks[index];
                let rel = after - origin;
                // Step once in x and let the scan handle carries.
                if let Some(next) = chunk.next_voxel(Some(rel + IVec3::X)) {
                    return Some(origin + next);
                }
                index + 1
            }
            None => 0,
        };

        while index < self.chunks.len() {
            let (&origin, chunk) = self.chunks.get_index(index).unwrap();
            if let Some(next) = chunk.next_voxel(None) {
                return Some(origin + next);
            }
            index += 1;
        }

        None
    }

    /// Iterates all instantiated voxels in stable order.
    pub fn iter(&self) -> VoxelIter<'_> {
        VoxelIter {
            space: self,
            chunk_index: 0,
            cursor: None,
        }
    }
}

/// Forward-only iterator over instantiated cells, chunk-major then cell-major
/// (z, y, x) inside each chunk's inner bounding box.
pub struct VoxelIter<'a> {
    space: &'a VoxelSpace,
    chunk_index: usize,
    cursor: Option<IVec3>,
}

impl<'a> Iterator for VoxelIter<'a> {
    type Item = (IVec3, &'a Voxel);

    fn next(&mut self) -> Option<Self::Item> {
        while self.chunk_index < self.space.chunks.len() {
            let (&origin, chunk) = self.space.chunks.get_index(self.chunk_index)?;

            let from = self.cursor.map(|rel| rel + IVec3::X);
            if let Some(rel) = chunk.next_voxel(from) {
                self.cursor = Some(rel);
                return Some((origin + rel, chunk.get(rel)));
            }

            self.chunk_index += 1;
            self.cursor = None;
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn solid(color: u8) -> Voxel {
        Voxel::new(0, color, false)
    }

    #[test]
    fn origins_are_floored_to_chunk_multiples() {
        assert_eq!(chunk_origin(IVec3::new(0, 0, 0)), IVec3::ZERO);
        assert_eq!(chunk_origin(IVec3::new(15, 1, 7)), IVec3::ZERO);
        assert_eq!(chunk_origin(IVec3::new(16, 0, 0)), IVec3::new(16, 0, 0));
        assert_eq!(chunk_origin(IVec3::new(-1, -16, -17)), IVec3::new(-16, -16, -32));
    }

    #[test]
    fn insert_then_find_then_erase() {
        let mut space = VoxelSpace::new();
        let pos = IVec3::new(5, 3, 9);
        space.insert(pos, solid(7));

        assert_eq!(space.len(), 1);
        assert_eq!(space.find(pos).unwrap().color, 7);

        space.erase(pos);
        assert_eq!(space.len(), 0);
        assert!(space.find(pos).is_none());
    }

    #[test]
    fn overwrite_does_not_grow_count() {
        let mut space = VoxelSpace::new();
        space.insert(IVec3::ZERO, solid(1));
        space.insert(IVec3::ZERO, solid(2));
        assert_eq!(space.len(), 1);
        assert_eq!(space.find(IVec3::ZERO).unwrap().color, 2);
    }

    #[test]
    fn positions_outside_any_declared_size_are_accepted() {
        let mut space = VoxelSpace::new();
        space.insert(IVec3::new(1000, -1000, 0), solid(1));
        assert_eq!(space.len(), 1);
        assert_eq!(space.chunk_count(), 1);
    }

    #[test]
    fn iterator_walks_chunks_in_insertion_order() {
        let mut space = VoxelSpace::new();
        // Second chunk created first.
        space.insert(IVec3::new(20, 0, 0), solid(1));
        space.insert(IVec3::new(1, 0, 0), solid(2));
        space.insert(IVec3::new(0, 0, 0), solid(3));

        let positions: Vec<IVec3> = space.iter().map(|(pos, _)| pos).collect();
        assert_eq!(
            positions,
            vec![IVec3::new(20, 0, 0), IVec3::new(0, 0, 0), IVec3::new(1, 0, 0)]
        );
    }

    #[test]
    fn erase_returns_next_voxel_across_chunks() {
        let mut space = VoxelSpace::new();
        space.insert(IVec3::new(15, 0, 0), solid(1));
        space.insert(IVec3::new(16, 0, 0), solid(2));

        let next = space.erase(IVec3::new(15, 0, 0));
        assert_eq!(next, Some(IVec3::new(16, 0, 0)));
        let next = space.erase(IVec3::new(16, 0, 0));
        assert_eq!(next, None);
    }

    #[test]
    fn dirty_chunks_are_tracked_and_cleared() {
        let mut space = VoxelSpace::new();
        space.insert(IVec3::ZERO, solid(1));
        space.insert(IVec3::new(40, 0, 0), solid(1));

        assert_eq!(space.query_dirty_chunks(None).len(), 2);

        let metas = space.query_dirty_chunks(None);
        space.mark_as_processed(&metas[0]);
        assert_eq!(space.query_dirty_chunks(None).len(), 1);

        // Querying does not clear.
        assert_eq!(space.query_dirty_chunks(None).len(), 1);
    }

    #[test]
    fn unique_ids_are_stable_and_distinct() {
        let mut space = VoxelSpace::new();
        space.insert(IVec3::ZERO, solid(1));
        space.insert(IVec3::new(16, 0, 0), solid(1));

        let a = space.query_chunks(None);
        let b = space.query_chunks(None);
        assert_eq!(a[0].unique_id, b[0].unique_id);
        assert_ne!(a[0].unique_id, a[1].unique_id);
    }

    #[test]
    fn query_visible_filters_class() {
        let mut space = VoxelSpace::new();
        space.insert(IVec3::ZERO, Voxel::new(0, 1, false));
        space.insert(IVec3::new(2, 0, 0), Voxel::new(0, 1, true));

        assert_eq!(space.query_visible(true).len(), 1);
        assert_eq!(space.query_visible(false).len(), 1);
        assert!(space.query_visible(true).contains_key(&IVec3::ZERO));
    }

    #[test]
    fn calculate_bbox_covers_all_cells() {
        let mut space = VoxelSpace::new();
        space.insert(IVec3::new(-5, 0, 0), solid(1));
        space.insert(IVec3::new(20, 3, 1), solid(1));

        let bbox = space.calculate_bbox();
        assert_eq!(bbox.beg, IVec3::new(-5, 0, 0));
        assert_eq!(bbox.end, IVec3::new(21, 4, 2));
    }
}
