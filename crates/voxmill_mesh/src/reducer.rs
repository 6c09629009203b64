//! Vertex reduction: collapses coplanar triangle fans.
//!
//! For every vertex whose surrounding triangles form a closed coplanar fan,
//! the fan is replaced by an ear-clipped re-triangulation of its boundary
//! polygon, removing the center vertex. A second pass additionally merges
//! collinear boundary points before re-triangulating. Any polygon that fails
//! to close or to triangulate leaves its fan untouched, so the pass never
//! grows the triangle count and never changes the covered surface.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3};
use tracing::debug;

use crate::triangulate::{self, area, cross2, project_to_plane};
use crate::{Mesh, MeshBuilder, Surface};

/// Post-processes a mesh to reduce its triangle and vertex count.
pub struct VertexReducer;

impl VertexReducer {
    pub fn reduce(mesh: &Mesh) -> Mesh {
        let mut builder = MeshBuilder::new();
        builder.set_textures(mesh.textures.clone());
        builder.name = mesh.name.clone();
        builder.model_matrix = mesh.model_matrix;
        builder.frame_time = mesh.frame_time;

        for surface in &mesh.surfaces {
            reduce_surface(surface, &mut builder);
        }

        builder.build()
    }
}

struct Triangles {
    /// All triangles, dead ones flagged off.
    tris: Vec<([u32; 3], bool)>,
    /// Triangle ids per vertex index.
    by_vertex: BTreeMap<u32, Vec<usize>>,
}

impl Triangles {
    fn of(surface: &Surface) -> Self {
        let mut tris = Vec::with_capacity(surface.indices.len() / 3);
        let mut by_vertex: BTreeMap<u32, Vec<usize>> = BTreeMap::new();

        for triangle in surface.indices.chunks_exact(3) {
            let id = tris.len();
            tris.push(([triangle[0], triangle[1], triangle[2]], true));
            for &index in triangle {
                by_vertex.entry(index).or_default().push(id);
            }
        }

        Self { tris, by_vertex }
    }

    fn fan_of(&self, center: u32) -> Vec<usize> {
        self.by_vertex
            .get(&center)
            .map(|ids| ids.iter().copied().filter(|&id| self.tris[id].1).collect())
            .unwrap_or_default()
    }

    fn commit(&mut self, center: u32, fan: &[usize], new_tris: Vec<[u32; 3]>) {
        for &id in fan {
            self.tris[id].1 = false;
        }
        self.by_vertex.remove(&center);

        for triangle in new_tris {
            let id = self.tris.len();
            self.tris.push((triangle, true));
            for &index in &triangle {
                self.by_vertex.entry(index).or_default().push(id);
            }
        }
    }

    fn alive(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.tris
            .iter()
            .filter(|(_, alive)| *alive)
            .map(|&(triangle, _)| triangle)
    }

    fn alive_count(&self) -> usize {
        self.tris.iter().filter(|(_, alive)| *alive).count()
    }
}

fn reduce_surface(surface: &Surface, builder: &mut MeshBuilder) {
    let mut triangles = Triangles::of(surface);
    let before = triangles.alive_count();

    collapse_fans(surface, &mut triangles, false);
    collapse_fans(surface, &mut triangles, true);

    debug!(
        before,
        after = triangles.alive_count(),
        "reduced surface"
    );

    for triangle in triangles.alive().collect::<Vec<_>>() {
        builder.add_triangle(
            surface.vertices[triangle[0] as usize],
            surface.vertices[triangle[1] as usize],
            surface.vertices[triangle[2] as usize],
            &surface.material,
        );
    }
}

/// One sweep over all candidate center vertices. With `merge_collinear` the
/// boundary polygon is re-linked by angle around its centroid and collinear
/// points are dropped before triangulating.
fn collapse_fans(surface: &Surface, triangles: &mut Triangles, merge_collinear: bool) {
    let centers: Vec<u32> = triangles.by_vertex.keys().copied().collect();

    for center in centers {
        let fan = triangles.fan_of(center);
        if fan.len() < 3 {
            continue;
        }

        let normal = surface.vertices[center as usize].normal;
        let mut polygon = Polygon::from_fan(surface, triangles, &fan, normal);
        polygon.remove(center);

        if merge_collinear {
            polygon.relink_by_angle();
            polygon.drop_collinear();
        }

        if !polygon.is_closed() {
            continue;
        }

        let fan_area = fan_area(surface, triangles, &fan, normal);
        let new_tris = match polygon.triangulate() {
            Some(tris) => tris,
            None => continue,
        };

        if new_tris.len() >= fan.len() {
            continue;
        }

        // The re-triangulated boundary has to cover exactly the area the fan
        // covered, otherwise the silhouette would change.
        let new_area: f32 = new_tris
            .iter()
            .map(|t| triangle_area_2d(surface, *t, normal))
            .sum();
        if (new_area.abs() - fan_area.abs()).abs() > 1e-4 * fan_area.abs().max(1.0) {
            continue;
        }

        triangles.commit(center, &fan, new_tris);
    }
}

fn triangle_area_2d(surface: &Surface, triangle: [u32; 3], normal: Vec3) -> f32 {
    let points: Vec<Vec2> = triangle
        .iter()
        .map(|&i| project_to_plane(normal, surface.vertices[i as usize].pos))
        .collect();
    area(&points)
}

fn fan_area(surface: &Surface, triangles: &Triangles, fan: &[usize], normal: Vec3) -> f32 {
    fan.iter()
        .map(|&id| triangle_area_2d(surface, triangles.tris[id].0, normal))
        .sum()
}

struct Point {
    pos: Vec3,
    nexts: Vec<u32>,
    prevs: Vec<u32>,
}

/// The boundary polygon of a fan, as doubly linked points keyed by vertex
/// index.
struct Polygon {
    points: BTreeMap<u32, Point>,
    normal: Vec3,
}

impl Polygon {
    /// Builds the polygon from the fan's triangles, linking each triangle's
    /// vertices along a consistent winding (taken from the first triangle).
    fn from_fan(surface: &Surface, triangles: &Triangles, fan: &[usize], normal: Vec3) -> Self {
        let mut polygon = Self {
            points: BTreeMap::new(),
            normal,
        };

        let clockwise = {
            let first = triangles.tris[fan[0]].0;
            let projected: Vec<Vec2> = first
                .iter()
                .map(|&i| project_to_plane(normal, surface.vertices[i as usize].pos))
                .collect();
            area(&projected) < 0.0
        };

        for &id in fan {
            let tri = triangles.tris[id].0;
            for k in 0..3 {
                let from = tri[k];
                let to = tri[(k + 1) % 3];
                polygon.ensure_point(from, surface.vertices[from as usize].pos);
                polygon.ensure_point(to, surface.vertices[to as usize].pos);
                if clockwise {
                    polygon.link(to, from);
                } else {
                    polygon.link(from, to);
                }
            }
        }

        polygon
    }

    fn ensure_point(&mut self, index: u32, pos: Vec3) {
        self.points.entry(index).or_insert(Point {
            pos,
            nexts: Vec::new(),
            prevs: Vec::new(),
        });
    }

    fn link(&mut self, from: u32, to: u32) {
        let point = self.points.get_mut(&from).unwrap();
        if !point.nexts.contains(&to) {
            point.nexts.push(to);
        }
        let point = self.points.get_mut(&to).unwrap();
        if !point.prevs.contains(&from) {
            point.prevs.push(from);
        }
    }

    fn remove(&mut self, index: u32) {
        self.points.remove(&index);
        for point in self.points.values_mut() {
            point.nexts.retain(|&i| i != index);
            point.prevs.retain(|&i| i != index);
        }
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    /// A polygon is closed when every point has exactly one predecessor and
    /// one successor and a walk along `next` visits every point once.
    fn is_closed(&self) -> bool {
        if self.len() < 3 {
            return false;
        }
        if self
            .points
            .values()
            .any(|p| p.nexts.len() != 1 || p.prevs.len() != 1)
        {
            return false;
        }
        self.cycle().map_or(false, |cycle| cycle.len() == self.len())
    }

    /// Walks `next` links from the first point back around to it.
    fn cycle(&self) -> Option<Vec<u32>> {
        let start = *self.points.keys().next()?;
        let mut cycle = Vec::with_capacity(self.len());
        let mut current = start;

        loop {
            cycle.push(current);
            current = *self.points.get(&current)?.nexts.first()?;
            if current == start {
                return Some(cycle);
            }
            if cycle.len() > self.len() {
                return None;
            }
        }
    }

    /// Re-links all points into one cycle ordered by angle around the
    /// centroid (in the projected plane). Used by the collinear-merge pass;
    /// the area check after triangulation guards against non-star-shaped
    /// regions.
    fn relink_by_angle(&mut self) {
        if self.points.is_empty() {
            return;
        }

        let centroid = self
            .points
            .values()
            .map(|p| project_to_plane(self.normal, p.pos))
            .fold(Vec2::ZERO, |acc, p| acc + p)
            / self.points.len() as f32;

        let mut ordered: Vec<u32> = self.points.keys().copied().collect();
        ordered.sort_by(|&a, &b| {
            let pa = project_to_plane(self.normal, self.points[&a].pos) - centroid;
            let pb = project_to_plane(self.normal, self.points[&b].pos) - centroid;
            pa.y.atan2(pa.x)
                .partial_cmp(&pb.y.atan2(pb.x))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for point in self.points.values_mut() {
            point.nexts.clear();
            point.prevs.clear();
        }
        for k in 0..ordered.len() {
            let from = ordered[k];
            let to = ordered[(k + 1) % ordered.len()];
            self.link(from, to);
        }
    }

    /// Removes points whose adjacent edges are collinear (zero cross
    /// product).
    fn drop_collinear(&mut self) {
        loop {
            let candidate = self.points.iter().find_map(|(&index, point)| {
                let (&prev, &next) = (point.prevs.first()?, point.nexts.first()?);
                if prev == next {
                    return None;
                }
                let a = project_to_plane(self.normal, self.points.get(&prev)?.pos);
                let b = project_to_plane(self.normal, point.pos);
                let c = project_to_plane(self.normal, self.points.get(&next)?.pos);
                (cross2(b - a, c - a) == 0.0).then(|| (index, prev, next))
            });

            match candidate {
                Some((index, prev, next)) => {
                    self.remove(index);
                    self.link(prev, next);
                }
                None => break,
            }
        }
    }

    /// Ear-clips the boundary. Returns the new triangles as vertex indices.
    fn triangulate(&self) -> Option<Vec<[u32; 3]>> {
        let cycle = self.cycle()?;
        if cycle.len() < 3 {
            return None;
        }

        let projected: Vec<Vec2> = cycle
            .iter()
            .map(|index| project_to_plane(self.normal, self.points[index].pos))
            .collect();

        let indices = triangulate::triangulate(&projected)?;
        Some(
            indices
                .chunks_exact(3)
                .map(|t| [cycle[t[0]], cycle[t[1]], cycle[t[2]]])
                .collect(),
        )
    }
}

#[cfg(test)]
mod test {
    use glam::IVec3;
    use voxmill_voxel::VoxelModel;

    use crate::{Mesher, SimpleMesher};

    use super::*;

    fn simple_mesh_of(cells: &[IVec3]) -> Mesh {
        let mut model = VoxelModel::new();
        for &pos in cells {
            model.set_voxel(pos, 0, 1, false);
        }
        model.generate_visibility();
        SimpleMesher.generate_mesh(&model).unwrap()
    }

    #[test]
    fn slab_interior_vertices_collapse() {
        // A 2x1x2 slab meshed simply: the top face has an interior vertex
        // shared by all four quads, which the reducer must remove.
        let mesh = simple_mesh_of(&[
            IVec3::new(0, 0, 0),
            IVec3::new(1, 0, 0),
            IVec3::new(0, 0, 1),
            IVec3::new(1, 0, 1),
        ]);

        let reduced = VertexReducer::reduce(&mesh);
        assert!(
            reduced.triangle_count() < mesh.triangle_count(),
            "expected a strict reduction, got {} -> {}",
            mesh.triangle_count(),
            reduced.triangle_count()
        );
    }

    #[test]
    fn plus_sign_never_grows() {
        let mesh = simple_mesh_of(&[
            IVec3::new(0, 0, 0),
            IVec3::new(1, 0, 0),
            IVec3::new(-1, 0, 0),
            IVec3::new(0, 0, 1),
            IVec3::new(0, 0, -1),
        ]);

        let reduced = VertexReducer::reduce(&mesh);
        assert!(reduced.triangle_count() <= mesh.triangle_count());
        assert!(!reduced.is_empty());
    }

    #[test]
    fn single_cube_is_untouched() {
        let mesh = simple_mesh_of(&[IVec3::ZERO]);
        let reduced = VertexReducer::reduce(&mesh);
        assert_eq!(reduced.triangle_count(), mesh.triangle_count());
    }

    #[test]
    fn reduction_preserves_material_and_textures() {
        let mesh = simple_mesh_of(&[IVec3::ZERO, IVec3::new(1, 0, 0)]);
        let reduced = VertexReducer::reduce(&mesh);
        assert_eq!(reduced.surfaces.len(), mesh.surfaces.len());
    }
}
