//! Surface-occupancy checks for the vertex reducer.
//!
//! The reducer may re-triangulate but must never change which rays hit the
//! surface: a grid of rays is cast against the original and the reduced
//! mesh and the hit patterns have to match.

use glam::{IVec3, Vec3};
use voxmill_mesh::{Mesh, Mesher, SimpleMesher, VertexReducer};
use voxmill_voxel::VoxelModel;

/// Möller-Trumbore ray/triangle intersection.
fn ray_hits_triangle(origin: Vec3, direction: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    const EPSILON: f32 = 1e-7;

    let edge1 = b - a;
    let edge2 = c - a;
    let h = direction.cross(edge2);
    let det = edge1.dot(h);
    if det.abs() < EPSILON {
        return false;
    }

    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = inv_det * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }

    let q = s.cross(edge1);
    let v = inv_det * direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }

    inv_det * edge2.dot(q) > EPSILON
}

fn ray_hits_mesh(mesh: &Mesh, origin: Vec3, direction: Vec3) -> bool {
    mesh.surfaces.iter().any(|surface| {
        surface.indices.chunks_exact(3).any(|triangle| {
            ray_hits_triangle(
                origin,
                direction,
                surface.vertices[triangle[0] as usize].pos,
                surface.vertices[triangle[1] as usize].pos,
                surface.vertices[triangle[2] as usize].pos,
            )
        })
    })
}

fn assert_same_occupancy(original: &Mesh, reduced: &Mesh) {
    // Rays through cell centers from every axis direction; sub-cell sampling
    // keeps rays away from triangle edges.
    for step in 0..6 {
        let offset = 0.25 + step as f32 * 0.1;
        for u in -4..8 {
            for v in -4..8 {
                let across = Vec3::new(u as f32 + offset, v as f32 + offset, -10.0);
                for (origin, direction) in [
                    (across, Vec3::Z),
                    (Vec3::new(-10.0, u as f32 + offset, v as f32 + offset), Vec3::X),
                    (Vec3::new(u as f32 + offset, -10.0, v as f32 + offset), Vec3::Y),
                ] {
                    assert_eq!(
                        ray_hits_mesh(original, origin, direction),
                        ray_hits_mesh(reduced, origin, direction),
                        "occupancy diverged for ray {origin:?} -> {direction:?}"
                    );
                }
            }
        }
    }
}

fn meshed(cells: &[IVec3]) -> Mesh {
    let mut model = VoxelModel::new();
    for &pos in cells {
        model.set_voxel(pos, 0, 1, false);
    }
    model.generate_visibility();
    SimpleMesher.generate_mesh(&model).unwrap()
}

#[test]
fn slab_reduction_keeps_the_surface() {
    let mesh = meshed(&[
        IVec3::new(0, 0, 0),
        IVec3::new(1, 0, 0),
        IVec3::new(0, 0, 1),
        IVec3::new(1, 0, 1),
    ]);
    let reduced = VertexReducer::reduce(&mesh);

    assert!(reduced.triangle_count() < mesh.triangle_count());
    assert_same_occupancy(&mesh, &reduced);
}

#[test]
fn plus_sign_reduction_keeps_the_surface() {
    let mesh = meshed(&[
        IVec3::new(1, 0, 1),
        IVec3::new(0, 0, 1),
        IVec3::new(2, 0, 1),
        IVec3::new(1, 0, 0),
        IVec3::new(1, 0, 2),
    ]);
    let reduced = VertexReducer::reduce(&mesh);

    assert!(reduced.triangle_count() <= mesh.triangle_count());
    assert_same_occupancy(&mesh, &reduced);
}

#[test]
fn large_plate_reduces_and_keeps_the_surface() {
    let mut cells = Vec::new();
    for z in 0..5 {
        for x in 0..5 {
            cells.push(IVec3::new(x, 0, z));
        }
    }
    let mesh = meshed(&cells);
    let reduced = VertexReducer::reduce(&mesh);

    assert!(reduced.triangle_count() < mesh.triangle_count());
    assert_same_occupancy(&mesh, &reduced);
}
