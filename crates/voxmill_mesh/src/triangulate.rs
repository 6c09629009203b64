//! Ear-clipping triangulation of simple 2-D polygons.

use glam::{Vec2, Vec3};

const EPSILON: f32 = 1e-10;

/// Signed area of a polygon; positive for counter-clockwise winding.
pub fn area(polygon: &[Vec2]) -> f32 {
    let n = polygon.len();
    let mut total = 0.0;
    let mut p = n.wrapping_sub(1);
    for q in 0..n {
        total += polygon[p].x * polygon[q].y - polygon[q].x * polygon[p].y;
        p = q;
    }
    total * 0.5
}

/// 2-D cross product.
#[inline]
pub fn cross2(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Whether `p` lies inside (or on the border of) triangle `(a, b, c)`.
pub fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let a_cross = cross2(c - b, p - b);
    let b_cross = cross2(a - c, p - c);
    let c_cross = cross2(b - a, p - a);
    a_cross >= 0.0 && b_cross >= 0.0 && c_cross >= 0.0
}

fn snip(polygon: &[Vec2], u: usize, v: usize, w: usize, order: &[usize], live: usize) -> bool {
    let a = polygon[order[u]];
    let b = polygon[order[v]];
    let c = polygon[order[w]];

    // The candidate corner must be convex.
    if cross2(b - a, c - a) < EPSILON {
        return false;
    }

    for p in 0..live {
        if p == u || p == v || p == w {
            continue;
        }
        if point_in_triangle(polygon[order[p]], a, b, c) {
            return false;
        }
    }

    true
}

/// Triangulates a simple polygon; the result indexes into `polygon`.
///
/// Returns `None` when no progress is made for `2n` iterations, which means
/// the polygon is degenerate or self-intersecting.
pub fn triangulate(polygon: &[Vec2]) -> Option<Vec<usize>> {
    let n = polygon.len();
    if n < 3 {
        return None;
    }

    // Work on a counter-clockwise ordering.
    let mut order: Vec<usize> = if area(polygon) > 0.0 {
        (0..n).collect()
    } else {
        (0..n).rev().collect()
    };

    let mut indices = Vec::with_capacity((n - 2) * 3);
    let mut live = n;
    let mut count = 2 * live;
    let mut v = live - 1;

    while live > 2 {
        if count == 0 {
            return None;
        }
        count -= 1;

        let u = if v >= live { 0 } else { v };
        v = if u + 1 >= live { 0 } else { u + 1 };
        let w = if v + 1 >= live { 0 } else { v + 1 };

        if snip(polygon, u, v, w, &order, live) {
            indices.push(order[u]);
            indices.push(order[v]);
            indices.push(order[w]);

            order.remove(v);
            live -= 1;
            count = 2 * live;
        }
    }

    Some(indices)
}

/// Projects a 3-D point onto the dominant plane of `normal`.
///
/// The axis with the largest absolute normal component is dropped and one of
/// the remaining axes is sign-flipped so the resulting 2-D polygon has the
/// same orientation on every face of the cube.
pub fn project_to_plane(normal: Vec3, p: Vec3) -> Vec2 {
    let abs = normal.abs();

    if abs.x >= abs.y && abs.x >= abs.z {
        if normal.x > 0.0 {
            Vec2::new(-p.z, p.y)
        } else {
            Vec2::new(p.z, p.y)
        }
    } else if abs.y >= abs.x && abs.y >= abs.z {
        if normal.y > 0.0 {
            Vec2::new(p.x, -p.z)
        } else {
            Vec2::new(p.x, p.z)
        }
    } else if normal.z > 0.0 {
        Vec2::new(p.x, p.y)
    } else {
        Vec2::new(-p.x, p.y)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn square() -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn square_becomes_two_triangles() {
        let indices = triangulate(&square()).unwrap();
        assert_eq!(indices.len(), 6);
    }

    #[test]
    fn winding_does_not_matter() {
        let mut reversed = square();
        reversed.reverse();
        assert_eq!(triangulate(&reversed).unwrap().len(), 6);
    }

    #[test]
    fn l_shape_triangulates_fully() {
        let polygon = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let indices = triangulate(&polygon).unwrap();
        assert_eq!(indices.len(), (polygon.len() - 2) * 3);
    }

    #[test]
    fn degenerate_polygons_fail() {
        assert!(triangulate(&[Vec2::ZERO, Vec2::ONE]).is_none());

        // Three collinear points make no triangle.
        let collinear = vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(triangulate(&collinear).is_none());
    }

    #[test]
    fn signed_area_tracks_winding() {
        assert!(area(&square()) > 0.0);
        let mut reversed = square();
        reversed.reverse();
        assert!(area(&reversed) < 0.0);
    }

    #[test]
    fn projection_preserves_orientation_across_faces() {
        // A CCW square on the +y face stays CCW after projection, and the
        // same square seen from -y flips.
        let quad = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let up: Vec<Vec2> = quad.iter().map(|&p| project_to_plane(Vec3::Y, p)).collect();
        let down: Vec<Vec2> = quad.iter().map(|&p| project_to_plane(-Vec3::Y, p)).collect();
        assert!(area(&up) * area(&down) < 0.0);
    }
}
