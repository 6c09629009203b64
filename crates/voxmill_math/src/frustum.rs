//! View frustum culling.

use glam::Vec3;

use crate::BBox;

/// A plane in the form `normal · p + d = 0`. Points with
/// `normal · p + d >= 0` are on the inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Builds a plane from a point on the plane and an inward normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self::new(normal, -normal.dot(point))
    }

    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// Six plane equations with inward-facing normals, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Whether `bbox` is at least partially inside the frustum.
    ///
    /// Tests the positive vertex of the box against every plane; a box that
    /// is fully behind any single plane is rejected. Boxes that straddle
    /// plane corners conservatively count as inside.
    pub fn intersects_bbox(&self, bbox: &BBox) -> bool {
        if bbox.is_empty() {
            return false;
        }

        let beg = bbox.beg.as_vec3();
        let end = bbox.end.as_vec3();

        for plane in &self.planes {
            // Positive vertex: the box corner furthest along the plane normal.
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { end.x } else { beg.x },
                if plane.normal.y >= 0.0 { end.y } else { beg.y },
                if plane.normal.z >= 0.0 { end.z } else { beg.z },
            );

            if plane.distance(p) < 0.0 {
                return false;
            }
        }

        true
    }

    /// An axis-aligned box frustum, mostly useful in tests and tools.
    pub fn from_box(min: Vec3, max: Vec3) -> Self {
        Self::new([
            Plane::from_point_normal(min, Vec3::X),
            Plane::from_point_normal(max, -Vec3::X),
            Plane::from_point_normal(min, Vec3::Y),
            Plane::from_point_normal(max, -Vec3::Y),
            Plane::from_point_normal(min, Vec3::Z),
            Plane::from_point_normal(max, -Vec3::Z),
        ])
    }
}

#[cfg(test)]
mod test {
    use glam::IVec3;

    use super::*;

    #[test]
    fn box_inside_is_kept() {
        let frustum = Frustum::from_box(Vec3::ZERO, Vec3::splat(32.0));
        let bbox = BBox::new(IVec3::ZERO, IVec3::splat(16));
        assert!(frustum.intersects_bbox(&bbox));
    }

    #[test]
    fn box_outside_is_rejected() {
        let frustum = Frustum::from_box(Vec3::ZERO, Vec3::splat(32.0));
        let bbox = BBox::new(IVec3::splat(64), IVec3::splat(80));
        assert!(!frustum.intersects_bbox(&bbox));
    }

    #[test]
    fn straddling_box_is_kept() {
        let frustum = Frustum::from_box(Vec3::ZERO, Vec3::splat(32.0));
        let bbox = BBox::new(IVec3::new(-16, 0, 0), IVec3::new(16, 16, 16));
        assert!(frustum.intersects_bbox(&bbox));
    }

    #[test]
    fn empty_box_is_rejected() {
        let frustum = Frustum::from_box(Vec3::ZERO, Vec3::splat(32.0));
        assert!(!frustum.intersects_bbox(&BBox::default()));
    }
}
