//! Integer axis-aligned bounding boxes.

use glam::IVec3;

/// A half-open axis-aligned box `[beg, end)` over integer voxel positions.
///
/// The default value is *inverted* (`beg` at `i32::MAX`, `end` at `i32::MIN`)
/// so that expanding it with the first point produces a tight box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
    pub beg: IVec3,
    pub end: IVec3,
}

impl Default for BBox {
    fn default() -> Self {
        Self {
            beg: IVec3::splat(i32::MAX),
            end: IVec3::splat(i32::MIN),
        }
    }
}

impl BBox {
    pub const fn new(beg: IVec3, end: IVec3) -> Self {
        Self { beg, end }
    }

    /// The box covering a single cell at `pos`.
    pub fn from_cell(pos: IVec3) -> Self {
        Self::new(pos, pos + IVec3::ONE)
    }

    /// True if no point has ever been added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.beg.x >= self.end.x || self.beg.y >= self.end.y || self.beg.z >= self.end.z
    }

    #[inline]
    pub fn size(&self) -> IVec3 {
        if self.is_empty() {
            IVec3::ZERO
        } else {
            self.end - self.beg
        }
    }

    #[inline]
    pub fn contains(&self, point: IVec3) -> bool {
        point.x >= self.beg.x
            && point.y >= self.beg.y
            && point.z >= self.beg.z
            && point.x < self.end.x
            && point.y < self.end.y
            && point.z < self.end.z
    }

    /// Grows the box to cover the cell at `point`.
    #[inline]
    pub fn expand(&mut self, point: IVec3) {
        self.beg = self.beg.min(point);
        self.end = self.end.max(point + IVec3::ONE);
    }

    /// Grows the box to cover `other`.
    #[inline]
    pub fn merge(&mut self, other: &BBox) {
        if other.is_empty() {
            return;
        }
        self.beg = self.beg.min(other.beg);
        self.end = self.end.max(other.end);
    }

    /// The same box translated by `offset`.
    #[inline]
    pub fn translated(&self, offset: IVec3) -> Self {
        if self.is_empty() {
            *self
        } else {
            Self::new(self.beg + offset, self.end + offset)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert!(BBox::default().is_empty());
        assert_eq!(BBox::default().size(), IVec3::ZERO);
    }

    #[test]
    fn expand_is_tight() {
        let mut bbox = BBox::default();
        bbox.expand(IVec3::new(1, 2, 3));
        assert_eq!(bbox.beg, IVec3::new(1, 2, 3));
        assert_eq!(bbox.end, IVec3::new(2, 3, 4));

        bbox.expand(IVec3::new(-1, 5, 3));
        assert_eq!(bbox.beg, IVec3::new(-1, 2, 3));
        assert_eq!(bbox.end, IVec3::new(2, 6, 4));
        assert_eq!(bbox.size(), IVec3::new(3, 4, 1));
    }

    #[test]
    fn contains_is_half_open() {
        let bbox = BBox::new(IVec3::ZERO, IVec3::splat(16));
        assert!(bbox.contains(IVec3::ZERO));
        assert!(bbox.contains(IVec3::splat(15)));
        assert!(!bbox.contains(IVec3::splat(16)));
        assert!(!bbox.contains(IVec3::new(-1, 0, 0)));
    }

    #[test]
    fn merge_ignores_empty() {
        let mut bbox = BBox::from_cell(IVec3::ZERO);
        bbox.merge(&BBox::default());
        assert_eq!(bbox, BBox::from_cell(IVec3::ZERO));
    }
}
