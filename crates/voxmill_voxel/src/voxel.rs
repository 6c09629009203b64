//! The voxel cell and its face-visibility mask.

use glam::{IVec3, Vec3};

/// Six face bits recording which sides of a voxel are currently considered
/// visible. The convention is right-handed, y-up, z-forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Visibility(pub u8);

impl Visibility {
    pub const INVISIBLE: Self = Self(0);
    /// +y
    pub const UP: Self = Self(1);
    /// -y
    pub const DOWN: Self = Self(2);
    /// -x
    pub const LEFT: Self = Self(4);
    /// +x
    pub const RIGHT: Self = Self(8);
    /// +z
    pub const FORWARD: Self = Self(16);
    /// -z
    pub const BACKWARD: Self = Self(32);
    pub const VISIBLE: Self = Self(63);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn clear(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// One of the six cube face directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Backward,
}

impl Direction {
    /// Returns the possible values of this enum as an array.
    #[inline]
    pub const fn values() -> [Self; 6] {
        [
            Self::Up,
            Self::Down,
            Self::Left,
            Self::Right,
            Self::Forward,
            Self::Backward,
        ]
    }

    /// The visibility bit belonging to this face.
    #[inline]
    pub const fn visibility(self) -> Visibility {
        match self {
            Self::Up => Visibility::UP,
            Self::Down => Visibility::DOWN,
            Self::Left => Visibility::LEFT,
            Self::Right => Visibility::RIGHT,
            Self::Forward => Visibility::FORWARD,
            Self::Backward => Visibility::BACKWARD,
        }
    }

    /// The unit offset towards the neighbor behind this face.
    #[inline]
    pub fn offset(self) -> IVec3 {
        match self {
            Self::Up => IVec3::new(0, 1, 0),
            Self::Down => IVec3::new(0, -1, 0),
            Self::Left => IVec3::new(-1, 0, 0),
            Self::Right => IVec3::new(1, 0, 0),
            Self::Forward => IVec3::new(0, 0, 1),
            Self::Backward => IVec3::new(0, 0, -1),
        }
    }

    /// The outward face normal.
    #[inline]
    pub fn normal(self) -> Vec3 {
        self.offset().as_vec3()
    }

    /// The face with the same axis and opposite sign.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// The positive and negative face on the given axis (0 = x, 1 = y, 2 = z).
    #[inline]
    pub const fn axis_faces(axis: usize) -> (Self, Self) {
        match axis {
            0 => (Self::Right, Self::Left),
            1 => (Self::Up, Self::Down),
            _ => (Self::Forward, Self::Backward),
        }
    }
}

const STATE_EMPTY: u8 = 0;
const STATE_SOLID: u8 = 1;
const STATE_TRANSPARENT: u8 = 2;

/// A single voxel cell: material index, color index, cell state and the face
/// visibility mask. Exactly 4 bytes; uninstantiated cells are all zeros and
/// read as empty space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct Voxel {
    pub material: u8,
    pub color: u8,
    state: u8,
    pub visibility: Visibility,
}

impl Voxel {
    pub const EMPTY: Self = Self {
        material: 0,
        color: 0,
        state: STATE_EMPTY,
        visibility: Visibility::INVISIBLE,
    };

    /// A new cell, fully visible until the analyzer says otherwise.
    pub fn new(material: u8, color: u8, transparent: bool) -> Self {
        Self {
            material,
            color,
            state: if transparent {
                STATE_TRANSPARENT
            } else {
                STATE_SOLID
            },
            visibility: Visibility::VISIBLE,
        }
    }

    /// Whether this cell holds a voxel at all. The state byte doubles as the
    /// instantiation mark, so even a fully enclosed voxel (mask 0, material 0,
    /// color 0) stays instantiated.
    #[inline]
    pub fn is_instantiated(&self) -> bool {
        self.state != STATE_EMPTY
    }

    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.state == STATE_TRANSPARENT
    }

    /// True if at least one face is visible.
    #[inline]
    pub fn is_visible(&self) -> bool {
        !self.visibility.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn voxel_is_four_bytes() {
        assert_eq!(std::mem::size_of::<Voxel>(), 4);
    }

    #[test]
    fn new_voxel_is_fully_visible() {
        let voxel = Voxel::new(1, 2, false);
        assert!(voxel.is_instantiated());
        assert!(voxel.is_visible());
        assert_eq!(voxel.visibility, Visibility::VISIBLE);
    }

    #[test]
    fn enclosed_voxel_stays_instantiated() {
        let mut voxel = Voxel::new(0, 0, false);
        voxel.visibility = Visibility::INVISIBLE;
        assert!(voxel.is_instantiated());
        assert!(!voxel.is_visible());
    }

    #[test]
    fn empty_cell_reads_as_empty_space() {
        assert!(!Voxel::EMPTY.is_instantiated());
        assert_eq!(Voxel::default(), Voxel::EMPTY);
    }

    #[test]
    fn visibility_bits_match_convention() {
        assert_eq!(Visibility::UP.0, 1);
        assert_eq!(Visibility::DOWN.0, 2);
        assert_eq!(Visibility::LEFT.0, 4);
        assert_eq!(Visibility::RIGHT.0, 8);
        assert_eq!(Visibility::FORWARD.0, 16);
        assert_eq!(Visibility::BACKWARD.0, 32);
    }

    #[test]
    fn clear_and_set_bits() {
        let mut mask = Visibility::VISIBLE;
        mask.clear(Visibility::UP);
        assert!(!mask.contains(Visibility::UP));
        assert!(mask.contains(Visibility::DOWN));
        mask.set(Visibility::UP);
        assert_eq!(mask, Visibility::VISIBLE);
    }
}
