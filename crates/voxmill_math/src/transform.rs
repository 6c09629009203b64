//! Transform composition and decomposition.
//!
//! Scene nodes carry their transform as separate translation, Euler rotation
//! and scale; matrices only exist transiently while composing a scene walk or
//! converting a file's packed rotation.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Composes a model matrix from scale, XYZ Euler rotation (radians) and
/// translation.
pub fn compose_srt(translation: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        scale,
        Quat::from_euler(EulerRot::XYZ, rotation.x, rotation.y, rotation.z),
        translation,
    )
}

/// Extracts XYZ Euler angles (radians) from a rotation matrix.
pub fn euler_from_mat4(matrix: &Mat4) -> Vec3 {
    let (x, y, z) = Quat::from_mat4(matrix).to_euler(EulerRot::XYZ);
    Vec3::new(x, y, z)
}

/// Extracts the per-axis scale of a matrix.
pub fn scale_from_mat4(matrix: &Mat4) -> Vec3 {
    Vec3::new(
        matrix.x_axis.truncate().length(),
        matrix.y_axis.truncate().length(),
        matrix.z_axis.truncate().length(),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn srt_roundtrip() {
        let rotation = Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0);
        let matrix = compose_srt(Vec3::new(1.0, 2.0, 3.0), rotation, Vec3::ONE);

        assert_close(euler_from_mat4(&matrix), rotation);
        assert_close(scale_from_mat4(&matrix), Vec3::ONE);
    }

    #[test]
    fn scale_extraction() {
        let matrix = compose_srt(Vec3::ZERO, Vec3::ZERO, Vec3::new(2.0, 3.0, 4.0));
        assert_close(scale_from_mat4(&matrix), Vec3::new(2.0, 3.0, 4.0));
    }
}
