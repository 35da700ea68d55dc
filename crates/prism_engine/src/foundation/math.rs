//! Math utilities and types
//!
//! Thin aliases over nalgebra plus the handful of helpers the renderer needs.

pub use nalgebra::{Matrix2, Matrix3, Matrix4, Rotation3, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 2x2 matrix type
pub type Mat2 = Matrix2<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// 2 * Pi
    pub const TAU: f32 = 2.0 * PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Mat4, Rotation3, Unit, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Rotate `point` about `axis` (through the origin) by `angle` radians
    pub fn rotate_about_axis(point: Vec3, axis: Vec3, angle: f32) -> Vec3 {
        Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle) * point
    }

    /// Column-major array layout expected by GLSL `mat4`
    pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
        (*matrix).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotate_about_negative_y_is_clockwise_from_above() {
        let rotated = utils::rotate_about_axis(
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            constants::PI / 2.0,
        );
        assert_relative_eq!(rotated, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_to_columns_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let columns = utils::to_columns(&m);
        assert_eq!(columns[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(columns[0], [1.0, 0.0, 0.0, 0.0]);
    }
}
