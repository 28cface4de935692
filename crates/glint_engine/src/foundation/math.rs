//! Math utilities and types
//!
//! nalgebra aliases plus the camera matrix helpers the renderer uploads to
//! uniform blocks. All matrices are column-major, which is the memory order
//! GLSL `mat4` expects.

pub use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Near clip plane used by scene cameras
pub const NEAR_PLANE: f32 = 0.1;

/// Right-handed view matrix for an eye at `position` looking along `direction`
pub fn look_at(position: &Vec3, direction: &Vec3, up: &Vec3) -> Mat4 {
    let eye = Point3::from(*position);
    let target = Point3::from(position + direction);
    Mat4::look_at_rh(&eye, &target, up)
}

/// OpenGL-style perspective projection
///
/// `fov_y` is in radians. A zero height target falls back to an aspect of 1.
pub fn perspective(fov_y: f32, width: u32, height: u32, far: f32) -> Mat4 {
    let aspect = if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    };
    nalgebra::Perspective3::new(aspect, fov_y, NEAR_PLANE, far).to_homogeneous()
}

/// Column-major copy of a matrix, ready for upload
pub fn to_column_major(matrix: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_look_at_maps_eye_to_origin() {
        let eye = Vec3::new(0.0, 2.0, 5.0);
        let view = look_at(&eye, &Vec3::new(0.0, 0.0, -1.0), &Vec3::y());
        let moved = view.transform_point(&Point3::from(eye));
        assert_relative_eq!(moved.coords, Vec3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_handles_zero_height() {
        let square = perspective(1.0, 10, 10, 100.0);
        let degenerate = perspective(1.0, 10, 0, 100.0);
        assert_relative_eq!(square, degenerate);
    }

    #[test]
    fn test_column_major_layout() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 7.0; // translation x lives in the last column
        let data = to_column_major(&m);
        assert_relative_eq!(data[12], 7.0);
    }
}
