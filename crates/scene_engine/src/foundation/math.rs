//! Math utilities and types
//!
//! Provides the matrix and vector types carried by transform cores.

pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Column-major float array, the layout uniform uploads expect
pub fn mat4_to_array(matrix: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}

/// Normal matrix for a model or view matrix: inverse-transpose of the matrix
///
/// Falls back to identity for singular matrices so that degenerate scale
/// never poisons the lighting uniforms.
pub fn normal_matrix(matrix: &Mat4) -> Mat4 {
    matrix
        .try_inverse()
        .map_or_else(Mat4::identity, |inverse| inverse.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mat4_to_array_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let a = mat4_to_array(&m);
        assert_eq!(a[12], 1.0);
        assert_eq!(a[13], 2.0);
        assert_eq!(a[14], 3.0);
        assert_eq!(a[15], 1.0);
    }

    #[test]
    fn test_normal_matrix_of_uniform_scale() {
        let m = Mat4::new_scaling(2.0);
        let n = normal_matrix(&m);
        assert_relative_eq!(n[(0, 0)], 0.5, epsilon = 1e-6);
        assert_relative_eq!(n[(1, 1)], 0.5, epsilon = 1e-6);
        assert_relative_eq!(n[(3, 3)], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_of_singular_is_identity() {
        let n = normal_matrix(&Mat4::zeros());
        assert_eq!(n, Mat4::identity());
    }
}
