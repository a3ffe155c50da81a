//! Rigid-body transforms in SE(3).
//!
//! A [`Transform`] wraps a 4×4 homogeneous matrix whose top-left 3×3 block is a
//! proper rotation (orthonormal, determinant +1) and whose last row is
//! `[0, 0, 0, 1]`. Raw matrices are validated when they enter the system
//! (pose files, initial guesses); transforms produced by the solvers are built
//! from rotations directly.

use crate::{Error, Result};
use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Unit, Vector3};
use std::fmt;

/// Tolerance used when checking orthonormality, determinant and the last row.
pub const SE3_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: Matrix4<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Validate a raw homogeneous matrix.
    pub fn from_matrix(matrix: Matrix4<f64>) -> Result<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(Error::MalformedTransform(
                "matrix contains non-finite values".to_string(),
            ));
        }

        let last_row = matrix.fixed_view::<1, 4>(3, 0);
        let expected = [0.0, 0.0, 0.0, 1.0];
        if last_row
            .iter()
            .zip(expected.iter())
            .any(|(a, b)| (a - b).abs() > SE3_TOLERANCE)
        {
            return Err(Error::MalformedTransform(format!(
                "last row must be [0 0 0 1], got [{} {} {} {}]",
                last_row[0], last_row[1], last_row[2], last_row[3]
            )));
        }

        let rotation: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let orthogonality_error = (rotation.transpose() * rotation - Matrix3::identity()).amax();
        if orthogonality_error > SE3_TOLERANCE {
            return Err(Error::MalformedTransform(format!(
                "rotation block is not orthonormal (max |RᵀR - I| = {:e})",
                orthogonality_error
            )));
        }

        let det = rotation.determinant();
        if (det - 1.0).abs() > SE3_TOLERANCE {
            return Err(Error::MalformedTransform(format!(
                "rotation determinant is {} instead of +1",
                det
            )));
        }

        let mut matrix = matrix;
        matrix
            .fixed_view_mut::<1, 4>(3, 0)
            .copy_from_slice(&expected);
        Ok(Self { matrix })
    }

    /// Row-major 16 values, as stored in pose records.
    pub fn from_row_slice(values: &[f64]) -> Result<Self> {
        if values.len() != 16 {
            return Err(Error::MalformedTransform(format!(
                "expected 16 values, got {}",
                values.len()
            )));
        }
        Self::from_matrix(Matrix4::from_row_slice(values))
    }

    pub fn from_parts(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Self {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(rotation.matrix());
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Self { matrix }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::from_parts(&Rotation3::identity(), &translation)
    }

    /// Rotation of `angle` radians about `axis`, followed by `translation`.
    pub fn from_axis_angle(axis: &Vector3<f64>, angle: f64, translation: Vector3<f64>) -> Self {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle);
        Self::from_parts(&rotation, &translation)
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// `self · other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            matrix: self.matrix * other.matrix,
        }
    }

    pub fn inverse(&self) -> Transform {
        let r_inv = self.rotation().transpose();
        let t_inv = -r_inv * self.translation();
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_inv);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&t_inv);
        Transform { matrix }
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(point)
    }

    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.matrix.transform_vector(vector)
    }

    /// Rotation angle in radians, in `[0, π]`.
    pub fn rotation_angle(&self) -> f64 {
        let cos = ((self.rotation().trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
        cos.acos()
    }

    pub fn translation_norm(&self) -> f64 {
        self.translation().norm()
    }

    /// Re-project the rotation block onto SO(3).
    ///
    /// Long chains of composed solver updates drift slightly off the manifold.
    pub fn orthonormalized(&self) -> Transform {
        let rotation = Rotation3::from_matrix_eps(&self.rotation(), 1e-12, 64, Rotation3::identity());
        Transform::from_parts(&rotation, &self.translation())
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..4 {
            let row = self.matrix.row(r);
            writeln!(f, "{} {} {} {}", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let t = Transform::from_axis_angle(
            &Vector3::new(0.3, -1.0, 0.5),
            0.7,
            Vector3::new(1.0, 2.0, -3.0),
        );
        let id = t.compose(&t.inverse());
        assert_relative_eq!(*id.matrix(), Matrix4::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_scaled_rotation() {
        let mut m = Matrix4::identity();
        m[(0, 0)] = 2.0;
        assert!(matches!(
            Transform::from_matrix(m),
            Err(Error::MalformedTransform(_))
        ));
    }

    #[test]
    fn test_rejects_reflection() {
        let mut m = Matrix4::identity();
        m[(2, 2)] = -1.0;
        let err = Transform::from_matrix(m).unwrap_err();
        assert!(err.to_string().contains("determinant"));
    }

    #[test]
    fn test_rejects_projective_last_row() {
        let mut m = Matrix4::identity();
        m[(3, 0)] = 0.5;
        assert!(Transform::from_matrix(m).is_err());
    }

    #[test]
    fn test_rotation_angle() {
        let t = Transform::from_axis_angle(&Vector3::z(), 10f64.to_radians(), Vector3::zeros());
        assert_relative_eq!(t.rotation_angle().to_degrees(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_row_slice_round_trip() {
        let t = Transform::from_axis_angle(&Vector3::x(), 0.2, Vector3::new(0.1, 0.2, 0.3));
        let values: Vec<f64> = (0..4)
            .flat_map(|r| (0..4).map(move |c| (r, c)))
            .map(|(r, c)| t.matrix()[(r, c)])
            .collect();
        let parsed = Transform::from_row_slice(&values).unwrap();
        assert_relative_eq!(*parsed.matrix(), *t.matrix(), epsilon = 1e-15);
    }
}
