//! Closed-form and linearised rigid-motion solvers.

use super::correspondence::Correspondence;
use nalgebra::{Matrix3, Matrix6, Point3, Rotation3, Vector3, Vector6};
use scan3d_core::Transform;

/// Least-squares rigid transform mapping `source[c.source]` onto `target[c.target]`
/// (point-to-point, Kabsch/Umeyama without scale).
///
/// Returns `None` with fewer than 3 correspondences or when the SVD fails.
pub fn estimate_point_to_point(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    correspondences: &[Correspondence],
) -> Option<Transform> {
    if correspondences.len() < 3 {
        return None;
    }

    // Compute centroids
    let mut source_centroid = Vector3::zeros();
    let mut target_centroid = Vector3::zeros();
    for c in correspondences {
        source_centroid += source[c.source].coords;
        target_centroid += target[c.target].coords;
    }
    let n = correspondences.len() as f64;
    source_centroid /= n;
    target_centroid /= n;

    // Cross-covariance
    let mut covariance = Matrix3::<f64>::zeros();
    for c in correspondences {
        let src = source[c.source].coords - source_centroid;
        let tgt = target[c.target].coords - target_centroid;
        covariance += tgt * src.transpose();
    }

    // SVD to find rotation
    let svd = covariance.svd(true, true);
    let u = svd.u?;
    let vt = svd.v_t?;

    let mut rotation = u * vt;

    // Ensure proper rotation (det = 1)
    if rotation.determinant() < 0.0 {
        let mut u_corrected = u;
        u_corrected.set_column(2, &(u.column(2) * -1.0));
        rotation = u_corrected * vt;
    }

    let rotation = Rotation3::from_matrix_unchecked(rotation);
    let translation = target_centroid - rotation * source_centroid;
    Some(Transform::from_parts(&rotation, &translation))
}

/// One Gauss-Newton step of point-to-plane alignment.
///
/// `source` must already be expressed in the target frame (i.e. transformed by
/// the current estimate); the returned increment is applied on the left.
/// Returns `None` when the normal equations are singular beyond repair or
/// there are fewer than 3 correspondences.
pub fn estimate_point_to_plane(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    target_normals: &[Vector3<f64>],
    correspondences: &[Correspondence],
) -> Option<Transform> {
    if correspondences.len() < 3 {
        return None;
    }

    let mut ata = Matrix6::<f64>::zeros();
    let mut atb = Vector6::<f64>::zeros();

    for c in correspondences {
        let p = source[c.source];
        let q = target[c.target];
        let n = target_normals[c.target];

        let residual = (p - q).dot(&n);
        let cross = p.coords.cross(&n);
        let jacobian = Vector6::new(n.x, n.y, n.z, cross.x, cross.y, cross.z);

        ata += jacobian * jacobian.transpose();
        atb += jacobian * residual;
    }

    let rhs = -atb;
    let delta = match ata.cholesky() {
        Some(chol) => chol.solve(&rhs),
        // Rank-deficient geometry (e.g. a single plane): minimum-norm update
        None => ata.svd(true, true).solve(&rhs, 1e-12).ok()?,
    };

    if delta.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(exponential_map_se3(&delta))
}

/// Exponential map from se(3) `(v, ω)` to SE(3).
pub fn exponential_map_se3(delta: &Vector6<f64>) -> Transform {
    let v = Vector3::new(delta[0], delta[1], delta[2]);
    let omega = Vector3::new(delta[3], delta[4], delta[5]);

    let theta = omega.norm();
    if theta < 1e-12 {
        return Transform::from_translation(v);
    }

    let rotation = Rotation3::from_scaled_axis(omega);

    // Left Jacobian of SO(3)
    let k = omega / theta;
    let k_cross = k.cross_matrix();
    let left_jacobian = Matrix3::identity()
        + k_cross * ((1.0 - theta.cos()) / theta)
        + k_cross * k_cross * ((theta - theta.sin()) / theta);

    Transform::from_parts(&rotation, &(left_jacobian * v))
}
