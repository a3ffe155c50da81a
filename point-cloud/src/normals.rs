//! Surface normal estimation from local neighbourhoods.

use crate::search::NeighborIndex;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use scan3d_core::PointCloud;

/// Estimate normals for the point cloud using K-nearest neighbors.
/// Uses PCA on the covariance matrix of the neighborhood.
/// Modifies the point cloud in place to add normals.
///
/// Normals are oriented towards `+z` when the sign is otherwise arbitrary;
/// neighbourhoods with fewer than 3 points get `+z`.
pub fn estimate_normals(pc: &mut PointCloud, k: usize) {
    if pc.is_empty() {
        return;
    }

    let index = NeighborIndex::new(&pc.points);
    let points = &pc.points;

    let normals: Vec<Vector3<f64>> = points
        .par_iter()
        .map(|p| {
            let neighbors = index.k_nearest(p, k.max(3));
            if neighbors.len() < 3 {
                return Vector3::z();
            }

            let mut centroid = Vector3::zeros();
            for n in &neighbors {
                centroid += points[n.index].coords;
            }
            centroid /= neighbors.len() as f64;

            let mut cov = Matrix3::zeros();
            for n in &neighbors {
                let d = points[n.index].coords - centroid;
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f64;

            let eigen = SymmetricEigen::new(cov);
            let normal: Vector3<f64> = eigen.eigenvectors.column(eigen.eigenvalues.imin()).into_owned();
            if normal.z < 0.0 {
                -normal
            } else {
                normal
            }
        })
        .collect();

    pc.normals = Some(normals);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_plane_normals_point_up() {
        let mut points = Vec::new();
        for x in 0..10 {
            for y in 0..10 {
                points.push(Point3::new(x as f64 * 0.1, y as f64 * 0.1, 0.5));
            }
        }
        let mut cloud = PointCloud::new(points);
        estimate_normals(&mut cloud, 8);
        let normals = cloud.normals.unwrap();
        assert_eq!(normals.len(), 100);
        for n in normals {
            assert_relative_eq!(n, Vector3::z(), epsilon = 1e-6);
        }
    }
}
