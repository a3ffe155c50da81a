//! Correspondence search between a moving source and a fixed target.

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use scan3d_core::Transform;
use scan3d_point_cloud::NeighborIndex;

/// A matched pair: source index, target index, distance after transforming the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub source: usize,
    pub target: usize,
    pub distance: f64,
}

/// Correspondence search radius for iteration `k`:
/// `radius_base × growth_factor^k`, capped at `max_radius`.
pub fn search_radius(radius_base: f64, growth_factor: f64, max_radius: f64, k: usize) -> f64 {
    let exponent = i32::try_from(k).unwrap_or(i32::MAX);
    (radius_base * growth_factor.powi(exponent)).min(max_radius.max(radius_base))
}

/// Nearest target point within `radius` for every transformed source point.
///
/// Runs in parallel over source points; the output is in source order.
pub fn find_correspondences(
    source: &[Point3<f64>],
    target: &NeighborIndex,
    transform: &Transform,
    radius: f64,
) -> Vec<Correspondence> {
    source
        .par_iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let moved = transform.transform_point(p);
            target
                .nearest_within(&moved, radius)
                .map(|hit| Correspondence {
                    source: i,
                    target: hit.index,
                    distance: hit.distance(),
                })
        })
        .collect()
}

pub fn mean_distance(correspondences: &[Correspondence]) -> f64 {
    if correspondences.is_empty() {
        return 0.0;
    }
    correspondences.iter().map(|c| c.distance).sum::<f64>() / correspondences.len() as f64
}

pub fn rmse(correspondences: &[Correspondence]) -> f64 {
    if correspondences.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = correspondences.iter().map(|c| c.distance * c.distance).sum();
    (sum_sq / correspondences.len() as f64).sqrt()
}

/// Whether the matched source points fail to span a plane.
///
/// Collinear (or coincident) points leave the rotation about their common
/// line undetermined.
pub fn is_collinear(points: &[Point3<f64>], correspondences: &[Correspondence]) -> bool {
    if correspondences.len() < 3 {
        return true;
    }

    let n = correspondences.len() as f64;
    let centroid = correspondences
        .iter()
        .fold(Vector3::zeros(), |acc, c| acc + points[c.source].coords)
        / n;

    let mut cov = Matrix3::zeros();
    for c in correspondences {
        let d = points[c.source].coords - centroid;
        cov += d * d.transpose();
    }
    cov /= n;

    let mut eigenvalues: Vec<f64> = SymmetricEigen::new(cov).eigenvalues.iter().copied().collect();
    eigenvalues.sort_by(|a, b| b.total_cmp(a));

    let largest = eigenvalues[0];
    largest <= f64::EPSILON || eigenvalues[1] <= 1e-10 * largest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_schedule_grows_and_caps() {
        assert_eq!(search_radius(0.01, 2.0, 0.05, 0), 0.01);
        assert_eq!(search_radius(0.01, 2.0, 0.05, 1), 0.02);
        assert_eq!(search_radius(0.01, 2.0, 0.05, 2), 0.04);
        assert_eq!(search_radius(0.01, 2.0, 0.05, 3), 0.05);
        assert_eq!(search_radius(0.01, 2.0, 0.05, 40), 0.05);
        // growth of 1 keeps the base radius
        assert_eq!(search_radius(0.01, 1.0, 0.05, 7), 0.01);
    }

    #[test]
    fn test_collinear_detection() {
        let line: Vec<Point3<f64>> = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let all: Vec<Correspondence> = (0..5)
            .map(|i| Correspondence {
                source: i,
                target: i,
                distance: 0.0,
            })
            .collect();
        assert!(is_collinear(&line, &all));

        let mut tri = line.clone();
        tri[4] = Point3::new(0.0, 1.0, 0.0);
        assert!(!is_collinear(&tri, &all));
    }

    #[test]
    fn test_only_pairs_within_radius() {
        let target = NeighborIndex::new(&[Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let source = [Point3::new(0.05, 0.0, 0.0), Point3::new(0.5, 0.0, 0.0)];
        let found = find_correspondences(&source, &target, &Transform::identity(), 0.1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, 0);
        assert_eq!(found[0].target, 0);
    }
}
