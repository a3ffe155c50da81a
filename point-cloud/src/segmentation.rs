//! Scene segmentation
//!
//! - Range cropping to an axis-aligned box
//! - Dominant plane fitting with RANSAC and plane removal
//! - Euclidean clustering (region growing over a fixed radius)

use crate::search::NeighborIndex;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use rayon::prelude::*;
use scan3d_core::PointCloud;
use std::collections::VecDeque;

/// Plane `normal · p + offset = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub offset: f64,
}

impl Plane {
    /// Plane through three points, `None` when they are (nearly) collinear.
    pub fn through(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let n = (b - a).cross(&(c - a));
        let norm = n.norm();
        if !norm.is_finite() || norm < 1e-12 {
            return None;
        }
        let normal = n / norm;
        Some(Self {
            normal,
            offset: -normal.dot(&a.coords),
        })
    }

    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        (self.normal.dot(&p.coords) + self.offset).abs()
    }
}

/// Keep the points inside the box `[min, max]` (bounds inclusive).
pub fn crop_box(pc: &PointCloud, min: &Point3<f64>, max: &Point3<f64>) -> PointCloud {
    pc.select(|i| {
        let p = &pc.points[i];
        (0..3).all(|k| p[k] >= min[k] && p[k] <= max[k])
    })
}

/// Fit the dominant plane with RANSAC.
///
/// # Arguments
///
/// * `distance_threshold` - Maximum point-to-plane distance of an inlier
/// * `max_iterations` - Number of three-point hypotheses tried
/// * `rng` - Sampling source; pass a seeded generator for repeatable results
///
/// # Returns
///
/// The plane with the most inliers and the inlier indices, or `None` when the
/// cloud has fewer than 3 points or every sample was degenerate.
pub fn segment_plane<R: Rng + ?Sized>(
    pc: &PointCloud,
    distance_threshold: f64,
    max_iterations: usize,
    rng: &mut R,
) -> Option<(Plane, Vec<usize>)> {
    let n = pc.len();
    if n < 3 {
        return None;
    }

    let mut best: Option<(Plane, usize)> = None;
    for _ in 0..max_iterations {
        let sample = rand::seq::index::sample(rng, n, 3);
        let plane = match Plane::through(
            &pc.points[sample.index(0)],
            &pc.points[sample.index(1)],
            &pc.points[sample.index(2)],
        ) {
            Some(plane) => plane,
            None => continue,
        };

        let count = pc
            .points
            .par_iter()
            .filter(|p| plane.distance(p) <= distance_threshold)
            .count();
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((plane, count));
        }
    }

    let (plane, _) = best?;
    let inliers = (0..n)
        .filter(|&i| plane.distance(&pc.points[i]) <= distance_threshold)
        .collect();
    Some((plane, inliers))
}

/// Remove up to `max_planes` dominant planes one after another.
///
/// Returns the remaining cloud and the number of planes removed.
pub fn remove_planes<R: Rng + ?Sized>(
    pc: &PointCloud,
    distance_threshold: f64,
    max_iterations: usize,
    max_planes: usize,
    rng: &mut R,
) -> (PointCloud, usize) {
    let mut rest = pc.clone();
    let mut removed = 0;

    while removed < max_planes {
        let Some((plane, inliers)) = segment_plane(&rest, distance_threshold, max_iterations, rng)
        else {
            break;
        };

        let mut is_inlier = vec![false; rest.len()];
        for &i in &inliers {
            is_inlier[i] = true;
        }
        tracing::debug!(
            inliers = inliers.len(),
            remaining = rest.len() - inliers.len(),
            normal = ?plane.normal,
            "plane removed"
        );
        rest = rest.select(|i| !is_inlier[i]);
        removed += 1;
    }

    (rest, removed)
}

/// Split the cloud into clusters of points linked by gaps of at most
/// `tolerance`.
///
/// Clusters outside `[min_size, max_size]` are dropped. The rest are returned
/// largest first as lists of point indices.
pub fn euclidean_clusters(
    pc: &PointCloud,
    tolerance: f64,
    min_size: usize,
    max_size: usize,
) -> Vec<Vec<usize>> {
    let n = pc.len();
    let index = NeighborIndex::new(&pc.points);
    let mut visited = vec![false; n];
    let mut clusters = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let mut cluster = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for hit in index.within_radius(&pc.points[current], tolerance) {
                if !visited[hit.index] {
                    visited[hit.index] = true;
                    cluster.push(hit.index);
                    queue.push_back(hit.index);
                }
            }
        }

        if (min_size..=max_size).contains(&cluster.len()) {
            cluster.sort_unstable();
            clusters.push(cluster);
        }
    }

    // Stable, so equal-sized clusters keep discovery order
    clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    clusters
}

/// The largest Euclidean cluster as a cloud, empty if no cluster qualifies.
pub fn largest_cluster(
    pc: &PointCloud,
    tolerance: f64,
    min_size: usize,
    max_size: usize,
) -> PointCloud {
    match euclidean_clusters(pc, tolerance, min_size, max_size).first() {
        Some(cluster) => {
            let mut keep = vec![false; pc.len()];
            for &i in cluster {
                keep[i] = true;
            }
            pc.select(|i| keep[i])
        }
        None => PointCloud::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 30x30 table at z = 0 with a 6x6x6 block of points standing on it.
    fn table_with_object() -> PointCloud {
        let mut points = Vec::new();
        for i in 0..30 {
            for j in 0..30 {
                points.push(Point3::new(i as f64 * 0.01, j as f64 * 0.01, 0.0));
            }
        }
        for i in 0..6 {
            for j in 0..6 {
                for k in 1..=6 {
                    points.push(Point3::new(
                        0.1 + i as f64 * 0.01,
                        0.1 + j as f64 * 0.01,
                        0.02 + k as f64 * 0.01,
                    ));
                }
            }
        }
        PointCloud::new(points)
    }

    fn blob(center: Point3<f64>, side: usize) -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for i in 0..side {
            for j in 0..side {
                points.push(center + Vector3::new(i as f64 * 0.01, j as f64 * 0.01, 0.0));
            }
        }
        points
    }

    #[test]
    fn test_plane_through_points() {
        let plane = Plane::through(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
            &Point3::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        assert!((plane.distance(&Point3::new(5.0, -3.0, 3.0)) - 2.0).abs() < 1e-12);

        let collinear = Plane::through(
            &Point3::origin(),
            &Point3::new(1.0, 1.0, 1.0),
            &Point3::new(2.0, 2.0, 2.0),
        );
        assert!(collinear.is_none());
    }

    #[test]
    fn test_crop_box_inclusive() {
        let cloud = PointCloud::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.5, 0.0, 0.0),
        ])
        .with_colors(vec![Point3::new(1.0, 0.0, 0.0); 3])
        .unwrap();
        let cropped = crop_box(&cloud, &Point3::new(0.0, 0.0, 0.0), &Point3::new(1.0, 1.0, 1.0));
        assert_eq!(cropped.len(), 2);
        assert_eq!(cropped.colors.unwrap().len(), 2);
    }

    #[test]
    fn test_segment_plane_finds_table() {
        let cloud = table_with_object();
        let mut rng = StdRng::seed_from_u64(7);
        let (plane, inliers) = segment_plane(&cloud, 0.005, 100, &mut rng).unwrap();
        assert_eq!(inliers.len(), 900);
        assert!(plane.normal.z.abs() > 1.0 - 1e-9);
    }

    #[test]
    fn test_segment_plane_needs_three_points() {
        let cloud = PointCloud::new(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        assert!(segment_plane(&cloud, 0.01, 10, &mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn test_remove_planes_leaves_object() {
        let cloud = table_with_object();
        let mut rng = StdRng::seed_from_u64(3);
        let (rest, removed) = remove_planes(&cloud, 0.005, 100, 1, &mut rng);
        assert_eq!(removed, 1);
        assert_eq!(rest.len(), 216);
        assert!(rest.points.iter().all(|p| p.z > 0.02));
    }

    #[test]
    fn test_clusters_sorted_and_size_filtered() {
        let mut points = blob(Point3::new(0.0, 0.0, 0.0), 10);
        points.extend(blob(Point3::new(1.0, 0.0, 0.0), 5));
        points.extend(blob(Point3::new(2.0, 0.0, 0.0), 2));
        let cloud = PointCloud::new(points);

        let clusters = euclidean_clusters(&cloud, 0.015, 1, 1000);
        let sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![100, 25, 4]);

        let clusters = euclidean_clusters(&cloud, 0.015, 10, 50);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], (100..125).collect::<Vec<_>>());
    }

    #[test]
    fn test_largest_cluster() {
        let mut points = blob(Point3::new(0.0, 0.0, 0.0), 4);
        points.extend(blob(Point3::new(1.0, 0.0, 0.0), 8));
        let cloud = PointCloud::new(points);

        let largest = largest_cluster(&cloud, 0.015, 1, 1000);
        assert_eq!(largest.len(), 64);
        assert!(largest.points.iter().all(|p| p.x >= 1.0));

        assert!(largest_cluster(&cloud, 0.015, 100, 1000).is_empty());
    }
}
