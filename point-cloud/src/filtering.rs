//! Point cloud filtering operations
//!
//! - Voxel down-sampling (centroid per occupied voxel)
//! - Budget down-sampling (coarsen the voxel grid until a point cap holds)
//! - Statistical outlier removal

use crate::search::NeighborIndex;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use scan3d_core::PointCloud;
use std::cmp::Ordering;

type VoxelKey = (i64, i64, i64);

/// Downsample a point cloud with a voxel grid anchored at `origin`.
///
/// Returns one point per occupied voxel: the centroid of its points (colors
/// averaged, normals averaged and re-normalized). The result depends only on
/// the set of input points, not on their order.
pub fn voxel_down_sample_from(
    pc: &PointCloud,
    voxel_size: f64,
    origin: &Point3<f64>,
) -> PointCloud {
    if voxel_size <= 0.0 || pc.is_empty() {
        return pc.clone();
    }

    let voxel_of = |p: &Point3<f64>| -> VoxelKey {
        (
            ((p.x - origin.x) / voxel_size).floor() as i64,
            ((p.y - origin.y) / voxel_size).floor() as i64,
            ((p.z - origin.z) / voxel_size).floor() as i64,
        )
    };

    // 1. Compute keys
    let mut indices: Vec<(VoxelKey, usize)> = pc
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| (voxel_of(p), i))
        .collect();

    // 2. Sort by voxel, then by the point's own values so that summation order
    //    inside a voxel is independent of input order
    let compare = |a: &(VoxelKey, usize), b: &(VoxelKey, usize)| {
        a.0.cmp(&b.0).then_with(|| compare_points(pc, a.1, b.1))
    };
    if indices.len() > 10_000 {
        indices.par_sort_unstable_by(compare);
    } else {
        indices.sort_unstable_by(compare);
    }

    // 3. Aggregate
    let mut new_points = Vec::new();
    let mut new_colors = pc.colors.as_ref().map(|_| Vec::new());
    let mut new_normals = pc.normals.as_ref().map(|_| Vec::new());

    for run in indices.chunk_by(|a, b| a.0 == b.0) {
        let factor = 1.0 / run.len() as f64;

        let sum_p = run
            .iter()
            .fold(Vector3::zeros(), |acc, &(_, i)| acc + pc.points[i].coords);
        new_points.push(Point3::from(sum_p * factor));

        if let (Some(nc), Some(colors)) = (&mut new_colors, &pc.colors) {
            let sum_c = run
                .iter()
                .fold(Vector3::zeros(), |acc, &(_, i)| acc + colors[i].coords);
            nc.push(Point3::from(sum_c * factor));
        }
        if let (Some(nn), Some(normals)) = (&mut new_normals, &pc.normals) {
            let mut n = run
                .iter()
                .fold(Vector3::zeros(), |acc, &(_, i)| acc + normals[i])
                * factor;
            if n.norm_squared() > 1e-12 {
                n.normalize_mut();
            }
            nn.push(n);
        }
    }

    PointCloud {
        points: new_points,
        colors: new_colors,
        normals: new_normals,
    }
}

/// Voxel down-sampling on a grid anchored at the world origin.
pub fn voxel_down_sample(pc: &PointCloud, voxel_size: f64) -> PointCloud {
    voxel_down_sample_from(pc, voxel_size, &Point3::origin())
}

/// Outcome of [`down_sample_to_budget`].
#[derive(Debug, Clone)]
pub struct BudgetDownSample {
    pub cloud: PointCloud,
    /// Voxel edge length that satisfied the budget; `None` if no reduction was needed.
    pub voxel_size: Option<f64>,
}

/// Reduce `pc` to at most `budget` points.
///
/// The grid is anchored at the cloud's minimum corner and starts at
/// `initial_voxel_size`, doubling until the budget holds. Once a voxel covers
/// the whole bounding box a single point remains, so this terminates for any
/// `budget >= 1`.
///
/// # Arguments
///
/// * `pc` - Cloud to reduce
/// * `budget` - Maximum number of output points (0 is treated as 1)
/// * `initial_voxel_size` - First voxel edge tried, in meters
///
/// # Returns
///
/// The reduced cloud and the voxel size that met the budget, or the input
/// unchanged with `voxel_size: None` if it already fits.
pub fn down_sample_to_budget(
    pc: &PointCloud,
    budget: usize,
    initial_voxel_size: f64,
) -> BudgetDownSample {
    let budget = budget.max(1);
    let Some((min, max)) = pc.bounds() else {
        return BudgetDownSample {
            cloud: pc.clone(),
            voxel_size: None,
        };
    };
    if pc.len() <= budget {
        return BudgetDownSample {
            cloud: pc.clone(),
            voxel_size: None,
        };
    }

    let extent = (max - min).amax();
    let mut voxel_size = if initial_voxel_size > 0.0 {
        initial_voxel_size
    } else {
        (extent / budget as f64).max(f64::EPSILON)
    };

    loop {
        let cloud = voxel_down_sample_from(pc, voxel_size, &min);
        if cloud.len() <= budget || voxel_size > extent {
            tracing::debug!(
                input = pc.len(),
                output = cloud.len(),
                voxel_size,
                "voxel down-sampled to budget"
            );
            return BudgetDownSample {
                cloud,
                voxel_size: Some(voxel_size),
            };
        }
        voxel_size *= 2.0;
    }
}

/// Remove points whose mean distance to their `k` nearest neighbours is more
/// than `std_ratio` standard deviations above the cloud-wide mean.
///
/// Returns the filtered cloud and the indices of the kept points.
pub fn remove_statistical_outliers(
    pc: &PointCloud,
    k: usize,
    std_ratio: f64,
) -> (PointCloud, Vec<usize>) {
    if pc.len() < 2 || k == 0 {
        return (pc.clone(), (0..pc.len()).collect());
    }

    let index = NeighborIndex::new(&pc.points);

    let distances: Vec<f64> = pc
        .points
        .par_iter()
        .map(|p| {
            // k + 1 hits: the first one is the point itself
            let neighbors = index.k_nearest(p, k + 1);
            let rest = &neighbors[1.min(neighbors.len())..];
            if rest.is_empty() {
                0.0
            } else {
                rest.iter().map(|n| n.distance()).sum::<f64>() / rest.len() as f64
            }
        })
        .collect();

    let n = distances.len() as f64;
    let mean_dist = distances.iter().sum::<f64>() / n;
    let variance = distances
        .iter()
        .map(|d| {
            let diff = d - mean_dist;
            diff * diff
        })
        .sum::<f64>()
        / n;
    let threshold = mean_dist + std_ratio * variance.sqrt();

    let keep: Vec<bool> = distances.iter().map(|&d| d <= threshold).collect();
    let inliers: Vec<usize> = (0..keep.len()).filter(|&i| keep[i]).collect();
    (pc.select(|i| keep[i]), inliers)
}

fn compare_points(pc: &PointCloud, a: usize, b: usize) -> Ordering {
    let pa = &pc.points[a];
    let pb = &pc.points[b];
    let mut ord = pa
        .x
        .total_cmp(&pb.x)
        .then_with(|| pa.y.total_cmp(&pb.y))
        .then_with(|| pa.z.total_cmp(&pb.z));
    if let Some(colors) = &pc.colors {
        let (ca, cb) = (&colors[a], &colors[b]);
        ord = ord
            .then_with(|| ca.x.total_cmp(&cb.x))
            .then_with(|| ca.y.total_cmp(&cb.y))
            .then_with(|| ca.z.total_cmp(&cb.z));
    }
    if let Some(normals) = &pc.normals {
        let (na, nb) = (&normals[a], &normals[b]);
        ord = ord
            .then_with(|| na.x.total_cmp(&nb.x))
            .then_with(|| na.y.total_cmp(&nb.y))
            .then_with(|| na.z.total_cmp(&nb.z));
    }
    ord
}
