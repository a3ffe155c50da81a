//! Per-frame clean-up before registration
//!
//! Stages run in order, each only when configured: voxel grid, statistical
//! outlier removal, range crop, plane removal, largest-cluster extraction.

use crate::config::PreprocessConfig;
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scan3d_core::GeometryFrame;
use scan3d_point_cloud::{
    crop_box, largest_cluster, remove_planes, remove_statistical_outliers, voxel_down_sample,
};

/// Filter the frame's cloud, keeping its index and initial guess.
pub fn preprocess_frame(frame: GeometryFrame, config: &PreprocessConfig) -> GeometryFrame {
    if !config.is_active() || frame.is_empty() {
        return frame;
    }

    let index = frame.index();
    let guess = frame.initial_guess().copied();
    let input = frame.len();
    let mut cloud = frame.into_cloud();

    if let Some(voxel_size) = config.voxel_size {
        cloud = voxel_down_sample(&cloud, voxel_size);
    }
    if config.outlier_removal {
        cloud = remove_statistical_outliers(&cloud, config.outlier_mean_k, config.outlier_std_ratio).0;
    }
    if let Some(range) = &config.range {
        cloud = crop_box(&cloud, &Point3::from(range.min), &Point3::from(range.max));
    }
    if config.plane_removal {
        // Seeded per frame so a replay segments identically
        let mut rng = StdRng::seed_from_u64(index);
        let (rest, planes) = remove_planes(
            &cloud,
            config.plane_distance_threshold,
            config.plane_max_iterations,
            config.num_planes,
            &mut rng,
        );
        tracing::debug!(frame = index, planes, remaining = rest.len(), "planes removed");
        cloud = rest;
    }
    if config.clustering {
        cloud = largest_cluster(
            &cloud,
            config.cluster_tolerance,
            config.min_cluster_size,
            config.max_cluster_size,
        );
        if cloud.is_empty() {
            tracing::warn!(frame = index, "no cluster within the size limits");
        }
    }

    tracing::debug!(frame = index, input, output = cloud.len(), "frame preprocessed");

    let filtered = GeometryFrame::new(index, cloud);
    match guess {
        Some(guess) => filtered.with_initial_guess(guess),
        None => filtered,
    }
}
