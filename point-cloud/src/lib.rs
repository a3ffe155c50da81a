//! Point cloud operations used by registration and fusion.
//!
//! - `search`: R*-tree nearest-neighbour index
//! - `filtering`: voxel down-sampling, point-budget down-sampling, statistical outlier removal
//! - `normals`: PCA normal estimation
//! - `segmentation`: range crop, RANSAC plane removal, Euclidean clustering

pub mod filtering;
pub mod normals;
pub mod search;
pub mod segmentation;

pub use filtering::{
    down_sample_to_budget, remove_statistical_outliers, voxel_down_sample,
    voxel_down_sample_from, BudgetDownSample,
};
pub use normals::estimate_normals;
pub use search::{Neighbor, NeighborIndex};
pub use segmentation::{
    crop_box, euclidean_clusters, largest_cluster, remove_planes, segment_plane, Plane,
};
