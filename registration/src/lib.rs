//! Point cloud registration
//!
//! Aligns incoming partial scans to the accumulated model:
//! - ICP with a growing correspondence radius
//! - point-to-point and point-to-plane error metrics
//! - fitness / inlier RMSE evaluation and degeneracy detection

pub mod registration;

pub use registration::correspondence::{find_correspondences, search_radius, Correspondence};
pub use registration::rigid::{
    estimate_point_to_plane, estimate_point_to_point, exponential_map_se3,
};
pub use registration::{
    evaluate_registration, Degeneracy, Registrar, RegistrationConfig, RegistrationResult,
    RegistrationStrategy,
};
