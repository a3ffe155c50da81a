//! Configuration loading for scan fusion
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! [registration]
//! radius_base = 0.01
//! radius_growth_factor = 1.5
//! max_radius = 0.1
//! max_iterations = 50
//! strategy = "point-to-plane"
//!
//! [accumulator]
//! point_budget = 200000
//! voxel_size = 0.005
//!
//! [preprocess]
//! voxel_size = 0.003
//! outlier_removal = true
//! plane_removal = true
//! clustering = true
//!
//! [preprocess.range]
//! min = [-0.3, -0.3, 0.2]
//! max = [0.3, 0.3, 1.0]
//! ```

use crate::error::{Error, Result};
use scan3d_registration::RegistrationConfig;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub registration: RegistrationConfig,
    pub accumulator: AccumulatorConfig,
    pub preprocess: PreprocessConfig,
}

/// Model growth limits
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AccumulatorConfig {
    /// Maximum model size; exceeding it triggers voxel down-sampling (default: none)
    #[serde(default)]
    pub point_budget: Option<usize>,

    /// Starting voxel edge for budget down-sampling in meters (default: 0.005)
    #[serde(default = "default_budget_voxel_size")]
    pub voxel_size: f64,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            point_budget: None,
            voxel_size: default_budget_voxel_size(),
        }
    }
}

/// Per-frame filtering applied before registration
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PreprocessConfig {
    /// Voxel grid edge in meters; `None` keeps every point (default: none)
    #[serde(default)]
    pub voxel_size: Option<f64>,

    /// Run statistical outlier removal (default: false)
    #[serde(default)]
    pub outlier_removal: bool,

    /// Neighbours considered per point by outlier removal (default: 50)
    #[serde(default = "default_outlier_mean_k")]
    pub outlier_mean_k: usize,

    /// Standard deviation multiplier of the outlier threshold (default: 1.0)
    #[serde(default = "default_outlier_std_ratio")]
    pub outlier_std_ratio: f64,

    /// Crop box in frame coordinates (default: none)
    #[serde(default)]
    pub range: Option<RangeBox>,

    /// Remove dominant planes such as the table top (default: false)
    #[serde(default)]
    pub plane_removal: bool,

    /// Inlier distance of a plane in meters (default: 0.01)
    #[serde(default = "default_plane_distance_threshold")]
    pub plane_distance_threshold: f64,

    /// RANSAC hypotheses per plane (default: 100)
    #[serde(default = "default_plane_max_iterations")]
    pub plane_max_iterations: usize,

    /// Planes removed per frame (default: 1)
    #[serde(default = "default_num_planes")]
    pub num_planes: usize,

    /// Keep only the largest Euclidean cluster (default: false)
    #[serde(default)]
    pub clustering: bool,

    /// Largest gap inside a cluster in meters (default: 0.02)
    #[serde(default = "default_cluster_tolerance")]
    pub cluster_tolerance: f64,

    /// Smallest accepted cluster (default: 100)
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Largest accepted cluster (default: 10000)
    #[serde(default = "default_max_cluster_size")]
    pub max_cluster_size: usize,
}

/// Axis-aligned box, bounds inclusive
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct RangeBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            voxel_size: None,
            outlier_removal: false,
            outlier_mean_k: default_outlier_mean_k(),
            outlier_std_ratio: default_outlier_std_ratio(),
            range: None,
            plane_removal: false,
            plane_distance_threshold: default_plane_distance_threshold(),
            plane_max_iterations: default_plane_max_iterations(),
            num_planes: default_num_planes(),
            clustering: false,
            cluster_tolerance: default_cluster_tolerance(),
            min_cluster_size: default_min_cluster_size(),
            max_cluster_size: default_max_cluster_size(),
        }
    }
}

impl PreprocessConfig {
    pub fn is_active(&self) -> bool {
        self.voxel_size.is_some()
            || self.outlier_removal
            || self.range.is_some()
            || self.plane_removal
            || self.clustering
    }
}

fn default_budget_voxel_size() -> f64 {
    0.005
}
fn default_outlier_mean_k() -> usize {
    50
}
fn default_outlier_std_ratio() -> f64 {
    1.0
}
fn default_plane_distance_threshold() -> f64 {
    0.01
}
fn default_plane_max_iterations() -> usize {
    100
}
fn default_num_planes() -> usize {
    1
}
fn default_cluster_tolerance() -> f64 {
    0.02
}
fn default_min_cluster_size() -> usize {
    100
}
fn default_max_cluster_size() -> usize {
    10000
}

impl FusionConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FusionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.registration
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        if self.accumulator.point_budget == Some(0) {
            return Err(Error::Config("point_budget must be at least 1".to_string()));
        }
        if !(self.accumulator.voxel_size > 0.0 && self.accumulator.voxel_size.is_finite()) {
            return Err(Error::Config(format!(
                "accumulator voxel_size must be positive, got {}",
                self.accumulator.voxel_size
            )));
        }

        if let Some(v) = self.preprocess.voxel_size {
            if !(v > 0.0 && v.is_finite()) {
                return Err(Error::Config(format!(
                    "preprocess voxel_size must be positive, got {}",
                    v
                )));
            }
        }
        if self.preprocess.outlier_removal {
            if self.preprocess.outlier_mean_k == 0 {
                return Err(Error::Config("outlier_mean_k must be at least 1".to_string()));
            }
            if !(self.preprocess.outlier_std_ratio >= 0.0) {
                return Err(Error::Config(format!(
                    "outlier_std_ratio must be non-negative, got {}",
                    self.preprocess.outlier_std_ratio
                )));
            }
        }
        if let Some(range) = &self.preprocess.range {
            let ordered = range.min.iter().zip(&range.max).all(|(lo, hi)| lo <= hi);
            if !ordered {
                return Err(Error::Config(format!(
                    "range min {:?} exceeds max {:?}",
                    range.min, range.max
                )));
            }
        }
        if self.preprocess.plane_removal {
            let threshold = self.preprocess.plane_distance_threshold;
            if !(threshold > 0.0 && threshold.is_finite()) {
                return Err(Error::Config(format!(
                    "plane_distance_threshold must be positive, got {}",
                    threshold
                )));
            }
            if self.preprocess.plane_max_iterations == 0 {
                return Err(Error::Config("plane_max_iterations must be at least 1".to_string()));
            }
        }
        if self.preprocess.clustering {
            let tolerance = self.preprocess.cluster_tolerance;
            if !(tolerance > 0.0 && tolerance.is_finite()) {
                return Err(Error::Config(format!(
                    "cluster_tolerance must be positive, got {}",
                    tolerance
                )));
            }
            if self.preprocess.min_cluster_size > self.preprocess.max_cluster_size {
                return Err(Error::Config(format!(
                    "min_cluster_size {} exceeds max_cluster_size {}",
                    self.preprocess.min_cluster_size, self.preprocess.max_cluster_size
                )));
            }
        }
        Ok(())
    }
}
