//! Scan-to-model registration
//!
//! Implements iterative closest point (ICP) alignment of a [`GeometryFrame`]
//! against the accumulated [`Model`]:
//! - growing correspondence radius schedule
//! - point-to-point (Kabsch) or point-to-plane (Gauss-Newton) updates
//! - fitness / RMSE quality report with a degeneracy flag

pub mod correspondence;
pub mod rigid;

use correspondence::{find_correspondences, is_collinear, mean_distance, rmse, search_radius};
use scan3d_core::{Error, GeometryFrame, Model, PointCloud, Result, Transform};
use scan3d_point_cloud::{estimate_normals, NeighborIndex};
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;

/// Error metric minimised at each ICP iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationStrategy {
    #[default]
    PointToPoint,
    PointToPlane,
}

/// ICP parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Initial correspondence search radius
    pub radius_base: f64,
    /// Per-iteration radius multiplier (>= 1)
    pub radius_growth_factor: f64,
    /// Upper bound on the search radius
    pub max_radius: f64,
    pub max_iterations: usize,
    /// Stop once the mean correspondence distance changes less than this
    pub convergence_epsilon: f64,
    /// Results below this fitness are flagged degenerate
    pub min_fitness_threshold: f64,
    /// Results with fewer correspondences are flagged degenerate (never below 3)
    pub min_correspondences: usize,
    pub strategy: RegistrationStrategy,
    /// Neighbourhood size when model normals have to be estimated
    pub normal_neighbors: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            radius_base: 0.01,
            radius_growth_factor: 1.5,
            max_radius: 0.1,
            max_iterations: 50,
            convergence_epsilon: 1e-6,
            min_fitness_threshold: 0.3,
            min_correspondences: 10,
            strategy: RegistrationStrategy::PointToPoint,
            normal_neighbors: 15,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidInput(msg));
        if !(self.radius_base > 0.0 && self.radius_base.is_finite()) {
            return fail(format!("radius_base must be positive, got {}", self.radius_base));
        }
        if !(self.radius_growth_factor >= 1.0 && self.radius_growth_factor.is_finite()) {
            return fail(format!(
                "radius_growth_factor must be >= 1, got {}",
                self.radius_growth_factor
            ));
        }
        if !(self.max_radius >= self.radius_base) {
            return fail(format!(
                "max_radius ({}) must not be smaller than radius_base ({})",
                self.max_radius, self.radius_base
            ));
        }
        if self.max_iterations == 0 {
            return fail("max_iterations must be at least 1".to_string());
        }
        if !(self.convergence_epsilon >= 0.0) {
            return fail(format!(
                "convergence_epsilon must be non-negative, got {}",
                self.convergence_epsilon
            ));
        }
        if !(0.0..=1.0).contains(&self.min_fitness_threshold) {
            return fail(format!(
                "min_fitness_threshold must lie in [0, 1], got {}",
                self.min_fitness_threshold
            ));
        }
        if self.strategy == RegistrationStrategy::PointToPlane && self.normal_neighbors < 3 {
            return fail("normal_neighbors must be at least 3".to_string());
        }
        Ok(())
    }

    /// Correspondence count below which a result cannot be trusted.
    pub fn correspondence_floor(&self) -> usize {
        self.min_correspondences.max(3)
    }
}

/// Why a registration result cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Degeneracy {
    LowFitness { fitness: f64, minimum: f64 },
    TooFewCorrespondences { count: usize, minimum: usize },
    CollinearCorrespondences,
}

impl fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degeneracy::LowFitness { fitness, minimum } => {
                write!(f, "fitness {:.4} below minimum {:.4}", fitness, minimum)
            }
            Degeneracy::TooFewCorrespondences { count, minimum } => {
                write!(f, "{} correspondences, at least {} required", count, minimum)
            }
            Degeneracy::CollinearCorrespondences => {
                write!(f, "correspondences are collinear")
            }
        }
    }
}

/// Registration outcome: the aligning transform and its quality report.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Maps frame coordinates into model coordinates
    pub transform: Transform,
    /// Fraction of source points with a model point within `radius_base` (0-1)
    pub fitness: f64,
    /// RMS distance over the final correspondences
    pub inlier_rmse: f64,
    pub correspondence_count: usize,
    /// ICP iterations performed
    pub iterations: usize,
    /// Search radius of the last iteration
    pub final_radius: f64,
    /// Set when the alignment is not trustworthy
    pub degeneracy: Option<Degeneracy>,
}

impl RegistrationResult {
    pub fn is_degenerate(&self) -> bool {
        self.degeneracy.is_some()
    }
}

/// Aligns frames to the model with ICP. Stateless apart from its configuration.
#[derive(Debug, Clone, Default)]
pub struct Registrar {
    config: RegistrationConfig,
}

impl Registrar {
    pub fn new(config: RegistrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Register `frame` against `model`.
    ///
    /// # Arguments
    ///
    /// * `frame` - Incoming scan; its initial guess, if any, seeds the search
    /// * `model` - Accumulated cloud the frame is aligned to
    ///
    /// # Returns
    ///
    /// The frame-to-model transform with fitness and RMSE evaluated at
    /// `radius_base`, the iteration count and the last search radius.
    ///
    /// # Errors
    ///
    /// * `Error::EmptyModel` - nothing to register against; seed the model instead
    /// * `Error::EmptyFrame` - the frame has no points
    ///
    /// Poor alignments are not errors: they come back with
    /// [`RegistrationResult::degeneracy`] set.
    pub fn register(&self, frame: &GeometryFrame, model: &Model) -> Result<RegistrationResult> {
        if model.is_empty() {
            return Err(Error::EmptyModel);
        }
        if frame.is_empty() {
            return Err(Error::EmptyFrame(frame.index()));
        }

        let init = frame.initial_guess().copied().unwrap_or_default();
        let result = self.register_clouds(frame.cloud(), model.cloud(), &init);

        tracing::debug!(
            frame = frame.index(),
            fitness = result.fitness,
            rmse = result.inlier_rmse,
            correspondences = result.correspondence_count,
            iterations = result.iterations,
            degenerate = result.is_degenerate(),
            "registration finished"
        );
        Ok(result)
    }

    /// ICP between two clouds starting at `init`. Both clouds must be non-empty.
    pub fn register_clouds(
        &self,
        source: &PointCloud,
        target: &PointCloud,
        init: &Transform,
    ) -> RegistrationResult {
        let cfg = &self.config;
        let target_index = NeighborIndex::new(&target.points);

        let target: Cow<'_, PointCloud> = match cfg.strategy {
            RegistrationStrategy::PointToPlane if target.normals.is_none() => {
                let mut with_normals = target.clone();
                estimate_normals(&mut with_normals, cfg.normal_neighbors);
                Cow::Owned(with_normals)
            }
            _ => Cow::Borrowed(target),
        };

        let mut transformation = *init;
        let mut previous_mean: Option<f64> = None;
        let mut iterations = 0;
        let mut radius = cfg.radius_base;

        for k in 0..cfg.max_iterations {
            radius = search_radius(cfg.radius_base, cfg.radius_growth_factor, cfg.max_radius, k);
            let correspondences =
                find_correspondences(&source.points, &target_index, &transformation, radius);
            iterations = k + 1;

            if correspondences.len() < 3 {
                tracing::trace!(
                    iteration = k,
                    radius,
                    found = correspondences.len(),
                    "too few correspondences, widening"
                );
                // Nothing to solve with at this radius; a later, wider one may do better
                if radius >= cfg.max_radius {
                    break;
                }
                continue;
            }

            let mean = mean_distance(&correspondences);
            tracing::trace!(
                iteration = k,
                radius,
                correspondences = correspondences.len(),
                mean_distance = mean,
                "icp iteration"
            );

            if let Some(prev) = previous_mean {
                if (prev - mean).abs() < cfg.convergence_epsilon {
                    break;
                }
            }
            previous_mean = Some(mean);

            let moved: Vec<_> = source
                .points
                .iter()
                .map(|p| transformation.transform_point(p))
                .collect();

            let update = match cfg.strategy {
                RegistrationStrategy::PointToPoint => {
                    rigid::estimate_point_to_point(&moved, &target.points, &correspondences)
                }
                RegistrationStrategy::PointToPlane => match &target.normals {
                    Some(normals) => rigid::estimate_point_to_plane(
                        &moved,
                        &target.points,
                        normals,
                        &correspondences,
                    ),
                    None => None,
                },
            };

            match update {
                Some(update) => transformation = update.compose(&transformation).orthonormalized(),
                None => break,
            }
        }

        self.evaluate(source, &target_index, transformation, iterations, radius)
    }

    fn evaluate(
        &self,
        source: &PointCloud,
        target_index: &NeighborIndex,
        transform: Transform,
        iterations: usize,
        final_radius: f64,
    ) -> RegistrationResult {
        let cfg = &self.config;
        let correspondences =
            find_correspondences(&source.points, target_index, &transform, cfg.radius_base);

        let fitness = if source.is_empty() {
            0.0
        } else {
            correspondences.len() as f64 / source.len() as f64
        };
        let inlier_rmse = rmse(&correspondences);

        let floor = cfg.correspondence_floor();
        let degeneracy = if correspondences.len() < floor {
            Some(Degeneracy::TooFewCorrespondences {
                count: correspondences.len(),
                minimum: floor,
            })
        } else if fitness < cfg.min_fitness_threshold {
            Some(Degeneracy::LowFitness {
                fitness,
                minimum: cfg.min_fitness_threshold,
            })
        } else if is_collinear(&source.points, &correspondences) {
            Some(Degeneracy::CollinearCorrespondences)
        } else {
            None
        };

        RegistrationResult {
            transform,
            fitness,
            inlier_rmse,
            correspondence_count: correspondences.len(),
            iterations,
            final_radius,
            degeneracy,
        }
    }
}

/// Evaluate registration
///
/// Scores `transformation` without refining it: returns `(fitness, inlier_rmse)`
/// for correspondences within `max_correspondence_distance`.
pub fn evaluate_registration(
    source: &PointCloud,
    target: &PointCloud,
    transformation: &Transform,
    max_correspondence_distance: f64,
) -> (f64, f64) {
    if source.is_empty() || target.is_empty() {
        return (0.0, 0.0);
    }
    let index = NeighborIndex::new(&target.points);
    let correspondences = find_correspondences(
        &source.points,
        &index,
        transformation,
        max_correspondence_distance,
    );
    (
        correspondences.len() as f64 / source.len() as f64,
        rmse(&correspondences),
    )
}

mod mod_test;
