//! Model accumulation
//!
//! [`ModelAccumulator`] owns the policy for growing the [`Model`]: the first
//! usable frame seeds it, later frames are merged through their registration
//! result, and degenerate alignments are turned away. Every merge builds the
//! new cloud on the side and commits it in one step, so a reader of the model
//! never sees a half-applied frame.

use crate::config::AccumulatorConfig;
use scan3d_core::{GeometryFrame, Model};
use scan3d_point_cloud::down_sample_to_budget;
use scan3d_registration::RegistrationResult;
use std::fmt;

/// Lifecycle of the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Nothing merged yet
    Empty,
    /// The first frame defines the model frame
    Seeded,
    /// At least one registered frame has been merged
    Merging,
    /// No further frames are accepted
    Stopped,
}

/// Why a frame was not merged.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Degenerate {
        index: u64,
        fitness: f64,
        correspondences: usize,
    },
    EmptyFrame,
    /// `seed` called on a model that already has content
    AlreadySeeded,
    Stopped,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Degenerate {
                index,
                fitness,
                correspondences,
            } => write!(
                f,
                "frame {} alignment is degenerate (fitness {:.4}, {} correspondences)",
                index, fitness, correspondences
            ),
            RejectReason::EmptyFrame => write!(f, "frame has no points"),
            RejectReason::AlreadySeeded => write!(f, "model is already seeded"),
            RejectReason::Stopped => write!(f, "accumulator is stopped"),
        }
    }
}

/// Result of offering a frame to the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Seeded { points: usize },
    Merged { points_added: usize, model_points: usize },
    Rejected(RejectReason),
}

impl MergeOutcome {
    /// Whether the model changed.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, MergeOutcome::Rejected(_))
    }
}

#[derive(Debug, Clone)]
pub struct ModelAccumulator {
    config: AccumulatorConfig,
    state: AccumulatorState,
}

impl ModelAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            state: AccumulatorState::Empty,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    /// Start the model from `frame`, copying its points unchanged.
    ///
    /// Only valid while the accumulator is `Empty`.
    pub fn seed(&mut self, frame: &GeometryFrame, model: &mut Model) -> MergeOutcome {
        match self.state {
            AccumulatorState::Stopped => return MergeOutcome::Rejected(RejectReason::Stopped),
            AccumulatorState::Seeded | AccumulatorState::Merging => {
                tracing::warn!(frame = frame.index(), "seed ignored, model already has content");
                return MergeOutcome::Rejected(RejectReason::AlreadySeeded);
            }
            AccumulatorState::Empty => {}
        }

        if frame.is_empty() {
            tracing::warn!(frame = frame.index(), "empty frame cannot seed the model");
            return MergeOutcome::Rejected(RejectReason::EmptyFrame);
        }

        model.commit(frame.cloud().clone(), 1);
        self.state = AccumulatorState::Seeded;
        tracing::info!(frame = frame.index(), points = model.len(), "model seeded");
        MergeOutcome::Seeded {
            points: model.len(),
        }
    }

    /// Merge `frame` into `model` using `result.transform`.
    ///
    /// On an `Empty` accumulator the frame seeds the model instead.
    ///
    /// # Arguments
    ///
    /// * `frame` - Scan in its own coordinates
    /// * `result` - Registration of `frame` against `model`
    /// * `model` - Replaced in one commit when the frame is accepted
    ///
    /// # Returns
    ///
    /// `Merged` with the added and total point counts, or `Rejected` when the
    /// accumulator is stopped, the frame is empty or the alignment is degenerate.
    pub fn merge(
        &mut self,
        frame: &GeometryFrame,
        result: &RegistrationResult,
        model: &mut Model,
    ) -> MergeOutcome {
        match self.state {
            AccumulatorState::Stopped => return MergeOutcome::Rejected(RejectReason::Stopped),
            AccumulatorState::Empty => return self.seed(frame, model),
            AccumulatorState::Seeded | AccumulatorState::Merging => {}
        }

        if frame.is_empty() {
            tracing::warn!(frame = frame.index(), "empty frame rejected");
            return MergeOutcome::Rejected(RejectReason::EmptyFrame);
        }

        if let Some(degeneracy) = &result.degeneracy {
            tracing::warn!(
                frame = frame.index(),
                fitness = result.fitness,
                correspondences = result.correspondence_count,
                reason = %degeneracy,
                "degenerate alignment, frame rejected"
            );
            return MergeOutcome::Rejected(RejectReason::Degenerate {
                index: frame.index(),
                fitness: result.fitness,
                correspondences: result.correspondence_count,
            });
        }

        let moved = frame.cloud().transformed(&result.transform);
        let points_added = moved.len();

        let mut cloud = model.cloud().clone();
        cloud.append(&moved);

        if let Some(budget) = self.config.point_budget {
            if cloud.len() > budget {
                cloud = down_sample_to_budget(&cloud, budget, self.config.voxel_size).cloud;
            }
        }

        model.commit(cloud, model.frames_merged() + 1);
        self.state = AccumulatorState::Merging;

        tracing::info!(
            frame = frame.index(),
            fitness = result.fitness,
            rmse = result.inlier_rmse,
            points_added,
            model_points = model.len(),
            "frame merged"
        );
        MergeOutcome::Merged {
            points_added,
            model_points: model.len(),
        }
    }

    /// Refuse all further frames.
    pub fn stop(&mut self) {
        if self.state != AccumulatorState::Stopped {
            tracing::debug!(previous = ?self.state, "accumulator stopped");
        }
        self.state = AccumulatorState::Stopped;
    }
}
