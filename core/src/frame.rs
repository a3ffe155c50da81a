use crate::point_cloud::PointCloud;
use crate::transform::Transform;
use nalgebra::Matrix4;

/// One captured partial scan.
///
/// Frames are immutable once built: the cloud, the arrival index and the
/// optional initial pose guess are only readable.
#[derive(Debug, Clone)]
pub struct GeometryFrame {
    index: u64,
    cloud: PointCloud,
    initial_guess: Option<Transform>,
}

impl GeometryFrame {
    pub fn new(index: u64, cloud: PointCloud) -> Self {
        Self {
            index,
            cloud,
            initial_guess: None,
        }
    }

    pub fn with_initial_guess(mut self, guess: Transform) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    /// Attach a raw pose guess, validating it as SE(3).
    ///
    /// A matrix that is not a proper rigid transform is discarded with a
    /// warning and the frame keeps no guess (registration starts from identity).
    pub fn with_raw_initial_guess(mut self, matrix: Matrix4<f64>) -> Self {
        match Transform::from_matrix(matrix) {
            Ok(guess) => self.initial_guess = Some(guess),
            Err(e) => {
                tracing::warn!(
                    frame = self.index,
                    error = %e,
                    "ignoring malformed initial guess, falling back to identity"
                );
                self.initial_guess = None;
            }
        }
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn initial_guess(&self) -> Option<&Transform> {
        self.initial_guess.as_ref()
    }

    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    /// Give up the frame and keep its cloud.
    pub fn into_cloud(self) -> PointCloud {
        self.cloud
    }
}
