use crate::point_cloud::PointCloud;

/// The accumulated global point cloud.
///
/// Readers see either the state before a merge or the state after it. A merge
/// builds its new cloud separately and hands it over through [`Model::commit`].
#[derive(Debug, Clone, Default)]
pub struct Model {
    cloud: PointCloud,
    frames_merged: usize,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    pub fn frames_merged(&self) -> usize {
        self.frames_merged
    }

    /// Replace the whole state in one step.
    pub fn commit(&mut self, cloud: PointCloud, frames_merged: usize) {
        self.cloud = cloud;
        self.frames_merged = frames_merged;
    }

    pub fn into_cloud(self) -> PointCloud {
        self.cloud
    }
}
