//! File-backed adapters for the pipeline traits.

use crate::pipeline::{FrameSource, ModelSink};
use scan3d_core::{GeometryFrame, Model, Result};
use scan3d_io::{write_point_cloud, ScanDirectory};
use std::path::{Path, PathBuf};

/// Writes the model to a `.pcd` or `.ply` file.
#[derive(Debug, Clone)]
pub struct PointCloudFile {
    path: PathBuf,
}

impl PointCloudFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelSink for PointCloudFile {
    fn persist(&mut self, model: &Model) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        write_point_cloud(&self.path, model.cloud())
    }
}

impl FrameSource for ScanDirectory {
    fn next_frame(&mut self) -> Result<Option<GeometryFrame>> {
        ScanDirectory::next_frame(self)
    }
}
