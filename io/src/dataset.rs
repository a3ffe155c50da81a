//! Recorded scan directories
//!
//! A scan directory holds one pose file plus numbered scans:
//!
//! ```text
//! camera_pose.txt
//! src_01.pcd
//! src_02.pcd
//! ...
//! ```
//!
//! The n-th pose record belongs to `src_NN.pcd`. Poses describe the robot end
//! effector; the depth sensor sits at a fixed offset from it, so the sensor
//! pose of a frame is `pose · sensor_offset`. The model lives in the first
//! frame's coordinates, so initial guesses are sensor poses relative to the
//! first frame's: `first⁻¹ · current`.

use crate::pose::PoseReader;
use crate::read_point_cloud;
use nalgebra::Vector3;
use scan3d_core::{Error, GeometryFrame, Result, Transform};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const POSE_FILE_NAME: &str = "camera_pose.txt";

/// File name of the scan with 1-based `index`.
pub fn scan_file_name(index: u64) -> String {
    format!("src_{:02}.pcd", index)
}

/// End effector to depth sensor offset of the recording rig.
pub fn default_sensor_offset() -> Transform {
    Transform::from_translation(Vector3::new(0.0, -0.025, 0.1))
}

/// Sequential reader over a scan directory.
pub struct ScanDirectory {
    dir: PathBuf,
    poses: Option<PoseReader<BufReader<File>>>,
    sensor_offset: Transform,
    frame_limit: Option<u64>,
    next_index: u64,
    /// Sensor pose of the first frame
    reference: Option<Transform>,
}

impl ScanDirectory {
    /// Open `dir`. A missing pose file is not an error: frames then carry no
    /// initial guess.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(Error::InvalidInput(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let pose_path = dir.join(POSE_FILE_NAME);
        let poses = match File::open(&pose_path) {
            Ok(file) => Some(PoseReader::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %pose_path.display(), "no pose file, frames start from identity");
                None
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir,
            poses,
            sensor_offset: default_sensor_offset(),
            frame_limit: None,
            next_index: 1,
            reference: None,
        })
    }

    /// Stop after `limit` frames even if more scans exist.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn with_sensor_offset(mut self, offset: Transform) -> Self {
        self.sensor_offset = offset;
        self
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Read the next scan and its pose guess.
    ///
    /// `Ok(None)` once the frame limit is reached or the next numbered scan
    /// does not exist. A broken pose record costs the frame its initial guess,
    /// not the frame itself.
    pub fn next_frame(&mut self) -> Result<Option<GeometryFrame>> {
        let index = self.next_index;
        if self.frame_limit.is_some_and(|limit| index > limit) {
            return Ok(None);
        }

        let path = self.dir.join(scan_file_name(index));
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no more scans");
            return Ok(None);
        }

        let cloud = read_point_cloud(&path)?;
        self.next_index += 1;
        tracing::debug!(frame = index, points = cloud.len(), path = %path.display(), "loaded scan");

        let frame = GeometryFrame::new(index, cloud);
        Ok(Some(match self.sensor_pose(index) {
            Some(pose) => {
                let reference = *self.reference.get_or_insert(pose);
                frame.with_initial_guess(reference.inverse().compose(&pose))
            }
            None => frame,
        }))
    }

    fn sensor_pose(&mut self, index: u64) -> Option<Transform> {
        let poses = self.poses.as_mut()?;
        let record = match poses.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(frame = index, "pose file exhausted, no initial guess");
                return None;
            }
            Err(e) => {
                tracing::warn!(frame = index, error = %e, "unreadable pose record, no initial guess");
                return None;
            }
        };

        match Transform::from_matrix(record.matrix * self.sensor_offset.matrix()) {
            // Without the first frame's pose later poses cannot be related to the model
            Ok(_) if index > 1 && self.reference.is_none() => None,
            Ok(pose) => Some(pose),
            Err(e) => {
                tracing::warn!(frame = index, error = %e, "malformed pose, no initial guess");
                None
            }
        }
    }
}

impl Iterator for ScanDirectory {
    type Item = Result<GeometryFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
