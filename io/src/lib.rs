//! 3D File I/O Module
//!
//! - PLY (Polygon File Format, ASCII)
//! - PCD (Point Cloud Data - PCL format)
//! - pose record files
//! - recorded scan directories (`camera_pose.txt` + `src_NN.pcd`)

pub mod dataset;
pub mod pcd;
pub mod ply;
pub mod pose;

pub use dataset::{default_sensor_offset, scan_file_name, ScanDirectory, POSE_FILE_NAME};
pub use pcd::{read_pcd, write_pcd, PcdData};
pub use ply::{read_ply, write_ply};
pub use pose::{PoseReader, PoseRecord};

pub use scan3d_core::{Error, Result};

use scan3d_core::PointCloud;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudFormat {
    Pcd,
    Ply,
}

impl CloudFormat {
    /// Format implied by the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pcd") => Ok(CloudFormat::Pcd),
            Some("ply") => Ok(CloudFormat::Ply),
            _ => Err(Error::UnsupportedFormat(format!(
                "cannot tell point cloud format of {}",
                path.display()
            ))),
        }
    }
}

/// Read a PCD or PLY file, picking the format from the extension.
pub fn read_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud> {
    let path = path.as_ref();
    let format = CloudFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);
    match format {
        CloudFormat::Pcd => read_pcd(reader),
        CloudFormat::Ply => read_ply(reader),
    }
}

/// Write a PCD or PLY file, picking the format from the extension.
pub fn write_point_cloud(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<()> {
    let path = path.as_ref();
    let format = CloudFormat::from_path(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        CloudFormat::Pcd => write_pcd(&mut writer, cloud)?,
        CloudFormat::Ply => write_ply(&mut writer, cloud)?,
    }
    writer.flush()?;
    Ok(())
}
