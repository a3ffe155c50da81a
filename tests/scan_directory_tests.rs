use nalgebra::{Matrix4, Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scan3d::core::{PointCloud, Transform};
use scan3d::fusion::{FusionConfig, Pipeline, PointCloudFile};
use scan3d::io::{default_sensor_offset, read_point_cloud, scan_file_name, write_point_cloud, ScanDirectory, POSE_FILE_NAME};
use scan3d::point_cloud::NeighborIndex;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::AtomicBool;

fn cube_surface(n: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let points = (0..n)
        .map(|i| {
            let a: f64 = rng.gen_range(-0.5..0.5);
            let b: f64 = rng.gen_range(-0.5..0.5);
            let s = if i % 2 == 0 { 0.5 } else { -0.5 };
            match (i / 2) % 3 {
                0 => Point3::new(s, a, b),
                1 => Point3::new(a, s, b),
                _ => Point3::new(a, b, s),
            }
        })
        .collect();
    PointCloud::new(points)
}

fn write_poses(dir: &Path, poses: &[Matrix4<f64>]) {
    let mut text = String::new();
    for (i, pose) in poses.iter().enumerate() {
        writeln!(text).unwrap();
        writeln!(text, "{}", i + 1).unwrap();
        for r in 0..4 {
            let row: Vec<String> = (0..4).map(|c| format!("{:.17e}", pose[(r, c)])).collect();
            writeln!(text, "{}", row.join(" ")).unwrap();
        }
    }
    std::fs::write(dir.join(POSE_FILE_NAME), text).unwrap();
}

#[test]
fn test_scan_directory_fused_to_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cube = cube_surface(600, 5);

    // Second scan seen after a 60 degree turn, too far for ICP alone
    let motion = Transform::from_axis_angle(&Vector3::z(), 60f64.to_radians(), Vector3::new(0.1, 0.0, 0.0));
    write_point_cloud(tmp.path().join(scan_file_name(1)), &cube).unwrap();
    write_point_cloud(tmp.path().join(scan_file_name(2)), &cube.transformed(&motion)).unwrap();

    // Robot poses whose relative sensor motion undoes the turn
    let offset = default_sensor_offset();
    let second = offset.compose(&motion.inverse()).compose(&offset.inverse());
    write_poses(tmp.path(), &[Matrix4::identity(), *second.matrix()]);

    let mut config = FusionConfig::default();
    config.registration.radius_base = 0.05;
    config.registration.max_radius = 0.3;

    let mut pipeline = Pipeline::new(config).unwrap();
    let mut source = ScanDirectory::open(tmp.path()).unwrap();
    let summary = pipeline.run(&mut source, &mut (), &AtomicBool::new(false)).unwrap();
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.merged, 2);
    assert_eq!(summary.rejected, 0);
    assert!(summary.ingestion_error.is_none());

    let output = tmp.path().join("out").join("model.pcd");
    let (model, persisted) = pipeline.shutdown(&mut PointCloudFile::new(&output));
    persisted.unwrap();
    assert_eq!(model.frames_merged(), 2);

    let saved = read_point_cloud(&output).unwrap();
    assert_eq!(saved.len(), 1200);

    let index = NeighborIndex::new(&cube.points);
    for point in &saved.points[600..] {
        let nearest = index.nearest(point).unwrap();
        assert!(nearest.distance_squared < 1e-8, "merged point {} off the cube", point);
    }
}

#[test]
fn test_frame_limit_stops_early() {
    let tmp = tempfile::tempdir().unwrap();
    let cube = cube_surface(300, 9);
    for i in 1..=3 {
        write_point_cloud(tmp.path().join(scan_file_name(i)), &cube).unwrap();
    }

    let mut pipeline = Pipeline::new(FusionConfig::default()).unwrap();
    let mut source = ScanDirectory::open(tmp.path()).unwrap().with_frame_limit(2);
    let summary = pipeline.run(&mut source, &mut (), &AtomicBool::new(false)).unwrap();
    assert_eq!(summary.frames, 2);
    assert_eq!(pipeline.model().frames_merged(), 2);
    assert_eq!(pipeline.model().len(), 600);
}

#[test]
fn test_empty_directory_has_no_initial_frame() {
    let tmp = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(FusionConfig::default()).unwrap();
    let mut source = ScanDirectory::open(tmp.path()).unwrap();
    let err = pipeline.run(&mut source, &mut (), &AtomicBool::new(false)).unwrap_err();
    assert!(matches!(err, scan3d::fusion::Error::NoInitialFrame(_)));
}
