#[cfg(test)]
mod tests {
    use crate::registration::{
        evaluate_registration, Degeneracy, Registrar, RegistrationConfig, RegistrationStrategy,
    };
    use nalgebra::{Point3, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use scan3d_core::{Error, GeometryFrame, Model, PointCloud, Transform};

    fn model_from(cloud: PointCloud) -> Model {
        let mut model = Model::new();
        model.commit(cloud, 1);
        model
    }

    fn volume_cloud(n: usize, seed: u64) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        let points = (0..n)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-0.5..0.5),
                    rng.gen_range(-0.4..0.4),
                    rng.gen_range(-0.3..0.3),
                )
            })
            .collect();
        PointCloud::new(points)
    }

    /// Points on the surface of the cube [-0.5, 0.5]^3.
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

    fn wide_config() -> RegistrationConfig {
        RegistrationConfig {
            radius_base: 0.05,
            radius_growth_factor: 1.5,
            max_radius: 0.3,
            max_iterations: 100,
            convergence_epsilon: 1e-10,
            ..RegistrationConfig::default()
        }
    }

    fn assert_inverse(recovered: &Transform, applied: &Transform, tol: f64) {
        let residual = recovered.compose(applied);
        assert!(
            residual.rotation_angle() < tol,
            "rotation error {} rad",
            residual.rotation_angle()
        );
        assert!(
            residual.translation_norm() < tol,
            "translation error {}",
            residual.translation_norm()
        );
    }

    #[test]
    fn test_recovers_known_rigid_motions() {
        let registrar = Registrar::new(wide_config());
        let cloud = volume_cloud(400, 7);
        let model = model_from(cloud.clone());

        let mut rng = StdRng::seed_from_u64(99);
        for trial in 0..5 {
            let axis = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.1..1.0),
            );
            let angle = rng.gen_range(1.0f64..6.0).to_radians();
            let translation = Vector3::new(
                rng.gen_range(-0.03..0.03),
                rng.gen_range(-0.03..0.03),
                rng.gen_range(-0.03..0.03),
            );
            let applied = Transform::from_axis_angle(&axis, angle, translation);

            let frame = GeometryFrame::new(trial, cloud.transformed(&applied));
            let result = registrar.register(&frame, &model).unwrap();

            assert!(!result.is_degenerate(), "trial {}: {:?}", trial, result.degeneracy);
            assert_inverse(&result.transform, &applied, 1e-6);
            assert!(result.fitness > 0.99);
        }
    }

    #[test]
    fn test_cube_rotated_ten_degrees() {
        let registrar = Registrar::new(wide_config());
        let cube = cube_surface(500, 11);
        let model = model_from(cube.clone());

        let applied = Transform::from_axis_angle(
            &Vector3::z(),
            10f64.to_radians(),
            Vector3::new(0.05, 0.0, 0.0),
        );
        let frame = GeometryFrame::new(2, cube.transformed(&applied));
        let result = registrar.register(&frame, &model).unwrap();

        assert!(!result.is_degenerate());
        assert!((result.transform.rotation_angle().to_degrees() - 10.0).abs() < 0.5);
        assert!((result.transform.translation_norm() - 0.05).abs() < 0.005);
        assert_inverse(&result.transform, &applied, 1e-4);
        assert!((result.fitness - 1.0).abs() < 1e-9);
        assert_eq!(result.correspondence_count, 500);
    }

    #[test]
    fn test_already_aligned_frame_stays_put() {
        let registrar = Registrar::new(RegistrationConfig::default());
        let cloud = volume_cloud(200, 3);
        let model = model_from(cloud.clone());
        let frame = GeometryFrame::new(1, cloud);

        let result = registrar.register(&frame, &model).unwrap();
        assert!(result.transform.rotation_angle() < 1e-9);
        assert!(result.transform.translation_norm() < 1e-9);
        assert!((result.fitness - 1.0).abs() < 1e-12);
        assert!(result.inlier_rmse < 1e-12);
    }

    #[test]
    fn test_far_away_frame_is_always_degenerate() {
        let cloud = volume_cloud(150, 5);
        let model = model_from(cloud.clone());
        let far = cloud.transformed(&Transform::from_translation(Vector3::new(10.0, 10.0, 10.0)));
        let frame = GeometryFrame::new(9, far);

        for max_iterations in [1, 10, 100] {
            let registrar = Registrar::new(RegistrationConfig {
                max_iterations,
                ..wide_config()
            });
            let result = registrar.register(&frame, &model).unwrap();
            assert!(result.is_degenerate());
            assert_eq!(result.fitness, 0.0);
            assert_eq!(result.correspondence_count, 0);
            assert!(matches!(
                result.degeneracy,
                Some(Degeneracy::TooFewCorrespondences { count: 0, .. })
            ));
        }
    }

    #[test]
    fn test_collinear_correspondences_are_degenerate() {
        let line = PointCloud::new((0..20).map(|i| Point3::new(i as f64 * 0.01, 0.0, 0.0)).collect());
        let model = model_from(line.clone());
        let registrar = Registrar::new(RegistrationConfig {
            min_correspondences: 3,
            ..RegistrationConfig::default()
        });
        let result = registrar
            .register(&GeometryFrame::new(1, line), &model)
            .unwrap();
        assert_eq!(result.degeneracy, Some(Degeneracy::CollinearCorrespondences));
    }

    #[test]
    fn test_low_fitness_is_degenerate() {
        // Only a sliver of the frame overlaps the model
        let model_cloud = volume_cloud(300, 21);
        let mut frame_cloud = model_cloud.clone();
        frame_cloud
            .points
            .extend(volume_cloud(900, 22).points.iter().map(|p| p + Vector3::new(5.0, 0.0, 0.0)));

        let registrar = Registrar::new(RegistrationConfig {
            min_fitness_threshold: 0.5,
            ..RegistrationConfig::default()
        });
        let result = registrar
            .register(&GeometryFrame::new(1, frame_cloud), &model_from(model_cloud))
            .unwrap();
        match result.degeneracy {
            Some(Degeneracy::LowFitness { fitness, minimum }) => {
                assert!((fitness - 0.25).abs() < 1e-9);
                assert_eq!(minimum, 0.5);
            }
            other => panic!("expected low fitness, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_guess_brings_large_motion_into_reach() {
        let cloud = cube_surface(600, 17);
        let model = model_from(cloud.clone());
        let applied = Transform::from_axis_angle(
            &Vector3::new(0.2, 1.0, 0.3),
            70f64.to_radians(),
            Vector3::new(0.4, -0.3, 0.2),
        );
        // Pose source is a few degrees and millimetres off
        let nudge = Transform::from_axis_angle(
            &Vector3::x(),
            2f64.to_radians(),
            Vector3::new(0.01, 0.0, -0.01),
        );
        let guess = nudge.compose(&applied.inverse());

        let frame = GeometryFrame::new(3, cloud.transformed(&applied)).with_initial_guess(guess);
        let result = Registrar::new(wide_config()).register(&frame, &model).unwrap();
        assert!(!result.is_degenerate());
        assert_inverse(&result.transform, &applied, 1e-4);
    }

    #[test]
    fn test_point_to_plane_strategy() {
        let cloud = cube_surface(800, 31);
        let model = model_from(cloud.clone());
        let applied = Transform::from_axis_angle(
            &Vector3::new(1.0, 0.5, 0.2),
            4f64.to_radians(),
            Vector3::new(0.02, -0.01, 0.015),
        );
        let registrar = Registrar::new(RegistrationConfig {
            strategy: RegistrationStrategy::PointToPlane,
            ..wide_config()
        });
        let frame = GeometryFrame::new(1, cloud.transformed(&applied));
        let result = registrar.register(&frame, &model).unwrap();
        assert!(!result.is_degenerate());
        assert_inverse(&result.transform, &applied, 1e-4);
    }

    #[test]
    fn test_empty_inputs_are_errors() {
        let registrar = Registrar::default();
        let frame = GeometryFrame::new(1, volume_cloud(10, 1));
        assert!(matches!(
            registrar.register(&frame, &Model::new()),
            Err(Error::EmptyModel)
        ));

        let model = model_from(volume_cloud(10, 1));
        assert!(matches!(
            registrar.register(&GeometryFrame::new(2, PointCloud::default()), &model),
            Err(Error::EmptyFrame(2))
        ));
    }

    #[test]
    fn test_register_does_not_touch_inputs() {
        let cloud = volume_cloud(100, 4);
        let model = model_from(cloud.clone());
        let frame = GeometryFrame::new(
            1,
            cloud.transformed(&Transform::from_translation(Vector3::new(0.01, 0.0, 0.0))),
        );
        let before_frame = frame.cloud().clone();
        let _ = Registrar::new(wide_config()).register(&frame, &model).unwrap();
        assert_eq!(frame.cloud(), &before_frame);
        assert_eq!(model.cloud(), &cloud);
        assert_eq!(model.frames_merged(), 1);
    }

    #[test]
    fn test_evaluate_registration() {
        let cloud = volume_cloud(50, 8);
        let (fitness, rmse) = evaluate_registration(&cloud, &cloud, &Transform::identity(), 0.01);
        assert_eq!(fitness, 1.0);
        assert_eq!(rmse, 0.0);

        let shifted = Transform::from_translation(Vector3::new(100.0, 0.0, 0.0));
        let (fitness, _) = evaluate_registration(&cloud, &cloud, &shifted, 0.01);
        assert_eq!(fitness, 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(RegistrationConfig::default().validate().is_ok());
        let bad = RegistrationConfig {
            radius_growth_factor: 0.5,
            ..RegistrationConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = RegistrationConfig {
            max_radius: 0.001,
            ..RegistrationConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = RegistrationConfig {
            min_fitness_threshold: 1.5,
            ..RegistrationConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
