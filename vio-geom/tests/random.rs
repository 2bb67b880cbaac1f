use vio_core::{
    nalgebra::{Point2, Point3, Rotation3, Vector3},
    CameraPoint, CameraToCamera, FeatureMatch, NormalizedKeyPoint, Pose, Projective,
    TriangulatorRelative,
};
use vio_geom::{epipolar, fundamental_from_projections, DltTriangulator, OptimalTriangulator};

const ROUNDS: usize = 1000;
const NOISE: f64 = 1e-3;

const ROT_MAGNITUDE: f64 = 0.1;
const POINT_BOX_SIZE: f64 = 2.0;
const POINT_DISTANCE: f64 = 3.0;

#[test]
fn noise_free_round_trip() {
    let successes = (0..ROUNDS)
        .filter(|_| {
            let (pose, point, FeatureMatch(a, b)) = some_test_data();
            match DltTriangulator::new().triangulate_relative(pose, a, b) {
                Ok(triangulated) => {
                    let distance = (point.point().unwrap() - triangulated.point().unwrap()).norm();
                    distance < 1e-6
                }
                Err(e) => {
                    eprintln!("failed to triangulate: {}", e);
                    false
                }
            }
        })
        .count();
    eprintln!("successes: {}", successes);
    assert!(successes > 990);
}

#[test]
fn correction_satisfies_the_constraint() {
    let p1 = CameraToCamera::identity().projection_matrix();
    let successes = (0..ROUNDS)
        .filter(|_| {
            let (pose, _, FeatureMatch(a, b)) = some_test_data();
            let p2 = pose.projection_matrix();
            let fundamental = fundamental_from_projections(&p1, &p2);
            let noisy = FeatureMatch(a, jitter(b));
            match epipolar::correct(fundamental, noisy) {
                Ok(corrected) => epipolar::epipolar_residual(fundamental, corrected).abs() < 1e-9,
                Err(e) => {
                    eprintln!("failed to correct: {}", e);
                    false
                }
            }
        })
        .count();
    eprintln!("successes: {}", successes);
    assert!(successes > 990);
}

#[test]
fn noisy_depth_stays_close() {
    let successes = (0..ROUNDS)
        .filter(|_| {
            let (pose, point, FeatureMatch(a, b)) = some_test_data();
            OptimalTriangulator::new()
                .triangulate_relative(pose, jitter(a), jitter(b))
                .ok()
                .and_then(|triangulated| triangulated.depth())
                .map(|depth| (depth - point.depth().unwrap()).abs() / point.depth().unwrap() < 0.2)
                .unwrap_or(false)
        })
        .count();
    eprintln!("successes: {}", successes);
    // Forward motion leaves points near the epipole with little parallax.
    assert!(successes > 800);
}

fn jitter(keypoint: NormalizedKeyPoint) -> NormalizedKeyPoint {
    let offset = (Vector3::<f64>::new_random().xy() * 2.0).add_scalar(-1.0) * NOISE;
    NormalizedKeyPoint(Point2::from(keypoint.coords + offset))
}

/// Gets a random relative pose, the point in camera A, and its projections into both cameras.
fn some_test_data() -> (CameraToCamera, CameraPoint, FeatureMatch<NormalizedKeyPoint>) {
    // A baseline of at least a quarter unit keeps the depth well conditioned.
    let translation = loop {
        let t = Vector3::<f64>::new_random().add_scalar(-0.5);
        if t.norm() > 0.25 {
            break t;
        }
    };
    let relative_pose = CameraToCamera::from_parts(
        translation,
        Rotation3::new(Vector3::new_random() * std::f64::consts::PI * 2.0 * ROT_MAGNITUDE),
    );

    loop {
        let mut a = Point3::from(Vector3::new_random() * POINT_BOX_SIZE);
        a.x -= 0.5 * POINT_BOX_SIZE;
        a.y -= 0.5 * POINT_BOX_SIZE;
        a.z += POINT_DISTANCE;
        let camera_a = CameraPoint::from_point(a);
        let camera_b = relative_pose.transform(camera_a);
        if let (Some(kp_a), Some(kp_b)) = (
            NormalizedKeyPoint::from_camera_point(camera_a),
            NormalizedKeyPoint::from_camera_point(camera_b),
        ) {
            if camera_b.depth().map_or(false, |depth| depth > 0.5) {
                return (relative_pose, camera_a, FeatureMatch(kp_a, kp_b));
            }
        }
    }
}
