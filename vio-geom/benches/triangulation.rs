use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vio_core::{
    nalgebra::{Point2, Point3, Rotation3, Vector3},
    CameraPoint, CameraToCamera, FeatureMatch, NormalizedKeyPoint, Pose, Projective,
    TriangulatorRelative,
};
use vio_geom::{epipolar, fundamental_from_projections, DltTriangulator, OptimalTriangulator};

fn sample() -> (CameraToCamera, NormalizedKeyPoint, NormalizedKeyPoint) {
    let pose = CameraToCamera::from_parts(
        Vector3::new(0.3, 0.05, -0.1),
        Rotation3::new(Vector3::new(0.02, 0.1, 0.0)),
    );
    let point = CameraPoint::from_point(Point3::new(0.4, -0.2, 6.0));
    let a = NormalizedKeyPoint::from_camera_point(point).unwrap();
    let b = NormalizedKeyPoint::from_camera_point(pose.transform(point)).unwrap();
    let b = NormalizedKeyPoint(Point2::new(b.x + 2e-4, b.y - 1e-4));
    (pose, a, b)
}

fn correct(c: &mut Criterion) {
    let (pose, a, b) = sample();
    let fundamental = fundamental_from_projections(
        &CameraToCamera::identity().projection_matrix(),
        &pose.projection_matrix(),
    );
    c.bench_function("epipolar correct", |bench| {
        bench.iter(|| epipolar::correct(black_box(fundamental), black_box(FeatureMatch(a, b))))
    });
}

fn triangulate(c: &mut Criterion) {
    let (pose, a, b) = sample();
    let dlt = DltTriangulator::new();
    let optimal = OptimalTriangulator::new();
    c.bench_function("dlt", |bench| {
        bench.iter(|| dlt.triangulate_relative(black_box(pose), black_box(a), black_box(b)))
    });
    c.bench_function("optimal", |bench| {
        bench.iter(|| optimal.triangulate_relative(black_box(pose), black_box(a), black_box(b)))
    });
}

criterion_group!(benches, correct, triangulate);
criterion_main!(benches);
