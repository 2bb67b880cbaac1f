use log::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::path::PathBuf;
use structopt::StructOpt;
use vio_core::nalgebra::{Point2, Point3, UnitQuaternion, Vector3};
use vio_core::{
    CameraToBody, KeyPoint, NormalizedKeyPoint, Pose, Projective, State, WorldPoint,
};
use vio_depth::{
    DepthEngine, DepthReport, Feature2D, FeatureId, FeatureRef, Frame, FrameId, FrameKey,
    StaticExtrinsic, VioSettings,
};

type Engine = DepthEngine<StaticExtrinsic>;

#[derive(StructOpt, Clone)]
#[structopt(
    name = "vio-sandbox",
    about = "A tool for testing depth propagation on a synthetic trajectory"
)]
struct Opt {
    /// The file where settings are specified.
    ///
    /// This is in the format of `vio_depth::VioSettings`.
    #[structopt(short, long, default_value = "vio-settings.json")]
    settings: PathBuf,
    /// The number of frames to simulate.
    #[structopt(short, long, default_value = "30")]
    frames: usize,
    /// The number of landmarks scattered in front of the camera.
    #[structopt(short, long, default_value = "200")]
    points: usize,
    /// The seed of the scene and the observation noise.
    #[structopt(long, default_value = "5")]
    seed: u64,
    /// The time between frames in seconds.
    #[structopt(long, default_value = "0.1")]
    period: f64,
    /// The forward speed of the vehicle.
    #[structopt(long, default_value = "1.0")]
    speed: f64,
    /// The amplitude of the sideways sway of the vehicle.
    #[structopt(long, default_value = "0.5")]
    sway: f64,
    /// The largest offset of the uniform noise added to the normalized keypoints.
    #[structopt(long, default_value = "0.0005")]
    noise: f64,
    /// Rotate the keyframe every this many frames.
    #[structopt(long, default_value = "5")]
    keyframe_interval: usize,
    /// The focal length used to produce pixel keypoints.
    #[structopt(long, default_value = "500.0")]
    focal: f64,
    /// The optical center used to produce pixel keypoints.
    #[structopt(long, default_value = "320.0")]
    x_center: f64,
    #[structopt(long, default_value = "240.0")]
    y_center: f64,
    /// The half width of the field of view in normalized coordinates.
    #[structopt(long, default_value = "0.6")]
    field_of_view: f64,
    /// Output JSON file to deposit the landmark pools.
    #[structopt(short, long)]
    output: Option<PathBuf>,
}

/// A feature of the latest frame and the scene point it observes.
struct Track {
    feature: FeatureId,
    index: usize,
    point: usize,
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();

    let settings = std::fs::File::open(&opt.settings)
        .ok()
        .and_then(|file| serde_json::from_reader(file).ok());
    if settings.is_some() {
        info!("loaded existing settings");
    } else {
        info!("used default settings");
    }
    let settings: VioSettings = settings.unwrap_or_default();

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(opt.seed);
    let scene: Vec<Point3<f64>> = (0..opt.points)
        .map(|_| {
            Point3::new(
                rng.gen_range(-6.0..6.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(4.0..20.0 + opt.speed * opt.period * opt.frames as f64),
            )
        })
        .collect();
    info!("generated {} scene points", scene.len());

    let extrinsic = CameraToBody::identity();
    let mut engine = DepthEngine::new(settings.clone(), StaticExtrinsic(extrinsic));
    let mut tracks: Vec<Track> = vec![];
    let mut next_feature_id = 0u64;

    for n in 0..opt.frames {
        let state = state_at(&opt, n);
        let world_to_camera = state.camera_pose(extrinsic).inverse();

        let mut features = vec![];
        let mut observed = vec![];
        for (point, &world) in scene.iter().enumerate() {
            let camera = world_to_camera.transform(WorldPoint::from_point(world));
            let depth = match camera.depth() {
                Some(depth) if depth > settings.min_triangulation_depth => depth,
                _ => continue,
            };
            let normalized = match NormalizedKeyPoint::from_camera_point(camera) {
                Some(normalized) => normalized,
                None => continue,
            };
            if normalized.x.abs() > opt.field_of_view || normalized.y.abs() > opt.field_of_view {
                continue;
            }
            let normalized = NormalizedKeyPoint(Point2::new(
                normalized.x + opt.noise * rng.gen_range(-1.0..1.0),
                normalized.y + opt.noise * rng.gen_range(-1.0..1.0),
            ));
            let keypoint = KeyPoint(Point2::new(
                opt.focal * normalized.x + opt.x_center,
                opt.focal * normalized.y + opt.y_center,
            ));

            let id = FeatureId(next_feature_id);
            next_feature_id += 1;
            let mut feature = Feature2D::new(id, keypoint, normalized, &settings);
            if let Some(track) = tracks.iter().find(|track| track.point == point) {
                feature = feature.matched(FeatureRef {
                    id: track.feature,
                    index: track.index,
                });
            }
            trace!("point {} observed at depth {}", point, depth);
            observed.push(Track {
                feature: id,
                index: features.len(),
                point,
            });
            features.push(feature);
        }

        let frame = Frame::new(FrameId(n as u64), state, features, next_feature_id);
        if let Err(e) = engine.insert_frame(frame) {
            error!("frame {} was rejected: {}", n, e);
            continue;
        }
        tracks = observed;
        let report = match engine.propagate() {
            Ok(report) => report,
            Err(e) => {
                error!("frame {} was not processed: {}", n, e);
                continue;
            }
        };
        summarize(&opt, &engine, &scene, &tracks, &report, n);

        if n > 0 && n % opt.keyframe_interval.max(1) == 0 {
            rotate(&mut engine, report.frame);
        }
    }

    info!(
        "finished with {} active and {} inactive landmarks",
        engine.landmarks().active().len(),
        engine.landmarks().inactive().len()
    );
    for (rank, landmark) in engine.landmarks().best(5).iter().enumerate() {
        info!(
            "best landmark {}: variance {} after {} observations",
            rank, landmark.variance, landmark.observations
        );
    }

    if let Some(path) = opt.output {
        info!("exporting the landmark pools");
        match std::fs::File::create(&path) {
            Ok(file) => {
                if let Err(e) = serde_json::to_writer_pretty(file, engine.landmarks()) {
                    error!("unable to save landmarks: {}", e);
                }
            }
            Err(e) => error!("unable to create {}: {}", path.display(), e),
        }
    }
}

/// The vehicle drives forwards while swaying sideways and yawing into the sway.
fn state_at(opt: &Opt, n: usize) -> State {
    let t = n as f64 * opt.period;
    let phase = t * std::f64::consts::PI / 2.0;
    let position = Vector3::new(opt.sway * phase.sin(), 0.0, opt.speed * t);
    let velocity = Vector3::new(
        opt.sway * phase.cos() * std::f64::consts::PI / 2.0,
        0.0,
        opt.speed,
    );
    let yaw = 0.05 * phase.cos();
    State::at_rest(t)
        .position(position)
        .velocity(velocity)
        .orientation(UnitQuaternion::from_euler_angles(0.0, yaw, 0.0))
}

fn rotate(engine: &mut Engine, key: FrameKey) {
    if let Err(e) = engine.rotate_keyframe(key) {
        warn!("unable to rotate the keyframe: {}", e);
    }
}

fn summarize(
    opt: &Opt,
    engine: &Engine,
    scene: &[Point3<f64>],
    tracks: &[Track],
    report: &DepthReport,
    n: usize,
) {
    let world_to_camera = match engine.frame(report.frame) {
        Ok(frame) => frame.camera_pose(engine.extrinsic()).inverse(),
        Err(e) => {
            warn!("frame {} disappeared: {}", n, e);
            return;
        }
    };
    let errors: Vec<f64> = report
        .features
        .iter()
        .filter_map(|feature| {
            let track = tracks.get(feature.feature.index)?;
            let truth = world_to_camera
                .transform(WorldPoint::from_point(scene[track.point]))
                .depth()?;
            Some((feature.depth - truth) / truth)
        })
        .collect();
    let rms = if errors.is_empty() {
        0.0
    } else {
        (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt()
    };
    info!(
        "frame {} at t={:.2}: {} depths (rms relative error {:.4}), {} accepted, {} rejected, {} created, {} updated, {} retired",
        n,
        n as f64 * opt.period,
        report.features.len(),
        rms,
        report.accepted(),
        report.rejected(),
        report.landmarks_created,
        report.landmarks_updated,
        report.landmarks_retired,
    );
    if report.triangulation_skipped {
        debug!("frame {} is too close to the keyframe to triangulate", n);
    }
}
