//! # VIO Depth
//!
//! Turns tracked 2d features into metric depths and 3d landmarks using the pose trajectory
//! estimated by a visual-inertial filter.
//!
//! Frames are inserted into a [`DepthEngine`] in arrival order. Each frame carries the filter
//! [`State`](vio_core::State) it was captured at and its features, where a feature may name the
//! feature of the previous frame it continues. Every pass
//!
//! - carries the depths of continued features through the camera motion,
//! - triangulates features tracked back to the keyframe with a [`vio_geom::OptimalTriangulator`],
//! - fuses carried and triangulated depths by inverse variance,
//! - maintains [`LandmarkPools`] of 3d landmarks, ordered most confident first.
//!
//! ```
//! use vio_core::nalgebra::{Point2, Vector3};
//! use vio_core::{CameraToBody, KeyPoint, NormalizedKeyPoint, Pose, State};
//! use vio_depth::{DepthEngine, Feature2D, FeatureId, FeatureRef, Frame, FrameId, StaticExtrinsic, VioSettings};
//!
//! let settings = VioSettings::default();
//! let mut engine = DepthEngine::new(settings.clone(), StaticExtrinsic(CameraToBody::identity()));
//!
//! let keypoint = NormalizedKeyPoint(Point2::new(0.1, 0.05));
//! let mut first = Feature2D::new(FeatureId(0), KeyPoint(Point2::new(330.0, 250.0)), keypoint, &settings);
//! first.depth = 10.0;
//! engine.process(Frame::new(FrameId(0), State::at_rest(0.0), vec![first], 1)).unwrap();
//!
//! // Move 1.0 forwards along the optical axis.
//! let moved = NormalizedKeyPoint(Point2::new(0.1 * 10.0 / 9.0, 0.05 * 10.0 / 9.0));
//! let second = Feature2D::new(FeatureId(1), KeyPoint(Point2::new(335.0, 253.0)), moved, &settings)
//!     .matched(FeatureRef { id: FeatureId(0), index: 0 });
//! let state = State::at_rest(0.1).position(Vector3::new(0.0, 0.0, 1.0));
//! let report = engine.process(Frame::new(FrameId(1), state, vec![second], 2)).unwrap();
//! assert!((report.features[0].depth - 9.0).abs() < 1e-6);
//! ```

mod engine;
mod error;
mod extrinsic;
mod frame;
mod keyframe;
mod landmark;
mod optimizer;
mod settings;

pub use engine::*;
pub use error::*;
pub use extrinsic::*;
pub use frame::*;
pub use keyframe::*;
pub use landmark::*;
pub use optimizer::*;
pub use settings::*;
