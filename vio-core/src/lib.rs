//! # VIO Core
//!
//! Common types shared by the VIO depth crates: homogeneous points, typed rigid-body poses,
//! image keypoints, the estimator [`State`] and the transform algebra that turns a state into a
//! camera pose. Nothing in here owns any mutable pipeline state; it is all plain data and math.
//!
//! ## Frames of reference
//!
//! Every pose type names the direction it maps points in:
//!
//! * [`BodyToWorld`] - the pose of the vehicle body in the world, produced from a [`State`]
//! * [`CameraToBody`] - the camera mounting (extrinsic) pose relative to the body
//! * [`CameraToWorld`] - the pose of a camera in the world
//! * [`WorldToCamera`] - the inverse of [`CameraToWorld`]
//! * [`CameraToCamera`] - transforms the [`CameraPoint`] of one camera into another camera
//!
//! Camera space is right-handed with the positive z axis forwards, positive y axis down and
//! positive x axis right. The depth of a feature is its z coordinate in camera space.
//!
//! ```text
//!     world ---- BodyToWorld ----> body ---- CameraToBody ----> camera
//!       ^                                                         |
//!       +------------------------ CameraToWorld ------------------+
//! ```

mod keypoint;
mod matches;
mod point;
mod pose;
mod state;
mod triangulation;

pub use keypoint::*;
pub use matches::*;
pub use nalgebra;
pub use point::*;
pub use pose::*;
pub use state::*;
pub use triangulation::*;
