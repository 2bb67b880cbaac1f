use crate::{compose, BodyToWorld, CameraToBody, CameraToWorld};
use nalgebra::{IsometryMatrix3, UnitQuaternion, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The filter's estimate of the vehicle at one instant.
///
/// Only the position and orientation are consumed here. The velocity is carried so that a
/// frame records the full kinematic estimate it was captured with; bias terms stay inside the
/// estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct State {
    /// Capture time in seconds.
    pub timestamp: f64,
    /// Position of the body in the world.
    pub position: Vector3<f64>,
    /// Orientation of the body in the world.
    pub orientation: UnitQuaternion<f64>,
    /// Velocity of the body in the world.
    pub velocity: Vector3<f64>,
}

impl State {
    /// A state at rest at the world origin.
    pub fn at_rest(timestamp: f64) -> Self {
        Self {
            timestamp,
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
        }
    }

    pub fn position(self, position: Vector3<f64>) -> Self {
        Self { position, ..self }
    }

    pub fn orientation(self, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            orientation,
            ..self
        }
    }

    pub fn velocity(self, velocity: Vector3<f64>) -> Self {
        Self { velocity, ..self }
    }

    /// The pose of the body in the world.
    pub fn body_pose(&self) -> BodyToWorld {
        IsometryMatrix3::from_parts(
            self.position.into(),
            self.orientation.to_rotation_matrix(),
        )
        .into()
    }

    /// The pose of the camera in the world given the camera mounting pose.
    pub fn camera_pose(&self, extrinsic: CameraToBody) -> CameraToWorld {
        compose(self.body_pose(), extrinsic)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{CameraPoint, Pose, Projective};
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Rotation3};

    #[test]
    fn camera_pose_applies_extrinsic_in_body_frame() {
        // Body yawed 90 degrees, camera mounted 1.0 forward along body x.
        let state = State::at_rest(0.0)
            .position(Vector3::new(2.0, 0.0, 0.0))
            .orientation(UnitQuaternion::from_euler_angles(
                0.0,
                0.0,
                std::f64::consts::FRAC_PI_2,
            ));
        let extrinsic = CameraToBody::from_parts(Vector3::new(1.0, 0.0, 0.0), Rotation3::identity());
        let optical_center = state
            .camera_pose(extrinsic)
            .transform(CameraPoint::from_point(Point3::origin()))
            .point()
            .unwrap();
        assert_relative_eq!(optical_center, Point3::new(2.0, 1.0, 0.0), epsilon = 1e-12);
    }
}
