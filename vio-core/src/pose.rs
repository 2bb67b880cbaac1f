use crate::{BodyPoint, CameraPoint, Projective, WorldPoint};
use derive_more::{AsMut, AsRef, From, Into};
use nalgebra::{IsometryMatrix3, Matrix3x4, Matrix4, Rotation3, Vector3, Vector4};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This trait is implemented by all the different poses in this library:
///
/// * [`CameraToWorld`] - Transforms [`CameraPoint`] into [`WorldPoint`]
/// * [`WorldToCamera`] - Transforms [`WorldPoint`] into [`CameraPoint`]
/// * [`CameraToCamera`] - Transforms [`CameraPoint`] from one camera into [`CameraPoint`] for another camera
/// * [`BodyToWorld`] - Transforms [`BodyPoint`] into [`WorldPoint`]
/// * [`WorldToBody`] - Transforms [`WorldPoint`] into [`BodyPoint`]
/// * [`CameraToBody`] - Transforms [`CameraPoint`] into [`BodyPoint`]
/// * [`BodyToCamera`] - Transforms [`BodyPoint`] into [`CameraPoint`]
pub trait Pose: From<IsometryMatrix3<f64>> + Clone + Copy {
    type InputPoint: Projective;
    type OutputPoint: Projective;
    type Inverse: Pose;

    /// Retrieve the isometry.
    fn isometry(self) -> IsometryMatrix3<f64>;

    /// Creates a pose with no change in position or orientation.
    fn identity() -> Self {
        IsometryMatrix3::identity().into()
    }

    /// Takes the inverse of the pose.
    fn inverse(self) -> Self::Inverse {
        self.isometry().inverse().into()
    }

    /// Create the pose from rotation and translation.
    fn from_parts(translation: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        IsometryMatrix3::from_parts(translation.into(), rotation).into()
    }

    /// Retrieve the homogeneous matrix.
    fn homogeneous(self) -> Matrix4<f64> {
        self.isometry().to_homogeneous()
    }

    /// Retrieve the pose as a 3x4 `[R | t]` projection matrix acting on homogeneous input points.
    fn projection_matrix(self) -> Matrix3x4<f64> {
        let isometry = self.isometry();
        let rot = isometry.rotation.matrix();
        let trans = isometry.translation.vector;
        Matrix3x4::<f64>::from_columns(&[
            rot.column(0),
            rot.column(1),
            rot.column(2),
            trans.column(0),
        ])
    }

    /// Transform the given point to an output point.
    fn transform(self, input: Self::InputPoint) -> Self::OutputPoint {
        Self::OutputPoint::from(pose_output(self, input))
    }
}

/// Retrieves the output coordinate from the pose and input.
fn pose_output<P: Pose>(pose: P, input: P::InputPoint) -> Vector4<f64> {
    pose.isometry().to_homogeneous() * input.homogeneous()
}

/// Composes the pose of the body in the world with the camera mounting pose on the body,
/// producing the pose of the camera in the world.
///
/// ```
/// use vio_core::nalgebra::{Point3, Rotation3, Vector3};
/// use vio_core::{compose, BodyToWorld, CameraToBody, CameraPoint, Pose, Projective};
///
/// let body = BodyToWorld::from_parts(Vector3::new(1.0, 0.0, 0.0), Rotation3::identity());
/// let extrinsic = CameraToBody::from_parts(Vector3::new(0.0, 0.5, 0.0), Rotation3::identity());
/// let camera = compose(body, extrinsic);
/// let world = camera.transform(CameraPoint::from_point(Point3::origin()));
/// assert_eq!(world.point().unwrap(), Point3::new(1.0, 0.5, 0.0));
/// ```
pub fn compose(body: BodyToWorld, extrinsic: CameraToBody) -> CameraToWorld {
    (body.isometry() * extrinsic.isometry()).into()
}

/// Computes `a⁻¹ · b`, the motion that carries camera points of `b` into camera points of `a`.
///
/// To move a point observed by the last frame into the current frame, pass the current
/// camera pose as `a` and the last camera pose as `b`.
pub fn relative_motion(a: CameraToWorld, b: CameraToWorld) -> CameraToCamera {
    (a.isometry().inverse() * b.isometry()).into()
}

/// This contains a world pose, which is a pose of the world relative to the camera.
/// This maps [`WorldPoint`] into [`CameraPoint`], changing an absolute position into
/// a vector relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldToCamera(pub IsometryMatrix3<f64>);

impl Pose for WorldToCamera {
    type InputPoint = WorldPoint;
    type OutputPoint = CameraPoint;
    type Inverse = CameraToWorld;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

/// This contains a camera pose, which is a pose of the camera relative to the world.
/// This transforms camera points (with depth as `z`) into world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToWorld(pub IsometryMatrix3<f64>);

impl Pose for CameraToWorld {
    type InputPoint = CameraPoint;
    type OutputPoint = WorldPoint;
    type Inverse = WorldToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

/// This contains a relative pose that transforms the [`CameraPoint`] of one image
/// into the corresponding [`CameraPoint`] of another image.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToCamera(pub IsometryMatrix3<f64>);

impl Pose for CameraToCamera {
    type InputPoint = CameraPoint;
    type OutputPoint = CameraPoint;
    type Inverse = CameraToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

impl CameraToCamera {
    /// The length of the translation between the two optical centers.
    pub fn baseline(self) -> f64 {
        self.0.translation.vector.norm()
    }
}

/// The pose of the vehicle body in the world, as estimated by the filter.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BodyToWorld(pub IsometryMatrix3<f64>);

impl Pose for BodyToWorld {
    type InputPoint = BodyPoint;
    type OutputPoint = WorldPoint;
    type Inverse = WorldToBody;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldToBody(pub IsometryMatrix3<f64>);

impl Pose for WorldToBody {
    type InputPoint = WorldPoint;
    type OutputPoint = BodyPoint;
    type Inverse = BodyToWorld;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

/// The extrinsic calibration of the camera: where the camera sits on the body.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraToBody(pub IsometryMatrix3<f64>);

impl Pose for CameraToBody {
    type InputPoint = CameraPoint;
    type OutputPoint = BodyPoint;
    type Inverse = BodyToCamera;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BodyToCamera(pub IsometryMatrix3<f64>);

impl Pose for BodyToCamera {
    type InputPoint = BodyPoint;
    type OutputPoint = CameraPoint;
    type Inverse = CameraToBody;

    #[inline(always)]
    fn isometry(self) -> IsometryMatrix3<f64> {
        self.into()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn relative_motion_moves_point_into_current_camera() {
        let last = CameraToWorld::identity();
        let current = CameraToWorld::from_parts(Vector3::new(0.0, 0.0, 1.0), Rotation3::identity());
        let last_to_current = relative_motion(current, last);
        let point = last_to_current.transform(CameraPoint::from_point(Point3::new(0.0, 0.0, 10.0)));
        assert_relative_eq!(point.depth().unwrap(), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn relative_motion_of_itself_is_identity() {
        let pose = CameraToWorld::from_parts(
            Vector3::new(0.3, -0.2, 4.0),
            Rotation3::from_euler_angles(0.1, 0.2, 0.3),
        );
        let motion = relative_motion(pose, pose);
        assert_relative_eq!(motion.homogeneous(), Matrix4::identity(), epsilon = 1e-12);
    }

    #[test]
    fn compose_then_invert_round_trips() {
        let body = BodyToWorld::from_parts(
            Vector3::new(1.0, 2.0, 3.0),
            Rotation3::from_euler_angles(0.4, -0.1, 0.7),
        );
        let extrinsic = CameraToBody::from_parts(
            Vector3::new(0.05, 0.0, 0.1),
            Rotation3::from_euler_angles(-1.57, 0.0, -1.57),
        );
        let camera = compose(body, extrinsic);
        let recovered: BodyToWorld =
            (camera.isometry() * extrinsic.inverse().isometry()).into();
        assert_relative_eq!(recovered.homogeneous(), body.homogeneous(), epsilon = 1e-12);
    }

    #[test]
    fn projection_matrix_matches_transform() {
        let pose = CameraToCamera::from_parts(
            Vector3::new(0.1, 0.2, -0.3),
            Rotation3::from_euler_angles(0.2, 0.3, 0.1),
        );
        let point = Point3::new(0.5, -0.4, 3.0);
        let projected = pose.projection_matrix() * point.to_homogeneous();
        let transformed = pose.transform(CameraPoint::from_point(point)).point().unwrap();
        assert_relative_eq!(projected, transformed.coords, epsilon = 1e-12);
    }
}
