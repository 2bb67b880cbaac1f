use crate::CameraPoint;
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Point2, Point3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A point on an image frame in pixel coordinates, as delivered by the tracker.
/// This means the keypoint is neither undistorted nor normalized.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct KeyPoint(pub Point2<f64>);

/// A point in normalized image coordinates. This keypoint has been corrected
/// for lens distortion and normalized by the camera intrinsic matrix, so it lies
/// on the virtual image plane at `z = 1.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct NormalizedKeyPoint(pub Point2<f64>);

impl NormalizedKeyPoint {
    /// Tries to convert the [`CameraPoint`] into a [`NormalizedKeyPoint`], but it may fail
    /// in extreme conditions, in which case `None` is returned.
    pub fn from_camera_point(point: CameraPoint) -> Option<Self> {
        use crate::Projective;
        Point2::from_homogeneous(point.homogeneous().xyz()).map(Self)
    }

    /// Conceptually appends a `1.0` component to the normalized keypoint to create
    /// a [`CameraPoint`] on the virtual image plane and then multiplies
    /// the point by `depth`. This `z`/`depth` component must be the depth of
    /// the keypoint in the direction the camera is pointing from the
    /// camera's optical center.
    pub fn with_depth(self, depth: f64) -> CameraPoint {
        (self.coords * depth).push(depth).push(1.0).into()
    }

    /// Get the virtual image point as a [`Point3`].
    pub fn virtual_image_point(self) -> Point3<f64> {
        self.coords.push(1.0).into()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Projective;

    #[test]
    fn with_depth_scales_the_virtual_image_point() {
        let keypoint = NormalizedKeyPoint(Point2::new(0.25, -0.5));
        let point = keypoint.with_depth(4.0).point().unwrap();
        assert_eq!(point, Point3::new(1.0, -2.0, 4.0));
        assert_eq!(
            NormalizedKeyPoint::from_camera_point(keypoint.with_depth(4.0)),
            Some(keypoint)
        );
    }
}
