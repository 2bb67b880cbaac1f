use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Point3, Vector4};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This trait is implemented for homogeneous projective 3d coordinates.
pub trait Projective: From<Vector4<f64>> + Clone + Copy {
    /// Retrieve the homogeneous vector.
    ///
    /// No constraints are put on this vector. It is not normalized and may be scaled freely
    /// while still representing the same point.
    fn homogeneous(self) -> Vector4<f64>;

    /// Retrieve the euclidean 3d point by normalizing the homogeneous coordinate.
    ///
    /// This fails for points at (or numerically near) infinity.
    fn point(self) -> Option<Point3<f64>> {
        Point3::from_homogeneous(self.homogeneous())
    }

    /// Convert the euclidean 3d point into homogeneous coordinates.
    fn from_point(point: Point3<f64>) -> Self {
        point.to_homogeneous().into()
    }
}

/// A 3d point relative to a camera's optical center and orientation, where the positive X axis
/// is right, positive Y axis is down and positive Z axis is forwards.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraPoint(pub Vector4<f64>);

impl CameraPoint {
    /// The depth of the point along the optical axis.
    ///
    /// Returns `None` if the point is at infinity.
    pub fn depth(self) -> Option<f64> {
        self.point().map(|p| p.z)
    }
}

impl Projective for CameraPoint {
    fn homogeneous(self) -> Vector4<f64> {
        self.into()
    }
}

/// A point in world coordinates.
///
/// Unlike a monocular reconstruction, the world here is metric: its scale comes from the
/// estimator's pose trajectory, so distances between `WorldPoint`s are in the same units as
/// the [`State`](crate::State) positions.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldPoint(pub Vector4<f64>);

impl Projective for WorldPoint {
    fn homogeneous(self) -> Vector4<f64> {
        self.into()
    }
}

/// A point in the body frame of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BodyPoint(pub Vector4<f64>);

impl Projective for BodyPoint {
    fn homogeneous(self) -> Vector4<f64> {
        self.into()
    }
}
