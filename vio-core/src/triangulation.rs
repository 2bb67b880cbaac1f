use crate::{CameraPoint, CameraToCamera, NormalizedKeyPoint};

/// This trait allows you to take one relative pose from camera `A` to camera `B` and two
/// normalized keypoints `a` and `b` from their respective cameras to triangulate a point from
/// the perspective of camera `A`.
///
/// Camera `A` is the reference view and has the identity pose. The relative pose maps
/// [`CameraPoint`]s of `A` into [`CameraPoint`]s of `B`.
pub trait TriangulatorRelative {
    type Error;

    fn triangulate_relative(
        &self,
        relative_pose: CameraToCamera,
        a: NormalizedKeyPoint,
        b: NormalizedKeyPoint,
    ) -> Result<CameraPoint, Self::Error>;
}
