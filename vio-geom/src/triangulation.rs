use crate::{epipolar, fundamental_from_projections, GeomError, Result};
use vio_core::{
    nalgebra::{Matrix3x4, Matrix4, Point2, Vector4, SVD},
    CameraPoint, CameraToCamera, FeatureMatch, NormalizedKeyPoint, Pose, TriangulatorRelative,
};

/// Triangulates a correspondence between two posed views with the direct linear transform.
///
/// Each view contributes the two rows `x * P[2] - P[0]` and `y * P[2] - P[1]` to a 4x4 design
/// matrix, and the right singular vector of its smallest singular value is the homogeneous
/// point. This is exact when the two rays intersect, which is why it is normally run on
/// correspondences that went through [`epipolar::correct`] first (see [`OptimalTriangulator`]).
///
/// ```
/// use vio_core::nalgebra::{Point3, Rotation3, Vector3};
/// use vio_core::{CameraPoint, CameraToCamera, NormalizedKeyPoint, Pose, Projective, TriangulatorRelative};
/// use vio_geom::DltTriangulator;
///
/// let point = CameraPoint::from_point(Point3::new(0.3, 0.1, 2.0));
/// let pose = CameraToCamera::from_parts(Vector3::new(0.1, 0.1, 0.1), Rotation3::new(Vector3::new(0.1, 0.1, 0.1)));
/// let a = NormalizedKeyPoint::from_camera_point(point).unwrap();
/// let b = NormalizedKeyPoint::from_camera_point(pose.transform(point)).unwrap();
/// let triangulated = DltTriangulator::new().triangulate_relative(pose, a, b).unwrap();
/// let distance = (point.point().unwrap().coords - triangulated.point().unwrap().coords).norm();
/// assert!(distance < 1e-6);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct DltTriangulator {
    epsilon: f64,
    max_iterations: usize,
    rank_threshold: f64,
    infinity_threshold: f64,
}

impl DltTriangulator {
    /// Creates a `DltTriangulator` with default values.
    ///
    /// Same as calling [`Default::default`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the epsilon used in the singular value decomposition.
    ///
    /// Default is `1e-12`.
    #[must_use]
    pub fn epsilon(self, epsilon: f64) -> Self {
        Self { epsilon, ..self }
    }

    /// Set the maximum number of iterations for the singular value decomposition.
    ///
    /// Default is `1000`.
    #[must_use]
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Set the ratio of the second smallest to the largest singular value below which the
    /// nullspace is considered more than one-dimensional.
    ///
    /// Default is `1e-9`.
    #[must_use]
    pub fn rank_threshold(self, rank_threshold: f64) -> Self {
        Self {
            rank_threshold,
            ..self
        }
    }

    /// Set the magnitude of the homogeneous `w` (of the unit nullspace vector) below which the
    /// point is considered to be at infinity.
    ///
    /// Default is `1e-9`.
    #[must_use]
    pub fn infinity_threshold(self, infinity_threshold: f64) -> Self {
        Self {
            infinity_threshold,
            ..self
        }
    }

    /// Solves for the unit homogeneous point in the nullspace of the design matrix.
    ///
    /// The sign and scale of the result are arbitrary.
    pub fn nullspace(
        &self,
        p1: &Matrix3x4<f64>,
        p2: &Matrix3x4<f64>,
        FeatureMatch(a, b): FeatureMatch<NormalizedKeyPoint>,
    ) -> Result<Vector4<f64>> {
        let mut design = Matrix4::<f64>::zeros();
        design.row_mut(0).copy_from(&(p1.row(2) * a.x - p1.row(0)));
        design.row_mut(1).copy_from(&(p1.row(2) * a.y - p1.row(1)));
        design.row_mut(2).copy_from(&(p2.row(2) * b.x - p2.row(0)));
        design.row_mut(3).copy_from(&(p2.row(2) * b.y - p2.row(1)));

        let svd = SVD::try_new(design, false, true, self.epsilon, self.max_iterations)
            .ok_or(GeomError::SvdFailed)?;
        let v_t = svd.v_t.ok_or(GeomError::SvdFailed)?;

        // Order the singular values from smallest to largest.
        let mut order = [0, 1, 2, 3];
        order.sort_unstable_by_key(|&ix| float_ord::FloatOrd(svd.singular_values[ix]));
        let largest = svd.singular_values[order[3]];
        let second_smallest = svd.singular_values[order[1]];
        if second_smallest <= self.rank_threshold * largest {
            return Err(GeomError::RankDeficient {
                singular_value: second_smallest,
            });
        }

        let homogeneous: Vector4<f64> = v_t.row(order[0]).transpose();
        if !homogeneous.iter().all(|n| n.is_finite()) {
            return Err(GeomError::SvdFailed);
        }
        Ok(homogeneous)
    }

    /// Triangulates the correspondence into the reference frame of the projection matrices.
    pub fn triangulate(
        &self,
        p1: &Matrix3x4<f64>,
        p2: &Matrix3x4<f64>,
        matched: FeatureMatch<NormalizedKeyPoint>,
    ) -> Result<CameraPoint> {
        let homogeneous = self.nullspace(p1, p2, matched)?;
        if homogeneous.w.abs() <= self.infinity_threshold * homogeneous.norm() {
            return Err(GeomError::PointAtInfinity);
        }
        Ok(CameraPoint(homogeneous / homogeneous.w))
    }
}

impl Default for DltTriangulator {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
            rank_threshold: 1e-9,
            infinity_threshold: 1e-9,
        }
    }
}

impl TriangulatorRelative for DltTriangulator {
    type Error = GeomError;

    fn triangulate_relative(
        &self,
        relative_pose: CameraToCamera,
        a: NormalizedKeyPoint,
        b: NormalizedKeyPoint,
    ) -> Result<CameraPoint> {
        self.triangulate(
            &CameraToCamera::identity().projection_matrix(),
            &relative_pose.projection_matrix(),
            FeatureMatch(a, b),
        )
    }
}

/// Corrects the correspondence onto the epipolar constraint before triangulating with the
/// direct linear transform.
///
/// The fundamental matrix is built from the two projection matrices with
/// [`fundamental_from_projections`], so both keypoints move the least amount needed for their
/// rays to intersect. This is the triangulator the depth propagation uses.
///
/// ```
/// use vio_core::nalgebra::{Point2, Point3, Rotation3, Vector3};
/// use vio_core::{CameraPoint, CameraToCamera, NormalizedKeyPoint, Pose, Projective, TriangulatorRelative};
/// use vio_geom::OptimalTriangulator;
///
/// let point = CameraPoint::from_point(Point3::new(-0.4, 0.2, 5.0));
/// let pose = CameraToCamera::from_parts(Vector3::new(-0.5, 0.0, 0.0), Rotation3::identity());
/// let a = NormalizedKeyPoint::from_camera_point(point).unwrap();
/// let b = NormalizedKeyPoint::from_camera_point(pose.transform(point)).unwrap();
/// let b = NormalizedKeyPoint(Point2::new(b.x, b.y + 1e-4));
/// let triangulated = OptimalTriangulator::new().triangulate_relative(pose, a, b).unwrap();
/// assert!((triangulated.depth().unwrap() - 5.0).abs() < 1e-2);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct OptimalTriangulator {
    dlt: DltTriangulator,
}

impl OptimalTriangulator {
    /// Creates an `OptimalTriangulator` with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the [`DltTriangulator`] run on the corrected correspondence.
    #[must_use]
    pub fn dlt(self, dlt: DltTriangulator) -> Self {
        Self { dlt }
    }

    pub fn triangulate(
        &self,
        p1: &Matrix3x4<f64>,
        p2: &Matrix3x4<f64>,
        matched: FeatureMatch<NormalizedKeyPoint>,
    ) -> Result<CameraPoint> {
        let fundamental = fundamental_from_projections(p1, p2);
        let corrected = epipolar::correct(fundamental, matched)?;
        self.dlt.triangulate(p1, p2, corrected)
    }
}

impl TriangulatorRelative for OptimalTriangulator {
    type Error = GeomError;

    fn triangulate_relative(
        &self,
        relative_pose: CameraToCamera,
        a: NormalizedKeyPoint,
        b: NormalizedKeyPoint,
    ) -> Result<CameraPoint> {
        self.triangulate(
            &CameraToCamera::identity().projection_matrix(),
            &relative_pose.projection_matrix(),
            FeatureMatch(a, b),
        )
    }
}

/// The reprojection error of a triangulated point against the observed correspondence.
///
/// This is the euclidean norm of the stacked differences between each observation and the
/// de-homogenized projection of `point` through its projection matrix. A point that projects
/// onto or behind an optical center has infinite error.
pub fn reprojection_error(
    p1: &Matrix3x4<f64>,
    p2: &Matrix3x4<f64>,
    point: CameraPoint,
    FeatureMatch(a, b): FeatureMatch<NormalizedKeyPoint>,
) -> f64 {
    let homogeneous: Vector4<f64> = point.0;
    let project = |p: &Matrix3x4<f64>| {
        let image = p * homogeneous;
        if image.z * homogeneous.w > 0.0 {
            Point2::from_homogeneous(image)
        } else {
            None
        }
    };
    match (project(p1), project(p2)) {
        (Some(pa), Some(pb)) => ((pa - a.0).norm_squared() + (pb - b.0).norm_squared()).sqrt(),
        _ => f64::INFINITY,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use vio_core::nalgebra::{Point3, Rotation3, Vector3};
    use vio_core::Projective;

    #[test]
    fn zero_baseline_is_rank_deficient() {
        let point = CameraPoint::from_point(Point3::new(0.1, 0.2, 3.0));
        let pose = CameraToCamera::from_parts(Vector3::zeros(), Rotation3::new(Vector3::new(0.0, 0.1, 0.0)));
        let a = NormalizedKeyPoint::from_camera_point(point).unwrap();
        let b = NormalizedKeyPoint::from_camera_point(pose.transform(point)).unwrap();
        let err = DltTriangulator::new().triangulate_relative(pose, a, b).unwrap_err();
        assert!(matches!(err, GeomError::RankDeficient { .. }), "{:?}", err);
    }

    #[test]
    fn parallel_rays_are_at_infinity() {
        let a = NormalizedKeyPoint(Point2::new(0.1, 0.1));
        let pose = CameraToCamera::from_parts(Vector3::new(1.0, 0.0, 0.0), Rotation3::identity());
        let err = DltTriangulator::new().triangulate_relative(pose, a, a).unwrap_err();
        assert_eq!(err, GeomError::PointAtInfinity);
    }

    #[test]
    fn exact_point_has_no_reprojection_error() {
        let point = CameraPoint::from_point(Point3::new(0.3, -0.2, 4.0));
        let pose = CameraToCamera::from_parts(Vector3::new(0.2, 0.0, 0.0), Rotation3::identity());
        let a = NormalizedKeyPoint::from_camera_point(point).unwrap();
        let b = NormalizedKeyPoint::from_camera_point(pose.transform(point)).unwrap();
        let p1 = CameraToCamera::identity().projection_matrix();
        let p2 = pose.projection_matrix();
        assert!(reprojection_error(&p1, &p2, point, FeatureMatch(a, b)) < 1e-12);
        let behind = CameraPoint::from_point(Point3::new(0.3, -0.2, -4.0));
        assert_eq!(reprojection_error(&p1, &p2, behind, FeatureMatch(a, b)), f64::INFINITY);
    }
}
