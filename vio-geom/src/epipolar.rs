use crate::{GeomError, Result};
use vio_core::{
    nalgebra::{Matrix2, Matrix3, Point2, Vector2, Vector3},
    FeatureMatch, NormalizedKeyPoint,
};

/// The algebraic epipolar residual `aᵗ · matrix · b` of a correspondence.
///
/// This is `0.0` when `a` lies exactly on the epipolar line `matrix * b`.
#[inline(always)]
pub fn epipolar_residual(
    matrix: impl Into<Matrix3<f64>>,
    FeatureMatch(a, b): FeatureMatch<NormalizedKeyPoint>,
) -> f64 {
    homogeneous(a).dot(&(matrix.into() * homogeneous(b)))
}

/// Moves a noisy correspondence the smallest distance that makes it satisfy the
/// epipolar constraint, so that `corrected_aᵗ · matrix · corrected_b = 0`.
///
/// `matrix` may be a fundamental or essential matrix. It must be oriented so that
/// `matrix * b` is the epipolar line of `b` in the image of `a`. For an
/// [`EssentialMatrix`](crate::EssentialMatrix) built from the pose that takes camera `A` to
/// camera `B` this means passing the match as `FeatureMatch(b, a)`.
///
/// This is the one-iteration optimal correction from Lindstrom's
/// ["Triangulation Made Easy"](https://doi.org/10.1109/CVPR.2010.5539785) (`niter1`): the
/// correction along the initial epipolar line normals is found from a quadratic, the normals
/// are moved to the corrected points and the step length is rescaled once.
///
/// ```
/// use vio_core::nalgebra::{Point2, Point3, Rotation3, Vector3};
/// use vio_core::{CameraPoint, CameraToCamera, FeatureMatch, NormalizedKeyPoint, Pose, Projective};
/// use vio_geom::{epipolar, EssentialMatrix};
///
/// let pose = CameraToCamera::from_parts(Vector3::new(0.5, 0.1, 0.0), Rotation3::new(Vector3::new(0.0, 0.1, 0.0)));
/// let point = CameraPoint::from_point(Point3::new(0.2, -0.1, 4.0));
/// let a = NormalizedKeyPoint::from_camera_point(point).unwrap();
/// let b = NormalizedKeyPoint::from_camera_point(pose.transform(point)).unwrap();
/// // Perturb the observation in image A.
/// let a = NormalizedKeyPoint(Point2::new(a.x + 1e-3, a.y - 2e-3));
///
/// let essential = EssentialMatrix::from(pose);
/// let corrected = epipolar::correct(essential, FeatureMatch(b, a)).unwrap();
/// assert!(epipolar::epipolar_residual(essential, corrected).abs() < 1e-9);
/// ```
pub fn correct(
    matrix: impl Into<Matrix3<f64>>,
    FeatureMatch(a, b): FeatureMatch<NormalizedKeyPoint>,
) -> Result<FeatureMatch<NormalizedKeyPoint>> {
    let matrix = matrix.into();
    let x1 = homogeneous(a);
    let x2 = homogeneous(b);

    // The upper-left block relates the inhomogeneous coordinates of the two points.
    let sub: Matrix2<f64> = matrix.fixed_slice::<2, 2>(0, 0).into_owned();

    // Normals of the epipolar lines: `n1` is the line from `b` in image A, `n2` the line from `a` in image B.
    let mut n1: Vector2<f64> = (matrix * x2).xy();
    let mut n2: Vector2<f64> = (matrix.transpose() * x1).xy();

    let c = x1.dot(&(matrix * x2));
    if c == 0.0 {
        // Already on the epipolar lines.
        return Ok(FeatureMatch(a, b));
    }
    let qa = n1.dot(&(sub * n2));
    let qb = 0.5 * (n1.norm_squared() + n2.norm_squared());

    let discriminant = qb * qb - qa * c;
    // Written negated so that NaN is also rejected.
    if !(discriminant >= 0.0) {
        return Err(GeomError::NegativeDiscriminant { discriminant });
    }
    let d = discriminant.sqrt();
    if !(qb + d > 0.0) {
        return Err(GeomError::VanishingEpipolarLine);
    }

    let mut lambda = c / (qb + d);
    let delta1 = n1 * lambda;
    let delta2 = n2 * lambda;
    n1 -= sub * delta2;
    n2 -= sub.transpose() * delta1;

    lambda *= 2.0 * d / (n1.norm_squared() + n2.norm_squared());
    if !lambda.is_finite() {
        return Err(GeomError::VanishingEpipolarLine);
    }

    // The homogeneous coordinate is untouched, so de-homogenizing keeps `z = 1`.
    let corrected_a = NormalizedKeyPoint(Point2::from(x1.xy() - n1 * lambda));
    let corrected_b = NormalizedKeyPoint(Point2::from(x2.xy() - n2 * lambda));
    Ok(FeatureMatch(corrected_a, corrected_b))
}

#[inline(always)]
fn homogeneous(keypoint: NormalizedKeyPoint) -> Vector3<f64> {
    keypoint.virtual_image_point().coords
}

#[cfg(test)]
mod test {
    use super::*;
    use vio_core::nalgebra::Point2;

    fn kp(x: f64, y: f64) -> NormalizedKeyPoint {
        NormalizedKeyPoint(Point2::new(x, y))
    }

    #[test]
    fn exact_match_is_unchanged() {
        // Pure x translation: epipolar lines are horizontal, so equal y is exact.
        let matrix = Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0);
        let m = FeatureMatch(kp(0.3, 0.2), kp(-0.1, 0.2));
        assert_eq!(correct(matrix, m).unwrap(), m);
    }

    #[test]
    fn horizontal_epipolar_lines_split_the_vertical_error() {
        let matrix = Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0);
        let FeatureMatch(a, b) = correct(matrix, FeatureMatch(kp(0.3, 0.2), kp(-0.1, 0.4))).unwrap();
        assert!((a.y - 0.3).abs() < 1e-12);
        assert!((b.y - 0.3).abs() < 1e-12);
        assert!((a.x - 0.3).abs() < 1e-12);
        assert!((b.x + 0.1).abs() < 1e-12);
    }

    #[test]
    fn no_real_correction_is_reported() {
        // With the identity, `n1ᵗ·n2 · c` outgrows the squared normal lengths.
        let err = correct(Matrix3::identity(), FeatureMatch(kp(1.0, 0.0), kp(1.0, 0.0))).unwrap_err();
        assert_eq!(err, GeomError::NegativeDiscriminant { discriminant: -1.0 });
    }

    #[test]
    fn vanishing_lines_are_reported() {
        let matrix = Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let err = correct(matrix, FeatureMatch(kp(0.0, 0.0), kp(0.0, 0.0))).unwrap_err();
        assert_eq!(err, GeomError::VanishingEpipolarLine);
    }
}
