use crate::{GeomError, Result};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use vio_core::{
    nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3, SVD},
    CameraToCamera, FeatureMatch, NormalizedKeyPoint, Pose,
};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// This stores an essential matrix, which is satisfied by the following constraint:
///
/// transpose(x') * E * x = 0
///
/// Where `x'` and `x` are homogeneous normalized image coordinates in the second and first
/// camera respectively. You can get a homogeneous normalized image coordinate by appending
/// `1.0` to a `NormalizedKeyPoint`.
///
/// `E * x` is the epipolar line of `x` in the second image: every point along the ray out of
/// the first camera through `x` projects somewhere onto that line. The dot product of the
/// line with `x'` is the algebraic epipolar residual.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct EssentialMatrix(pub Matrix3<f64>);

impl EssentialMatrix {
    /// Decomposes the essential matrix into one rotation and translation bearing.
    ///
    /// This is `R = U * W * transpose(V)` and `t = U.column(2)` from the singular value
    /// decomposition `E = U * S * transpose(V)`, with the determinants of `U` and `V` forced
    /// positive. It is one of the four classical solutions; the other three differ by the twist
    /// `W -> transpose(W)` and the sign of `t` (see [`EssentialMatrix::possible_unscaled_poses`]).
    /// Selecting the physically valid one (points in front of both cameras) is left to the caller.
    ///
    /// `epsilon` is the threshold by which the singular value decomposition is considered
    /// complete. `max_iterations` caps the number of iterations it will run; `0` may run
    /// indefinitely.
    pub fn decompose(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Result<(Rotation3<f64>, Vector3<f64>)> {
        self.possible_rotations_unscaled_translation(epsilon, max_iterations)
            .map(|(rot_a, _, t)| (rot_a, t))
    }

    /// Returns two possible rotations for the essential matrix along with a translation
    /// bearing of arbitrary length and unknown sign.
    ///
    /// ```
    /// use vio_core::CameraToCamera;
    /// use vio_core::nalgebra::{IsometryMatrix3, Rotation3, Vector3};
    /// use vio_geom::EssentialMatrix;
    /// let pose = CameraToCamera(IsometryMatrix3::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5).into(),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// ));
    /// let (rot_a, rot_b, t) = EssentialMatrix::from(pose).possible_rotations_unscaled_translation(1e-6, 50).unwrap();
    /// let a_close = (rot_a.matrix() - pose.0.rotation.matrix()).norm() < 1e-4;
    /// let b_close = (rot_b.matrix() - pose.0.rotation.matrix()).norm() < 1e-4;
    /// // At least one rotation is correct.
    /// assert!(a_close || b_close);
    /// // The translation points in the same (or reverse) direction.
    /// let t_res = 1.0 - t.normalize().dot(&pose.0.translation.vector.normalize()).abs();
    /// assert!(t_res < 1e-4);
    /// ```
    pub fn possible_rotations_unscaled_translation(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Result<(Rotation3<f64>, Rotation3<f64>, Vector3<f64>)> {
        let Self(essential) = *self;

        // `W` from https://en.wikipedia.org/wiki/Essential_matrix#Finding_one_solution.
        let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let wt = w.transpose();

        let (mut u, mut v_t) = match SVD::try_new(essential, true, true, epsilon, max_iterations) {
            Some(SVD {
                u: Some(u),
                v_t: Some(v_t),
                ..
            }) => (u, v_t),
            _ => return Err(GeomError::SvdFailed),
        };

        // Force the determinants to be positive so the rotations are right-handed.
        // Last column of U is undetermined since d = (a a 0).
        if u.determinant() < 0.0 {
            for n in u.column_mut(2).iter_mut() {
                *n *= -1.0;
            }
        }
        // Last row of Vt is undetermined since d = (a a 0).
        if v_t.determinant() < 0.0 {
            for n in v_t.row_mut(2).iter_mut() {
                *n *= -1.0;
            }
        }

        Ok((
            orthonormalize(u * w * v_t),
            orthonormalize(u * wt * v_t),
            u.column(2).into_owned(),
        ))
    }

    /// All four `(R, t)` solutions of the essential matrix as relative poses.
    ///
    /// ```
    /// use vio_core::CameraToCamera;
    /// use vio_core::nalgebra::{IsometryMatrix3, Rotation3, Vector3};
    /// use vio_geom::EssentialMatrix;
    /// let pose = CameraToCamera(IsometryMatrix3::from_parts(
    ///     Vector3::new(-0.8, 0.4, 0.5).into(),
    ///     Rotation3::from_euler_angles(0.2, 0.3, 0.4),
    /// ));
    /// let poses = EssentialMatrix::from(pose).possible_unscaled_poses(1e-6, 50).unwrap();
    /// let one_correct = poses.iter().any(|&upose| {
    ///     let rotation_residual = (upose.0.rotation.matrix() - pose.0.rotation.matrix()).norm();
    ///     let translation_residual = 1.0
    ///         - upose.0.translation.vector.normalize()
    ///             .dot(&pose.0.translation.vector.normalize());
    ///     rotation_residual < 1e-4 && translation_residual < 1e-4
    /// });
    /// assert!(one_correct);
    /// ```
    pub fn possible_unscaled_poses(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Result<[CameraToCamera; 4]> {
        self.possible_rotations_unscaled_translation(epsilon, max_iterations)
            .map(|(rot_a, rot_b, t)| {
                [
                    CameraToCamera::from_parts(t, rot_a),
                    CameraToCamera::from_parts(t, rot_b),
                    CameraToCamera::from_parts(-t, rot_a),
                    CameraToCamera::from_parts(-t, rot_b),
                ]
            })
    }

    /// The absolute algebraic residual `|transpose(b) * E * a|` of a match from the first camera
    /// `a` to the second camera `b`.
    pub fn residual(&self, FeatureMatch(a, b): FeatureMatch<NormalizedKeyPoint>) -> f64 {
        let a = a.virtual_image_point().coords;
        let b = b.virtual_image_point().coords;
        b.dot(&(self.0 * a)).abs()
    }
}

/// Generates an essential matrix corresponding to this relative camera pose.
///
/// If a point `a` is transformed using [`Pose::transform`] into a point `b`, then the
/// essential matrix returned gives a residual of approximately `0.0` for `FeatureMatch(a, b)`.
impl From<CameraToCamera> for EssentialMatrix {
    fn from(pose: CameraToCamera) -> Self {
        Self(pose.0.translation.vector.cross_matrix() * *pose.0.rotation.matrix())
    }
}

/// Projects a product of SVD factors, which drifts from orthonormal by rounding, back onto
/// a proper rotation.
fn orthonormalize(matrix: Matrix3<f64>) -> Rotation3<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(matrix))
        .to_rotation_matrix()
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn random_pose(rng: &mut SmallRng) -> CameraToCamera {
        let mut unit_box = || {
            Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        };
        let translation = unit_box();
        let axis = unit_box();
        CameraToCamera::from_parts(translation, Rotation3::new(axis * 0.5))
    }

    #[test]
    fn every_solution_reproduces_the_matrix() {
        let mut rng = SmallRng::seed_from_u64(0);
        for _ in 0..100 {
            let essential = EssentialMatrix::from(random_pose(&mut rng));
            let expected = essential.normalize();
            for candidate in essential.possible_unscaled_poses(1e-12, 1000).unwrap() {
                let rebuilt = EssentialMatrix::from(candidate).normalize();
                let same = (rebuilt - expected).norm() < 1e-6 || (rebuilt + expected).norm() < 1e-6;
                assert!(same, "expected: {}\nrebuilt: {}", expected, rebuilt);
            }
        }
    }

    #[test]
    fn decompose_is_first_candidate() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            let pose = random_pose(&mut rng);
            let essential = EssentialMatrix::from(pose);
            let (rotation, translation) = essential.decompose(1e-12, 1000).unwrap();
            let candidates = essential.possible_unscaled_poses(1e-12, 1000).unwrap();
            assert_eq!(candidates[0], CameraToCamera::from_parts(translation, rotation));
            // The true pose is one of the four.
            assert!(candidates.iter().any(|candidate| {
                (candidate.0.rotation.matrix() - pose.0.rotation.matrix()).norm() < 1e-6
                    && 1.0
                        - candidate
                            .0
                            .translation
                            .vector
                            .normalize()
                            .dot(&pose.0.translation.vector.normalize())
                        < 1e-6
            }));
        }
    }

    #[test]
    fn candidate_rotations_are_orthonormal() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..100 {
            let essential = EssentialMatrix::from(random_pose(&mut rng));
            let (rot_a, rot_b, _) = essential
                .possible_rotations_unscaled_translation(1e-12, 1000)
                .unwrap();
            for rotation in [rot_a, rot_b] {
                let m = rotation.matrix();
                assert!((m.transpose() * m - Matrix3::identity()).norm() < 1e-12);
                assert!((m.determinant() - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn transformed_points_have_zero_residual() {
        use vio_core::{nalgebra::Point3, CameraPoint, Projective};
        let mut rng = SmallRng::seed_from_u64(2);
        let pose = random_pose(&mut rng);
        let essential = EssentialMatrix::from(pose);
        let point = CameraPoint::from_point(Point3::new(0.3, -0.2, 4.0));
        let a = NormalizedKeyPoint::from_camera_point(point).unwrap();
        let b = NormalizedKeyPoint::from_camera_point(pose.transform(point)).unwrap();
        assert!(essential.residual(FeatureMatch(a, b)) < 1e-12);
    }
}
