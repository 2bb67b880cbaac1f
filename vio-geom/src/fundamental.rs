use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use vio_core::nalgebra::{Matrix3, Matrix3x4, Matrix4};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A fundamental matrix relating two projection matrices `P1` and `P2`.
///
/// It is oriented so that `transpose(x1) * F * x2 = 0` where `x1 = P1 * X` and `x2 = P2 * X`,
/// which is the orientation expected by [`epipolar::correct`](crate::epipolar::correct) with
/// the match given as `FeatureMatch(x1, x2)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FundamentalMatrix(pub Matrix3<f64>);

const ROWS_A: [usize; 3] = [1, 2, 0];
const ROWS_B: [usize; 3] = [2, 0, 1];

/// Builds the fundamental matrix of two projection matrices.
///
/// Each entry is a 4x4 determinant of two rows of `p2` stacked on two rows of `p1`, following
/// `vgg_F_from_P` from Hartley and Zisserman's multiple view geometry code. No decomposition is
/// involved, so this never fails, though it returns the zero matrix when the two optical
/// centers coincide.
///
/// ```
/// use vio_core::nalgebra::{Point3, Rotation3, Vector3};
/// use vio_core::{CameraToCamera, Pose};
/// use vio_geom::fundamental_from_projections;
///
/// let p1 = CameraToCamera::identity().projection_matrix();
/// let p2 = CameraToCamera::from_parts(Vector3::new(0.2, 0.0, 0.1), Rotation3::new(Vector3::new(0.0, 0.05, 0.0))).projection_matrix();
/// let f = fundamental_from_projections(&p1, &p2);
/// let point = Point3::new(0.4, -0.3, 5.0).to_homogeneous();
/// let residual = (p1 * point).transpose() * *f * (p2 * point);
/// assert!(residual[0].abs() < 1e-12);
/// ```
pub fn fundamental_from_projections(p1: &Matrix3x4<f64>, p2: &Matrix3x4<f64>) -> FundamentalMatrix {
    let mut fundamental = Matrix3::zeros();
    let mut stacked = Matrix4::<f64>::zeros();
    for (r, (&a1, &b1)) in ROWS_A.iter().zip(&ROWS_B).enumerate() {
        stacked.row_mut(2).copy_from(&p1.row(a1));
        stacked.row_mut(3).copy_from(&p1.row(b1));
        for (c, (&a2, &b2)) in ROWS_A.iter().zip(&ROWS_B).enumerate() {
            stacked.row_mut(0).copy_from(&p2.row(a2));
            stacked.row_mut(1).copy_from(&p2.row(b2));
            fundamental[(r, c)] = stacked.determinant();
        }
    }
    FundamentalMatrix(fundamental)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::EssentialMatrix;
    use approx::assert_relative_eq;
    use vio_core::nalgebra::{Rotation3, Vector3};
    use vio_core::{CameraToCamera, Pose};

    #[test]
    fn pure_translation_gives_cross_matrix() {
        let t = Vector3::new(0.3, -0.1, 0.2);
        let p1 = CameraToCamera::identity().projection_matrix();
        let p2 = CameraToCamera::from_parts(t, Rotation3::identity()).projection_matrix();
        let f = fundamental_from_projections(&p1, &p2);
        assert_relative_eq!(*f, t.cross_matrix(), epsilon = 1e-12);
    }

    #[test]
    fn matches_transposed_essential_up_to_scale() {
        let pose = CameraToCamera::from_parts(
            Vector3::new(-0.8, 0.4, 0.5),
            Rotation3::from_euler_angles(0.2, 0.3, 0.4),
        );
        let f = fundamental_from_projections(
            &CameraToCamera::identity().projection_matrix(),
            &pose.projection_matrix(),
        );
        let essential = EssentialMatrix::from(pose);
        let f = f.normalize();
        let e = essential.transpose().normalize();
        let same = (f - e).norm() < 1e-9 || (f + e).norm() < 1e-9;
        assert!(same, "f: {}\ne: {}", f, e);
    }
}
