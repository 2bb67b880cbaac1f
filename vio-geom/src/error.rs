use std::{error::Error, fmt::Display};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A two-view computation that has no reliable numeric answer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum GeomError {
    /// The epipolar correction quadratic has no real root.
    NegativeDiscriminant { discriminant: f64 },
    /// Both epipolar lines vanish, which happens when the points sit on the epipoles.
    VanishingEpipolarLine,
    /// Singular value decomposition did not converge.
    SvdFailed,
    /// The design matrix has more than a one-dimensional nullspace, so the solution is not unique.
    RankDeficient { singular_value: f64 },
    /// The homogeneous solution lies at (or numerically near) infinity.
    PointAtInfinity,
}

impl Display for GeomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeomError::NegativeDiscriminant { discriminant } => {
                write!(f, "epipolar correction discriminant is negative: {discriminant}")
            }
            GeomError::VanishingEpipolarLine => {
                write!(f, "epipolar lines vanish at the correspondence")
            }
            GeomError::SvdFailed => write!(f, "singular value decomposition did not converge"),
            GeomError::RankDeficient { singular_value } => write!(
                f,
                "design matrix is rank deficient (second smallest singular value {singular_value})"
            ),
            GeomError::PointAtInfinity => write!(f, "triangulated point is at infinity"),
        }
    }
}

impl Error for GeomError {}

pub type Result<T> = std::result::Result<T, GeomError>;
