use crate::{FeatureId, FrameId};
use std::{error::Error, fmt::Display};
use vio_geom::GeomError;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// An invariant between frames, features and the keyframe record that does not hold.
///
/// These abort the whole depth pass. Nothing is mutated when one is returned, so the caller
/// may drop the offending frame and resynchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// The keyframe record caches a different next feature identity than its backing frame.
    KeyframeCounterMismatch { cached: u64, actual: u64 },
    /// A match claims a feature identity that its frame does not contain.
    MissingFeature { frame: FrameId, feature: FeatureId },
    /// A frame handle no longer refers to a stored frame.
    StaleFrame,
    /// The feature stored at an index is not the one the reference names.
    FeatureMismatch {
        expected: FeatureId,
        found: FeatureId,
    },
    /// A keyframe was required but none has been selected yet.
    NoKeyframe,
}

impl Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::KeyframeCounterMismatch { cached, actual } => write!(
                f,
                "keyframe caches next feature identity {cached} but its frame has {actual}"
            ),
            Violation::MissingFeature { frame, feature } => {
                write!(f, "frame {} has no feature {}", frame.0, feature.0)
            }
            Violation::StaleFrame => write!(f, "frame handle is stale"),
            Violation::FeatureMismatch { expected, found } => write!(
                f,
                "expected feature {} but found feature {}",
                expected.0, found.0
            ),
            Violation::NoKeyframe => write!(f, "no keyframe has been selected"),
        }
    }
}

/// Errors returned by the [`DepthEngine`](crate::DepthEngine).
#[derive(Debug, Clone, PartialEq)]
pub enum DepthError {
    ConsistencyViolation(Violation),
    /// A frame given to [`DepthEngine::insert_frame`](crate::DepthEngine::insert_frame) is not
    /// internally consistent or does not follow the stored history.
    InvalidFrame { frame: FrameId, reason: &'static str },
    /// The pass was requested before any frame was inserted.
    NoFrames,
}

impl Display for DepthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepthError::ConsistencyViolation(violation) => {
                write!(f, "consistency violation: {violation}")
            }
            DepthError::InvalidFrame { frame, reason } => {
                write!(f, "invalid frame {}: {reason}", frame.0)
            }
            DepthError::NoFrames => write!(f, "no frames have been inserted"),
        }
    }
}

impl Error for DepthError {}

impl From<Violation> for DepthError {
    fn from(violation: Violation) -> Self {
        DepthError::ConsistencyViolation(violation)
    }
}

pub type Result<T> = std::result::Result<T, DepthError>;

/// The body to camera transform could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    /// No transform between the two frames is known.
    Unavailable {
        camera_frame: String,
        body_frame: String,
    },
    /// The newest known transform is older than the requested time allows.
    Stale { requested: f64, latest: f64 },
}

impl Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::Unavailable {
                camera_frame,
                body_frame,
            } => write!(f, "no transform from {body_frame} to {camera_frame}"),
            LookupError::Stale { requested, latest } => write!(
                f,
                "transform requested at {requested} but the latest is from {latest}"
            ),
        }
    }
}

impl Error for LookupError {}

/// Why a triangulation was not promoted.
///
/// This is routine filtering and is recorded per feature in the
/// [`DepthReport`](crate::DepthReport) rather than returned as an error.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum Rejection {
    /// The point does not lie at least the minimum triangulation depth in front of the camera.
    NonPositiveDepth { depth: f64 },
    /// The point does not reproject onto the observations closely enough.
    ReprojectionError { residual: f64 },
    /// The geometry admits no reliable solution.
    Degenerate(GeomError),
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NonPositiveDepth { depth } => write!(f, "depth {depth} is too shallow"),
            Rejection::ReprojectionError { residual } => {
                write!(f, "reprojection error {residual} is too large")
            }
            Rejection::Degenerate(e) => write!(f, "degenerate geometry: {e}"),
        }
    }
}
