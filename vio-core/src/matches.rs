#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A correspondence of the same feature between two images.
///
/// The first element is always from the reference image (the one with the identity pose),
/// the second from the other image.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureMatch<P>(pub P, pub P);
