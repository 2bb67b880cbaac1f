//! Two-view geometry used to turn a pair of matched features into a 3d point.
//!
//! ## Triangulation
//!
//! We know the relative pose of two cameras and the normalized keypoint of the same feature
//! observed in each camera. Because the keypoints are noisy, the two rays out of the optical
//! centers do not intersect. The points are first moved the smallest distance that makes them
//! satisfy the epipolar constraint ([`epipolar`]), after which the rays intersect exactly and
//! the point can be recovered with the direct linear transform ([`triangulation`]).
//!
//! - `p` the point we are trying to triangulate
//! - `a` the normalized keypoint on camera A
//! - `b` the normalized keypoint on camera B
//! - `O` the optical center of a camera
//! - `@` the virtual image plane
//!
//! ```text
//!                        @
//!                        @
//!               p--------b--------O
//!              /         @
//!             /          @
//!            /           @
//!           /            @
//!   @@@@@@@a@@@@@
//!         /
//!        /
//!       /
//!      O
//! ```

mod error;

pub mod epipolar;
pub mod essential;
pub mod fundamental;
pub mod triangulation;

pub use error::*;
pub use essential::EssentialMatrix;
pub use fundamental::{fundamental_from_projections, FundamentalMatrix};
pub use triangulation::{DltTriangulator, OptimalTriangulator};
