use crate::{Feature3D, FeatureId, Frame};
use vio_core::{CameraToWorld, WorldPoint};

/// The refined structure returned by a [`StructureOptimizer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizedStructure {
    /// Refined landmark positions, keyed by the identity of the 2d feature each landmark was
    /// last observed as.
    pub landmarks: Vec<(FeatureId, WorldPoint)>,
    /// A refined camera pose for the reference frame, if the optimizer estimated one.
    pub reference_pose: Option<CameraToWorld>,
}

/// Refines landmark positions against a reference frame, for instance with bundle adjustment.
pub trait StructureOptimizer {
    fn optimize(&mut self, reference: &Frame, landmarks: &[Feature3D]) -> OptimizedStructure;
}

/// Returns the landmarks unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOptimizer;

impl StructureOptimizer for NoopOptimizer {
    fn optimize(&mut self, _: &Frame, landmarks: &[Feature3D]) -> OptimizedStructure {
        OptimizedStructure {
            landmarks: landmarks
                .iter()
                .map(|landmark| (landmark.feature.id, landmark.position))
                .collect(),
            reference_pose: None,
        }
    }
}
