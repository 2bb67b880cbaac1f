use crate::{FeatureRef, FrameKey};
use float_ord::FloatOrd;
use vio_core::WorldPoint;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A 3d point in the world that has been triangulated from at least one keyframe match.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Feature3D {
    pub position: WorldPoint,
    /// The reprojection error of the triangulation that produced `position`.
    pub variance: f64,
    /// The frame holding the 2d feature this landmark was last observed as.
    pub frame: FrameKey,
    /// The 2d feature this landmark was last observed as.
    pub feature: FeatureRef,
    /// The number of frames the landmark has been observed in.
    pub observations: usize,
}

impl Feature3D {
    pub fn new(position: WorldPoint, variance: f64, frame: FrameKey, feature: FeatureRef) -> Self {
        Self {
            position,
            variance,
            frame,
            feature,
            observations: 1,
        }
    }

    /// Incorporates a new estimate of the landmark.
    ///
    /// The estimate replaces the stored one only when it has lower variance. The observation is
    /// counted either way.
    pub fn update(&mut self, position: WorldPoint, variance: f64) {
        if variance < self.variance {
            self.position = position;
            self.variance = variance;
        }
        self.observations += 1;
    }

    /// Points the landmark at the 2d feature that continues it.
    pub fn reassociate(&mut self, frame: FrameKey, feature: FeatureRef) {
        self.frame = frame;
        self.feature = feature;
    }
}

/// Landmarks currently tracked and landmarks whose track was lost.
///
/// Both pools are kept sorted by ascending variance, so the most confident landmarks come first.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct LandmarkPools {
    active: Vec<Feature3D>,
    inactive: Vec<Feature3D>,
}

impl LandmarkPools {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn active(&self) -> &[Feature3D] {
        &self.active
    }

    pub fn inactive(&self) -> &[Feature3D] {
        &self.inactive
    }

    pub(crate) fn active_mut(&mut self) -> &mut [Feature3D] {
        &mut self.active
    }

    /// The `n` most confident active landmarks.
    pub fn best(&self, n: usize) -> &[Feature3D] {
        &self.active[..n.min(self.active.len())]
    }

    pub fn insert_active(&mut self, landmark: Feature3D) {
        insert_sorted(&mut self.active, landmark);
    }

    pub fn insert_inactive(&mut self, landmark: Feature3D) {
        insert_sorted(&mut self.inactive, landmark);
    }

    /// Replaces the active pool and retires `retired` into the inactive pool.
    pub(crate) fn replace_active(
        &mut self,
        active: impl IntoIterator<Item = Feature3D>,
        retired: impl IntoIterator<Item = Feature3D>,
    ) {
        self.active.clear();
        for landmark in active {
            self.insert_active(landmark);
        }
        for landmark in retired {
            self.insert_inactive(landmark);
        }
    }
}

fn insert_sorted(pool: &mut Vec<Feature3D>, landmark: Feature3D) {
    // Equal variances go after the existing ones.
    let ix = pool.partition_point(|other| FloatOrd(other.variance) <= FloatOrd(landmark.variance));
    pool.insert(ix, landmark);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::FeatureId;
    use vio_core::{nalgebra::Point3, Projective};

    fn landmark(variance: f64) -> Feature3D {
        Feature3D::new(
            WorldPoint::from_point(Point3::new(0.0, 0.0, variance)),
            variance,
            FrameKey::default(),
            FeatureRef {
                id: FeatureId(0),
                index: 0,
            },
        )
    }

    #[test]
    fn pools_are_sorted_by_variance() {
        let mut pools = LandmarkPools::new();
        for variance in [0.8, 0.1, 0.5] {
            pools.insert_active(landmark(variance));
        }
        let variances: Vec<f64> = pools.active().iter().map(|l| l.variance).collect();
        assert_eq!(variances, vec![0.1, 0.5, 0.8]);
        assert_eq!(pools.best(2).len(), 2);
        assert_eq!(pools.best(10).len(), 3);
        assert_eq!(pools.best(1)[0].variance, 0.1);
    }

    #[test]
    fn update_keeps_the_better_estimate() {
        let mut l = landmark(0.5);
        l.update(WorldPoint::from_point(Point3::new(1.0, 0.0, 0.0)), 0.9);
        assert_eq!(l.variance, 0.5);
        assert_eq!(l.observations, 2);
        l.update(WorldPoint::from_point(Point3::new(1.0, 0.0, 0.0)), 0.2);
        assert_eq!(l.variance, 0.2);
        assert_eq!(l.position.point().unwrap(), Point3::new(1.0, 0.0, 0.0));
        assert_eq!(l.observations, 3);
    }

    #[test]
    fn replacing_retires_into_inactive() {
        let mut pools = LandmarkPools::new();
        pools.insert_inactive(landmark(0.3));
        pools.replace_active(vec![landmark(0.4), landmark(0.2)], vec![landmark(0.1), landmark(0.9)]);
        let active: Vec<f64> = pools.active().iter().map(|l| l.variance).collect();
        let inactive: Vec<f64> = pools.inactive().iter().map(|l| l.variance).collect();
        assert_eq!(active, vec![0.2, 0.4]);
        assert_eq!(inactive, vec![0.1, 0.3, 0.9]);
    }
}
