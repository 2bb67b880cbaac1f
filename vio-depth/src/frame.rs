use crate::{DepthError, Result, VioSettings, Violation};
use slotmap::{new_key_type, SlotMap};
use std::collections::HashSet;
use vio_core::{CameraPoint, CameraToBody, CameraToWorld, KeyPoint, NormalizedKeyPoint, State};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

new_key_type! {
    pub struct FrameKey;
}

/// The monotonically increasing identifier of a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FrameId(pub u64);

/// The identity the tracker assigned to a feature.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureId(pub u64);

/// Refers to a feature of some frame by identity.
///
/// The `index` into the frame's feature list is only a hint. Whenever it does not hold the
/// feature named by `id`, the feature is looked up by identity instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureRef {
    pub id: FeatureId,
    pub index: usize,
}

/// A 2d feature observed in one frame.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Feature2D {
    pub id: FeatureId,
    /// The keypoint as delivered by the tracker.
    pub keypoint: KeyPoint,
    /// The undistorted keypoint on the virtual image plane.
    pub normalized: NormalizedKeyPoint,
    /// The feature of the previous frame this one continues.
    pub matched: Option<FeatureRef>,
    /// Depth along the optical axis.
    pub depth: f64,
    pub depth_variance: f64,
}

impl Feature2D {
    /// Creates an unmatched feature with the default depth and variance from the settings.
    pub fn new(
        id: FeatureId,
        keypoint: KeyPoint,
        normalized: NormalizedKeyPoint,
        settings: &VioSettings,
    ) -> Self {
        Self {
            id,
            keypoint,
            normalized,
            matched: None,
            depth: settings.default_feature_depth,
            depth_variance: settings.default_depth_variance,
        }
    }

    /// Marks the feature as continuing `previous` from the previous frame.
    #[must_use]
    pub fn matched(self, previous: FeatureRef) -> Self {
        Self {
            matched: Some(previous),
            ..self
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }

    /// The feature as a point in its camera space at its current depth.
    pub fn camera_point(&self) -> CameraPoint {
        self.normalized.with_depth(self.depth)
    }
}

/// One processed image.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Frame {
    pub id: FrameId,
    /// The filter estimate at capture time.
    pub state: State,
    pub features: Vec<Feature2D>,
    /// The tracker's next feature identity at the time this frame was created.
    pub next_feature_id: u64,
}

impl Frame {
    pub fn new(id: FrameId, state: State, features: Vec<Feature2D>, next_feature_id: u64) -> Self {
        Self {
            id,
            state,
            features,
            next_feature_id,
        }
    }

    /// Finds the index of the feature with identity `id`.
    pub fn find(&self, id: FeatureId) -> Option<usize> {
        self.features.iter().position(|feature| feature.id == id)
    }

    /// Resolves a reference to an index into this frame's features.
    ///
    /// The index of the reference is tried first and the identity second.
    pub fn resolve(&self, reference: FeatureRef) -> Result<usize> {
        match self.features.get(reference.index) {
            Some(feature) if feature.id == reference.id => Ok(reference.index),
            _ => self.find(reference.id).ok_or_else(|| {
                Violation::MissingFeature {
                    frame: self.id,
                    feature: reference.id,
                }
                .into()
            }),
        }
    }

    /// Gets the feature at exactly the index of the reference.
    ///
    /// Unlike [`Frame::resolve`], a different feature at the index is a violation.
    pub fn feature_at(&self, reference: FeatureRef) -> Result<&Feature2D> {
        let feature = self
            .features
            .get(reference.index)
            .ok_or(Violation::MissingFeature {
                frame: self.id,
                feature: reference.id,
            })?;
        if feature.id != reference.id {
            return Err(Violation::FeatureMismatch {
                expected: reference.id,
                found: feature.id,
            }
            .into());
        }
        Ok(feature)
    }

    /// A reference to the feature at `index`.
    pub fn reference(&self, index: usize) -> Option<FeatureRef> {
        self.features.get(index).map(|feature| FeatureRef {
            id: feature.id,
            index,
        })
    }

    pub fn camera_pose(&self, extrinsic: CameraToBody) -> CameraToWorld {
        self.state.camera_pose(extrinsic)
    }

    /// Checks the frame on its own and as the successor of `previous`.
    pub(crate) fn validate(&self, previous: Option<&Frame>) -> Result<()> {
        let invalid = |reason| DepthError::InvalidFrame {
            frame: self.id,
            reason,
        };
        if let Some(previous) = previous {
            if self.id <= previous.id {
                return Err(invalid("frame identifiers must increase"));
            }
        }
        let mut ids = HashSet::with_capacity(self.features.len());
        let mut continued = HashSet::new();
        for feature in &self.features {
            if !ids.insert(feature.id) {
                return Err(invalid("duplicate feature identity"));
            }
            if feature.id.0 >= self.next_feature_id {
                return Err(invalid("feature identity was not issued yet"));
            }
            if !feature.depth.is_finite() || !(feature.depth_variance > 0.0) {
                return Err(invalid("feature depth must be finite with positive variance"));
            }
            if let Some(matched) = feature.matched {
                if previous.is_none() {
                    return Err(invalid("the first frame cannot continue features"));
                }
                if !continued.insert(matched.id) {
                    return Err(invalid("two features continue the same feature"));
                }
            }
        }
        Ok(())
    }
}

/// Owns every frame along with the order in which they arrived.
///
/// Frames are never removed, so a [`FrameKey`] handed out by this store stays valid.
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: SlotMap<FrameKey, Frame>,
    history: Vec<FrameKey>,
}

impl FrameStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a frame to the history without validating it.
    pub fn insert(&mut self, frame: Frame) -> FrameKey {
        let key = self.frames.insert(frame);
        self.history.push(key);
        key
    }

    pub fn get(&self, key: FrameKey) -> Result<&Frame> {
        self.frames
            .get(key)
            .ok_or(DepthError::ConsistencyViolation(Violation::StaleFrame))
    }

    pub fn get_mut(&mut self, key: FrameKey) -> Result<&mut Frame> {
        self.frames
            .get_mut(key)
            .ok_or(DepthError::ConsistencyViolation(Violation::StaleFrame))
    }

    /// The keys of all frames, oldest first.
    pub fn history(&self) -> &[FrameKey] {
        &self.history
    }

    /// Where `key` sits in the history.
    pub fn position(&self, key: FrameKey) -> Option<usize> {
        self.history.iter().rposition(|&k| k == key)
    }

    /// The most recent frame.
    pub fn latest(&self) -> Option<FrameKey> {
        self.history.last().copied()
    }

    /// The frame before the most recent one.
    pub fn previous(&self) -> Option<FrameKey> {
        self.history.len().checked_sub(2).map(|ix| self.history[ix])
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameKey, &Frame)> + '_ {
        self.history.iter().map(move |&key| (key, &self.frames[key]))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use vio_core::nalgebra::Point2;

    fn feature(id: u64, previous: Option<FeatureRef>) -> Feature2D {
        let feature = Feature2D::new(
            FeatureId(id),
            KeyPoint(Point2::new(id as f64, 0.0)),
            NormalizedKeyPoint(Point2::new(0.0, 0.0)),
            &VioSettings::default(),
        );
        match previous {
            Some(previous) => feature.matched(previous),
            None => feature,
        }
    }

    #[test]
    fn resolve_falls_back_to_identity() {
        let frame = Frame::new(
            FrameId(0),
            State::at_rest(0.0),
            vec![feature(4, None), feature(7, None), feature(9, None)],
            10,
        );
        let exact = FeatureRef {
            id: FeatureId(7),
            index: 1,
        };
        let shuffled = FeatureRef {
            id: FeatureId(9),
            index: 0,
        };
        let missing = FeatureRef {
            id: FeatureId(5),
            index: 0,
        };
        assert_eq!(frame.resolve(exact).unwrap(), 1);
        assert_eq!(frame.resolve(shuffled).unwrap(), 2);
        assert_eq!(
            frame.resolve(missing).unwrap_err(),
            DepthError::ConsistencyViolation(Violation::MissingFeature {
                frame: FrameId(0),
                feature: FeatureId(5),
            })
        );
        assert_eq!(
            frame.feature_at(shuffled).unwrap_err(),
            DepthError::ConsistencyViolation(Violation::FeatureMismatch {
                expected: FeatureId(9),
                found: FeatureId(4),
            })
        );
    }

    #[test]
    fn validation_rejects_inconsistent_frames() {
        let first = Frame::new(FrameId(3), State::at_rest(0.0), vec![feature(0, None)], 1);
        assert!(first.validate(None).is_ok());

        let continued = FeatureRef {
            id: FeatureId(0),
            index: 0,
        };
        let orphan = Frame::new(FrameId(0), State::at_rest(0.0), vec![feature(1, Some(continued))], 2);
        assert!(orphan.validate(None).is_err());

        let backwards = Frame::new(FrameId(2), State::at_rest(0.1), vec![], 1);
        assert!(backwards.validate(Some(&first)).is_err());

        let split = Frame::new(
            FrameId(4),
            State::at_rest(0.1),
            vec![feature(1, Some(continued)), feature(2, Some(continued))],
            3,
        );
        assert!(split.validate(Some(&first)).is_err());

        let unissued = Frame::new(FrameId(4), State::at_rest(0.1), vec![feature(5, None)], 3);
        assert!(unissued.validate(Some(&first)).is_err());
    }

    #[test]
    fn store_tracks_latest_and_previous() {
        let mut store = FrameStore::new();
        assert_eq!(store.previous(), None);
        let a = store.insert(Frame::new(FrameId(0), State::at_rest(0.0), vec![], 0));
        assert_eq!(store.latest(), Some(a));
        assert_eq!(store.previous(), None);
        let b = store.insert(Frame::new(FrameId(1), State::at_rest(0.1), vec![], 0));
        assert_eq!(store.latest(), Some(b));
        assert_eq!(store.previous(), Some(a));
        assert_eq!(store.position(a), Some(0));
        assert_eq!(store.iter().map(|(key, _)| key).collect::<Vec<_>>(), vec![a, b]);
    }
}
