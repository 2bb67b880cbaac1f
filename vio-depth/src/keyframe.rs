use crate::{FeatureRef, Frame, FrameKey, FrameStore, Result, Violation};
use itertools::Itertools;
use log::*;
use vio_core::FeatureMatch;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The frame currently used as the triangulation baseline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct KeyframeRecord {
    /// The frame backing the keyframe.
    pub frame: FrameKey,
    /// The next feature identity of the backing frame when the keyframe was selected.
    pub next_feature_id: u64,
    /// Correspondences from current frame features (`.0`) to keyframe features (`.1`).
    pub matches: Vec<FeatureMatch<FeatureRef>>,
}

impl KeyframeRecord {
    fn new(frame: FrameKey, backing: &Frame) -> Self {
        Self {
            frame,
            next_feature_id: backing.next_feature_id,
            matches: vec![],
        }
    }
}

/// Tracks the single active keyframe.
///
/// It starts uninitialized and points at a frame after [`KeyframeTracker::ensure_initialized`].
/// When to move to a new keyframe is decided outside and applied with
/// [`KeyframeTracker::rotate`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct KeyframeTracker {
    record: Option<KeyframeRecord>,
}

impl KeyframeTracker {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record(&self) -> Option<&KeyframeRecord> {
        self.record.as_ref()
    }

    pub fn record_mut(&mut self) -> Option<&mut KeyframeRecord> {
        self.record.as_mut()
    }

    /// Selects the frame before the most recent one as the keyframe if none is selected yet.
    ///
    /// Returns `None` while fewer than two frames exist.
    pub fn ensure_initialized(&mut self, store: &FrameStore) -> Option<&KeyframeRecord> {
        if self.record.is_none() {
            let key = store.previous()?;
            let backing = store.get(key).ok()?;
            info!("selecting frame {} as the first keyframe", backing.id.0);
            self.record = Some(KeyframeRecord::new(key, backing));
        }
        self.record.as_ref()
    }

    /// Replaces the keyframe with the frame `key`.
    pub fn rotate(&mut self, store: &FrameStore, key: FrameKey) -> Result<()> {
        let backing = store.get(key)?;
        info!("rotating keyframe to frame {}", backing.id.0);
        self.record = Some(KeyframeRecord::new(key, backing));
        Ok(())
    }

    /// The frame backing the keyframe.
    pub fn current_reference<'a>(&self, store: &'a FrameStore) -> Result<&'a Frame> {
        let record = self.record.as_ref().ok_or(Violation::NoKeyframe)?;
        store.get(record.frame)
    }

    /// Checks that the backing frame still has the next feature identity cached by the record.
    pub fn check_consistency(&self, store: &FrameStore) -> Result<()> {
        let record = self.record.as_ref().ok_or(Violation::NoKeyframe)?;
        let actual = store.get(record.frame)?.next_feature_id;
        if record.next_feature_id != actual {
            return Err(Violation::KeyframeCounterMismatch {
                cached: record.next_feature_id,
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Finds the keyframe features continued by features of the frame `current`.
    ///
    /// Each feature of `current` is followed back through its match references one frame at a
    /// time until the keyframe is reached. Tracks that break before reaching the keyframe are not
    /// returned. Every reference is revalidated by identity, and a reference whose identity does
    /// not exist is a violation.
    pub fn correspondences(
        &self,
        store: &FrameStore,
        current: FrameKey,
    ) -> Result<Vec<FeatureMatch<FeatureRef>>> {
        let record = self.record.as_ref().ok_or(Violation::NoKeyframe)?;
        let keyframe_pos = store.position(record.frame).ok_or(Violation::StaleFrame)?;
        let current_pos = store.position(current).ok_or(Violation::StaleFrame)?;
        if current_pos <= keyframe_pos {
            return Ok(vec![]);
        }

        // Frames from the keyframe up to and including the current frame.
        let chain = store.history()[keyframe_pos..=current_pos]
            .iter()
            .map(|&key| store.get(key))
            .collect::<Result<Vec<&Frame>>>()?;
        let (current_frame, older) = match chain.split_last() {
            Some(split) => split,
            None => return Ok(vec![]),
        };

        let mut matches = vec![];
        'features: for (index, feature) in current_frame.features.iter().enumerate() {
            let mut newer = *current_frame;
            let mut ix = index;
            for &older_frame in older.iter().rev() {
                let previous = match newer.features[ix].matched {
                    Some(previous) => previous,
                    None => continue 'features,
                };
                ix = older_frame.resolve(previous)?;
                newer = older_frame;
            }
            let keyframe_feature = FeatureRef {
                id: newer.features[ix].id,
                index: ix,
            };
            let current_feature = FeatureRef {
                id: feature.id,
                index,
            };
            matches.push(FeatureMatch(current_feature, keyframe_feature));
        }
        trace!(
            "current to keyframe matches: {:?}",
            matches.iter().map(|FeatureMatch(c, k)| (c.id.0, k.id.0)).collect_vec()
        );
        Ok(matches)
    }

    /// Rebuilds the keyframe correspondences against the frame `current`.
    pub fn refresh_matches(&mut self, store: &FrameStore, current: FrameKey) -> Result<()> {
        let matches = self.correspondences(store, current)?;
        debug!("keyframe has {} matches into the current frame", matches.len());
        if let Some(record) = self.record.as_mut() {
            record.matches = matches;
        }
        Ok(())
    }
}
