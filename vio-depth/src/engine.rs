use crate::{
    DepthError, ExtrinsicLookup, Feature3D, FeatureId, FeatureRef, Frame, FrameKey, FrameStore,
    KeyframeTracker, LandmarkPools, Rejection, Result, StructureOptimizer, VioSettings,
};
use log::*;
use std::collections::{HashMap, HashSet};
use vio_core::{
    relative_motion, CameraToBody, CameraToCamera, CameraToWorld, FeatureMatch,
    NormalizedKeyPoint, Pose, TriangulatorRelative, WorldPoint,
};
use vio_geom::{triangulation::reprojection_error, DltTriangulator, GeomError, OptimalTriangulator};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A triangulation against the keyframe that passed the acceptance checks.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Triangulated {
    pub point: WorldPoint,
    /// Depth of the point in the current frame.
    pub depth: f64,
    /// Reprojection error against the uncorrected observations.
    pub residual: f64,
    /// Variance of `depth` implied by the residual and the baseline.
    pub variance: f64,
}

/// The outcome of a depth pass for one feature of the current frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeatureDepth {
    pub feature: FeatureRef,
    pub depth: f64,
    pub variance: f64,
    /// Whether the depth was carried over from the previous frame.
    pub propagated: bool,
    /// Set when the feature was matched into the keyframe and triangulation was attempted.
    pub triangulation: Option<std::result::Result<Triangulated, Rejection>>,
}

impl FeatureDepth {
    /// The reprojection error of the triangulation, if one got far enough to compute it.
    pub fn residual(&self) -> Option<f64> {
        match self.triangulation {
            Some(Ok(Triangulated { residual, .. }))
            | Some(Err(Rejection::ReprojectionError { residual })) => Some(residual),
            _ => None,
        }
    }

    fn fuse(&mut self, depth: f64, variance: f64) {
        let fused = 1.0 / (1.0 / self.variance + 1.0 / variance);
        self.depth = fused * (self.depth / self.variance + depth / variance);
        self.variance = fused;
    }
}

/// Everything one call to [`DepthEngine::propagate`] changed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct DepthReport {
    /// The frame that was processed.
    pub frame: FrameKey,
    /// Every feature whose depth was updated, in frame order. Unmatched features are absent.
    pub features: Vec<FeatureDepth>,
    /// The keyframe was too close to triangulate against.
    pub triangulation_skipped: bool,
    /// The camera mounting pose could not be looked up and the last good one was used.
    pub stale_extrinsic: bool,
    pub landmarks_created: usize,
    pub landmarks_updated: usize,
    pub landmarks_retired: usize,
}

impl DepthReport {
    fn new(frame: FrameKey) -> Self {
        Self {
            frame,
            features: vec![],
            triangulation_skipped: false,
            stale_extrinsic: false,
            landmarks_created: 0,
            landmarks_updated: 0,
            landmarks_retired: 0,
        }
    }

    /// The accepted triangulations, keyed by the current frame feature they came from.
    ///
    /// Each carries the world point with its reprojection residual and depth variance.
    pub fn candidates(&self) -> impl Iterator<Item = (FeatureId, Triangulated)> + '_ {
        self.features
            .iter()
            .filter_map(|feature| match feature.triangulation {
                Some(Ok(triangulated)) => Some((feature.feature.id, triangulated)),
                _ => None,
            })
    }

    /// The number of triangulations that were accepted.
    pub fn accepted(&self) -> usize {
        self.candidates().count()
    }

    /// The number of triangulations that were rejected.
    pub fn rejected(&self) -> usize {
        self.features
            .iter()
            .filter(|feature| matches!(feature.triangulation, Some(Err(_))))
            .count()
    }
}

/// The result of [`DepthEngine::optimize_structure`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructureReport {
    /// The number of active landmarks that were moved.
    pub refined: usize,
    /// A refined pose for the keyframe, which is left to the caller to feed back to the filter.
    pub reference_pose: Option<CameraToWorld>,
}

/// The changes of one pass, computed before anything is applied.
struct Pass {
    report: DepthReport,
    keyframe: KeyframeTracker,
    landmarks: Option<(Vec<Feature3D>, Vec<Feature3D>)>,
}

/// Owns the frame history, keyframe and landmarks and propagates feature depths between them.
///
/// Each call to [`DepthEngine::propagate`] after a frame is inserted
///
/// 1. carries the depth of every feature continued from the previous frame through the camera
///    motion into the current frame,
/// 2. triangulates every feature that is also tracked back to the keyframe and fuses the
///    triangulated depth with the carried depth by inverse variance,
/// 3. re-associates, updates, creates and retires landmarks.
///
/// A pass either succeeds completely or changes nothing.
pub struct DepthEngine<L, T = OptimalTriangulator> {
    settings: VioSettings,
    lookup: L,
    triangulator: T,
    frames: FrameStore,
    keyframe: KeyframeTracker,
    landmarks: LandmarkPools,
    /// Last successfully looked up camera mounting pose.
    extrinsic: CameraToBody,
}

impl<L> DepthEngine<L>
where
    L: ExtrinsicLookup,
{
    /// Creates an engine that triangulates with an [`OptimalTriangulator`] configured from the
    /// settings.
    pub fn new(settings: VioSettings, lookup: L) -> Self {
        let triangulator = OptimalTriangulator::new().dlt(
            DltTriangulator::new()
                .epsilon(settings.svd_epsilon)
                .max_iterations(settings.svd_max_iterations),
        );
        Self::with_triangulator(settings, lookup, triangulator)
    }
}

impl<L, T> DepthEngine<L, T>
where
    L: ExtrinsicLookup,
    T: TriangulatorRelative<Error = GeomError>,
{
    pub fn with_triangulator(settings: VioSettings, lookup: L, triangulator: T) -> Self {
        Self {
            settings,
            lookup,
            triangulator,
            frames: FrameStore::new(),
            keyframe: KeyframeTracker::new(),
            landmarks: LandmarkPools::new(),
            extrinsic: CameraToBody::identity(),
        }
    }

    pub fn settings(&self) -> &VioSettings {
        &self.settings
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn frame(&self, key: FrameKey) -> Result<&Frame> {
        self.frames.get(key)
    }

    pub fn keyframe(&self) -> &KeyframeTracker {
        &self.keyframe
    }

    pub fn keyframe_mut(&mut self) -> &mut KeyframeTracker {
        &mut self.keyframe
    }

    pub fn landmarks(&self) -> &LandmarkPools {
        &self.landmarks
    }

    /// The camera mounting pose used by the last pass.
    pub fn extrinsic(&self) -> CameraToBody {
        self.extrinsic
    }

    /// Moves the keyframe to the frame `key`.
    pub fn rotate_keyframe(&mut self, key: FrameKey) -> Result<()> {
        self.keyframe.rotate(&self.frames, key)
    }

    /// Validates the frame against the history and appends it.
    pub fn insert_frame(&mut self, frame: Frame) -> Result<FrameKey> {
        let previous = match self.frames.latest() {
            Some(key) => Some(self.frames.get(key)?),
            None => None,
        };
        frame.validate(previous)?;
        debug!(
            "inserting frame {} with {} features",
            frame.id.0,
            frame.features.len()
        );
        Ok(self.frames.insert(frame))
    }

    /// Inserts the frame and runs a depth pass on it.
    pub fn process(&mut self, frame: Frame) -> Result<DepthReport> {
        self.insert_frame(frame)?;
        self.propagate()
    }

    /// Runs a depth pass on the most recently inserted frame.
    pub fn propagate(&mut self) -> Result<DepthReport> {
        let current = self.frames.latest().ok_or(DepthError::NoFrames)?;
        let timestamp = self.frames.get(current)?.state.timestamp;
        let (extrinsic, stale_extrinsic) = self.resolve_extrinsic(timestamp);

        let Pass {
            mut report,
            keyframe,
            landmarks,
        } = self.plan(current, extrinsic)?;
        report.stale_extrinsic = stale_extrinsic;

        // Nothing below can fail.
        if let Ok(frame) = self.frames.get_mut(current) {
            for estimate in &report.features {
                if let Some(feature) = frame.features.get_mut(estimate.feature.index) {
                    feature.depth = estimate.depth;
                    feature.depth_variance = estimate.variance;
                }
            }
        }
        self.keyframe = keyframe;
        if let Some((active, retired)) = landmarks {
            self.landmarks.replace_active(active, retired);
        }
        self.extrinsic = extrinsic;

        info!(
            "updated {} feature depths with {} accepted and {} rejected triangulations",
            report.features.len(),
            report.accepted(),
            report.rejected()
        );
        info!(
            "landmarks: {} active, {} inactive ({} created, {} updated, {} retired)",
            self.landmarks.active().len(),
            self.landmarks.inactive().len(),
            report.landmarks_created,
            report.landmarks_updated,
            report.landmarks_retired
        );
        Ok(report)
    }

    /// Hands the keyframe and active landmarks to the optimizer and applies the refined
    /// landmark positions.
    pub fn optimize_structure<O>(&mut self, optimizer: &mut O) -> Result<StructureReport>
    where
        O: StructureOptimizer,
    {
        let reference = self.keyframe.current_reference(&self.frames)?;
        let structure = optimizer.optimize(reference, self.landmarks.active());
        let positions: HashMap<FeatureId, WorldPoint> = structure.landmarks.into_iter().collect();
        let mut refined = 0;
        for landmark in self.landmarks.active_mut() {
            if let Some(&position) = positions.get(&landmark.feature.id) {
                landmark.position = position;
                refined += 1;
            }
        }
        info!("optimizer refined {} landmarks", refined);
        Ok(StructureReport {
            refined,
            reference_pose: structure.reference_pose,
        })
    }

    fn resolve_extrinsic(&self, timestamp: f64) -> (CameraToBody, bool) {
        match self.lookup.lookup(
            &self.settings.camera_frame,
            &self.settings.body_frame,
            timestamp,
        ) {
            Ok(extrinsic) => (extrinsic, false),
            Err(e) => {
                warn!("{}; reusing the last camera mounting pose", e);
                (self.extrinsic, true)
            }
        }
    }

    fn plan(&self, current_key: FrameKey, extrinsic: CameraToBody) -> Result<Pass> {
        let current = self.frames.get(current_key)?;
        let mut report = DepthReport::new(current_key);
        let mut keyframe = self.keyframe.clone();

        let previous_key = match self.frames.previous() {
            Some(key) => key,
            None => {
                debug!("frame {} has no predecessor", current.id.0);
                return Ok(Pass {
                    report,
                    keyframe,
                    landmarks: None,
                });
            }
        };
        let previous = self.frames.get(previous_key)?;

        let current_pose = current.camera_pose(extrinsic);
        let last_to_current = relative_motion(current_pose, previous.camera_pose(extrinsic));

        // Aligned with the features of the current frame.
        let mut estimates: Vec<Option<FeatureDepth>> = vec![None; current.features.len()];
        for (index, feature) in current.features.iter().enumerate() {
            let matched = match feature.matched {
                Some(matched) => matched,
                None => continue,
            };
            let last = &previous.features[previous.resolve(matched)?];
            let depth = match last_to_current.transform(last.camera_point()).depth() {
                Some(depth) => depth,
                None => continue,
            };
            trace!(
                "feature {} depth {} -> {}",
                feature.id.0,
                last.depth,
                depth
            );
            estimates[index] = Some(FeatureDepth {
                feature: FeatureRef {
                    id: feature.id,
                    index,
                },
                depth,
                variance: last.depth_variance,
                propagated: true,
                triangulation: None,
            });
        }

        if keyframe.ensure_initialized(&self.frames).is_some() {
            keyframe.check_consistency(&self.frames)?;
            keyframe.refresh_matches(&self.frames, current_key)?;
            let reference = keyframe.current_reference(&self.frames)?;
            let current_to_keyframe = relative_motion(reference.camera_pose(extrinsic), current_pose);
            let baseline = current_to_keyframe.baseline();
            let matches = keyframe
                .record()
                .map(|record| record.matches.as_slice())
                .unwrap_or(&[]);
            if matches.is_empty() {
                debug!("no features are tracked back to the keyframe");
            } else if baseline < self.settings.min_keyframe_baseline {
                info!(
                    "keyframe baseline {} is below {}, skipping {} triangulations",
                    baseline,
                    self.settings.min_keyframe_baseline,
                    matches.len()
                );
                report.triangulation_skipped = true;
            } else {
                for &FeatureMatch(current_ref, keyframe_ref) in matches {
                    let feature = current.feature_at(current_ref)?;
                    let keyframe_feature = reference.feature_at(keyframe_ref)?;
                    let outcome = self.triangulate(
                        current_to_keyframe,
                        FeatureMatch(feature.normalized, keyframe_feature.normalized),
                        current_pose,
                        baseline,
                    );
                    if let Err(rejection) = &outcome {
                        trace!("feature {} rejected: {}", feature.id.0, rejection);
                    }
                    let estimate = estimates[current_ref.index].get_or_insert_with(|| FeatureDepth {
                        feature: current_ref,
                        depth: feature.depth,
                        variance: feature.depth_variance,
                        propagated: false,
                        triangulation: None,
                    });
                    if let Ok(triangulated) = &outcome {
                        estimate.fuse(triangulated.depth, triangulated.variance);
                    }
                    estimate.triangulation = Some(outcome);
                }
            }
        }

        report.features = estimates.into_iter().flatten().collect();
        let landmarks = self.associate_landmarks(current_key, current, previous_key, &mut report);
        Ok(Pass {
            report,
            keyframe,
            landmarks: Some(landmarks),
        })
    }

    fn triangulate(
        &self,
        current_to_keyframe: CameraToCamera,
        FeatureMatch(current, keyframe): FeatureMatch<NormalizedKeyPoint>,
        current_pose: CameraToWorld,
        baseline: f64,
    ) -> std::result::Result<Triangulated, Rejection> {
        let point = self
            .triangulator
            .triangulate_relative(current_to_keyframe, current, keyframe)
            .map_err(Rejection::Degenerate)?;
        let depth = point
            .depth()
            .ok_or(Rejection::Degenerate(GeomError::PointAtInfinity))?;
        if !(depth > self.settings.min_triangulation_depth) {
            return Err(Rejection::NonPositiveDepth { depth });
        }
        let residual = reprojection_error(
            &CameraToCamera::identity().projection_matrix(),
            &current_to_keyframe.projection_matrix(),
            point,
            FeatureMatch(current, keyframe),
        );
        if !(residual < self.settings.max_reprojection_error) {
            return Err(Rejection::ReprojectionError { residual });
        }
        let sigma = residual.max(self.settings.observation_noise);
        let variance = (depth * depth * sigma / baseline).powi(2);
        Ok(Triangulated {
            point: current_pose.transform(point),
            depth,
            residual,
            variance,
        })
    }

    /// Computes the new active pool and the landmarks to retire.
    fn associate_landmarks(
        &self,
        current_key: FrameKey,
        current: &Frame,
        previous_key: FrameKey,
        report: &mut DepthReport,
    ) -> (Vec<Feature3D>, Vec<Feature3D>) {
        let accepted: HashMap<usize, Triangulated> = report
            .features
            .iter()
            .filter_map(|estimate| match estimate.triangulation {
                Some(Ok(triangulated)) => Some((estimate.feature.index, triangulated)),
                _ => None,
            })
            .collect();
        // Maps the identities of previous frame features to the current features continuing them.
        let continued: HashMap<FeatureId, usize> = current
            .features
            .iter()
            .enumerate()
            .filter_map(|(ix, feature)| feature.matched.map(|matched| (matched.id, ix)))
            .collect();

        let mut claimed = HashSet::new();
        let mut active = vec![];
        let mut retired = vec![];
        for landmark in self.landmarks.active() {
            if landmark.frame == current_key {
                // Already associated by an earlier pass over this frame.
                match current.resolve(landmark.feature) {
                    Ok(ix) if claimed.insert(ix) => active.push(landmark.clone()),
                    _ => retired.push(landmark.clone()),
                }
                continue;
            }
            let index = if landmark.frame == previous_key {
                continued.get(&landmark.feature.id).copied()
            } else {
                None
            };
            let reference = index.and_then(|ix| current.reference(ix));
            match reference {
                Some(reference) if claimed.insert(reference.index) => {
                    let mut landmark = landmark.clone();
                    landmark.reassociate(current_key, reference);
                    if let Some(triangulated) = accepted.get(&reference.index) {
                        landmark.update(triangulated.point, triangulated.residual);
                        report.landmarks_updated += 1;
                    }
                    active.push(landmark);
                }
                _ => retired.push(landmark.clone()),
            }
        }

        for estimate in &report.features {
            if let Some(Ok(triangulated)) = estimate.triangulation {
                if !claimed.contains(&estimate.feature.index) {
                    active.push(Feature3D::new(
                        triangulated.point,
                        triangulated.residual,
                        current_key,
                        estimate.feature,
                    ));
                    report.landmarks_created += 1;
                }
            }
        }
        report.landmarks_retired = retired.len();
        (active, retired)
    }
}
