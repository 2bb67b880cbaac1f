#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The settings for the depth propagation process.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct VioSettings {
    /// The name of the camera frame used when looking up the camera mounting transform
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_camera_frame"))]
    pub camera_frame: String,
    /// The name of the body (center of mass) frame used when looking up the camera mounting transform
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_body_frame"))]
    pub body_frame: String,
    /// The depth given to a feature the first time it is seen
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_default_feature_depth")
    )]
    pub default_feature_depth: f64,
    /// The depth variance given to a feature the first time it is seen
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_default_depth_variance")
    )]
    pub default_depth_variance: f64,
    /// The depth a triangulated point must exceed to be accepted
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_min_triangulation_depth")
    )]
    pub min_triangulation_depth: f64,
    /// The reprojection error (in normalized image coordinates) a triangulated point must stay below to be accepted
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_max_reprojection_error")
    )]
    pub max_reprojection_error: f64,
    /// The standard deviation of a keypoint observation in normalized image coordinates.
    /// The reprojection error of a triangulation is never trusted to be better than this.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_observation_noise")
    )]
    pub observation_noise: f64,
    /// The minimum distance between the keyframe and current optical centers needed to triangulate
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_min_keyframe_baseline")
    )]
    pub min_keyframe_baseline: f64,
    /// The epsilon used in the triangulation singular value decomposition
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_svd_epsilon"))]
    pub svd_epsilon: f64,
    /// The maximum iterations of the triangulation singular value decomposition
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_svd_max_iterations")
    )]
    pub svd_max_iterations: usize,
}

impl Default for VioSettings {
    fn default() -> Self {
        Self {
            camera_frame: default_camera_frame(),
            body_frame: default_body_frame(),
            default_feature_depth: default_default_feature_depth(),
            default_depth_variance: default_default_depth_variance(),
            min_triangulation_depth: default_min_triangulation_depth(),
            max_reprojection_error: default_max_reprojection_error(),
            observation_noise: default_observation_noise(),
            min_keyframe_baseline: default_min_keyframe_baseline(),
            svd_epsilon: default_svd_epsilon(),
            svd_max_iterations: default_svd_max_iterations(),
        }
    }
}

fn default_camera_frame() -> String {
    "camera".to_owned()
}

fn default_body_frame() -> String {
    "base_link".to_owned()
}

fn default_default_feature_depth() -> f64 {
    1.0
}

fn default_default_depth_variance() -> f64 {
    1000.0
}

fn default_min_triangulation_depth() -> f64 {
    0.1
}

fn default_max_reprojection_error() -> f64 {
    0.01
}

fn default_observation_noise() -> f64 {
    0.001
}

fn default_min_keyframe_baseline() -> f64 {
    0.05
}

fn default_svd_epsilon() -> f64 {
    1e-12
}

fn default_svd_max_iterations() -> usize {
    1000
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_describe_an_uncertain_first_guess() {
        let settings = VioSettings::default();
        assert!(settings.default_depth_variance > settings.default_feature_depth);
        assert!(settings.min_triangulation_depth > 0.0);
        assert!(settings.observation_noise < settings.max_reprojection_error);
    }

    #[cfg(feature = "serde-serialize")]
    #[test]
    fn missing_fields_take_their_defaults() {
        let settings: VioSettings =
            serde_json::from_str(r#"{ "camera_frame": "left", "min_keyframe_baseline": 0.2 }"#)
                .unwrap();
        assert_eq!(settings.camera_frame, "left");
        assert_eq!(settings.min_keyframe_baseline, 0.2);
        assert_eq!(
            settings,
            VioSettings {
                camera_frame: "left".to_owned(),
                min_keyframe_baseline: 0.2,
                ..Default::default()
            }
        );
    }
}
