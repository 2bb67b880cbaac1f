use crate::LookupError;
use vio_core::CameraToBody;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Resolves the camera mounting pose relative to the body at some time.
///
/// This is implemented for closures taking `(camera_frame, body_frame, timestamp)`.
pub trait ExtrinsicLookup {
    fn lookup(
        &self,
        camera_frame: &str,
        body_frame: &str,
        timestamp: f64,
    ) -> Result<CameraToBody, LookupError>;
}

impl<F> ExtrinsicLookup for F
where
    F: Fn(&str, &str, f64) -> Result<CameraToBody, LookupError>,
{
    fn lookup(
        &self,
        camera_frame: &str,
        body_frame: &str,
        timestamp: f64,
    ) -> Result<CameraToBody, LookupError> {
        self(camera_frame, body_frame, timestamp)
    }
}

/// A fixed calibration that never changes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct StaticExtrinsic(pub CameraToBody);

impl ExtrinsicLookup for StaticExtrinsic {
    fn lookup(&self, _: &str, _: &str, _: f64) -> Result<CameraToBody, LookupError> {
        Ok(self.0)
    }
}
