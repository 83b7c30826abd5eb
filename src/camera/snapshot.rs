//! One-shot JPEG capture for visual questions.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::device::{read_with_retries, CameraBackend, NativeCameraBackend};
use super::frame_utils::encode_jpeg;
use super::prober::probe;
use super::types::{CameraError, CameraSettings, DeviceIdentity};

/// Captures single frames independently of the live preview.
///
/// Each capture opens its own handle and releases it before returning, so it
/// never shares a handle with [`CameraManager`](super::CameraManager). The
/// device identity found by the first successful probe is kept for the life
/// of this value, even if the camera later moves to another index.
pub struct SnapshotCapture<B: CameraBackend = NativeCameraBackend> {
    backend: B,
    settings: CameraSettings,
    identity: Mutex<Option<DeviceIdentity>>,
}

impl SnapshotCapture<NativeCameraBackend> {
    pub fn native(settings: CameraSettings) -> Self {
        Self::new(NativeCameraBackend, settings)
    }
}

impl<B: CameraBackend> SnapshotCapture<B> {
    pub fn new(backend: B, settings: CameraSettings) -> Self {
        Self {
            backend,
            settings,
            identity: Mutex::new(None),
        }
    }

    /// The memoized identity, once a probe has succeeded.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture one frame and return it as JPEG bytes.
    ///
    /// # Errors
    /// * `CameraError::DeviceNotFound` - no candidate opened on first use
    /// * `CameraError::OpenFailed` - the memoized device could not be reopened
    /// * `CameraError::ReadFailure` - every read attempt failed
    /// * `CameraError::EncodeFailure` - JPEG compression failed
    pub fn capture_image(&self) -> Result<Vec<u8>, CameraError> {
        let started = Instant::now();
        let identity = self.resolve_identity()?;

        // The handle is released when `device` goes out of scope, on every path
        let mut device = self.backend.open(identity, &self.settings).map_err(|e| {
            log::error!("Failed to open cached webcam {}: {}", identity, e);
            e
        })?;

        let frame = read_with_retries(&mut device, self.settings.read_attempts).map_err(|e| {
            log::error!("Failed to capture frame after retries: {}", e);
            e
        })?;

        let jpeg = encode_jpeg(&frame, self.settings.jpeg_quality).map_err(|e| {
            log::error!("Failed to encode frame: {}", e);
            e
        })?;

        log::info!(
            "capture_image took {:.2} seconds",
            started.elapsed().as_secs_f64()
        );
        Ok(jpeg)
    }

    fn resolve_identity(&self) -> Result<DeviceIdentity, CameraError> {
        // Held across the probe so concurrent first captures probe once
        let mut memo = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(identity) = *memo {
            return Ok(identity);
        }

        let (identity, trial) = probe(&self.backend, &self.settings)?;
        drop(trial);
        *memo = Some(identity);
        Ok(identity)
    }
}
