//! Webcam discovery over candidate (index, backend) pairs.

use super::device::CameraBackend;
use super::types::{Backend, CameraError, CameraSettings, DeviceIdentity};

/// Candidate pairs in probe order: index outer, backend inner.
pub fn candidates(max_index: u32, backends: &[Backend]) -> Vec<DeviceIdentity> {
    (0..max_index)
        .flat_map(|index| {
            backends
                .iter()
                .map(move |&backend| DeviceIdentity { index, backend })
        })
        .collect()
}

/// Find the first candidate that opens.
///
/// Returns the winning identity with its opened trial handle; callers either
/// keep the handle or drop it to release the device. Every failed trial is
/// released before the next attempt. Bounded by `max_index * backends.len()`
/// attempts.
pub fn probe<B: CameraBackend>(
    backend: &B,
    settings: &CameraSettings,
) -> Result<(DeviceIdentity, B::Device), CameraError> {
    for identity in candidates(settings.max_index, &settings.backends) {
        log::info!("Trying webcam {}", identity);
        match backend.open(identity, settings) {
            Ok(device) => {
                log::info!("Webcam initialized: {}", identity);
                return Ok((identity, device));
            }
            Err(e) => log::debug!("Failed to open webcam {}: {}", identity, e),
        }
    }

    log::error!("No webcam found after trying all indices and backends");
    Err(CameraError::DeviceNotFound)
}
