//! Webcam access for the live preview and for one-shot snapshots.
//!
//! - Discovery over (index, backend) pairs via [`probe`]
//! - Live preview via [`CameraManager`] with its [`FrameCache`]
//! - One-shot JPEG capture via [`SnapshotCapture`]
//! - Device enumeration via [`list_devices`]

mod device;
mod frame_cache;
mod frame_utils;
mod manager;
mod prober;
mod snapshot;
mod types;

pub use device::{
    list_devices, read_with_retries, CameraBackend, CameraDevice, NativeCamera,
    NativeCameraBackend,
};
pub use frame_cache::FrameCache;
pub use frame_utils::{encode_jpeg, fit_to_resolution, placeholder_frame, PLACEHOLDER_TEXT};
pub use manager::CameraManager;
pub use prober::{candidates, probe};
pub use snapshot::SnapshotCapture;
pub use types::{
    Backend, CameraError, CameraInfo, CameraSettings, DeviceIdentity, Frame, Resolution,
};
