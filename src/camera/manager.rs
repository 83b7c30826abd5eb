//! Streaming camera owned by the live preview.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::device::{read_with_retries, CameraBackend, NativeCameraBackend};
use super::frame_cache::FrameCache;
use super::frame_utils::placeholder_frame;
use super::prober::probe;
use super::types::{CameraError, CameraSettings, DeviceIdentity, Frame};

/// Handle and identity of the streaming camera, guarded together.
struct StreamState<D> {
    device: Option<D>,
    identity: Option<DeviceIdentity>,
}

/// Owns the streaming camera handle and the frame cache behind it.
///
/// At most one handle is open at a time. Every device call (probe, open,
/// read, release) happens under the stream lock, which is held for that call
/// only. `start`, `stop` and `get_frame` never return errors: camera absence
/// is reported through logs and the "No Webcam" placeholder.
pub struct CameraManager<B: CameraBackend = NativeCameraBackend> {
    backend: B,
    settings: CameraSettings,
    running: AtomicBool,
    stream: Mutex<StreamState<B::Device>>,
    cache: FrameCache,
}

impl<B: CameraBackend> std::fmt::Debug for CameraManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraManager")
            .field("settings", &self.settings)
            .field("is_running", &self.is_running())
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

impl CameraManager<NativeCameraBackend> {
    /// Manager for physical cameras.
    pub fn native(settings: CameraSettings) -> Self {
        Self::new(NativeCameraBackend, settings)
    }
}

impl<B: CameraBackend> CameraManager<B> {
    pub fn new(backend: B, settings: CameraSettings) -> Self {
        Self {
            backend,
            settings,
            running: AtomicBool::new(false),
            stream: Mutex::new(StreamState {
                device: None,
                identity: None,
            }),
            cache: FrameCache::new(),
        }
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Whether the preview is supposed to be live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Identity of the streaming camera for the current session, if any.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.lock_stream().identity
    }

    /// Start the preview and return the first frame to show.
    ///
    /// Opens the camera unless a handle is already open. If no device can be
    /// opened or no initial frame can be read, the placeholder is cached and
    /// returned. The running flag stays set either way, so the next
    /// `get_frame` serves whatever the cache holds.
    pub fn start(&self) -> Frame {
        self.running.store(true, Ordering::SeqCst);

        let mut stream = self.lock_stream();
        if stream.device.is_none() {
            if let Err(e) = self.acquire(&mut stream) {
                log::error!("Failed to start webcam: {}", e);
                return self.cache_placeholder();
            }
        }

        let Some(device) = stream.device.as_mut() else {
            return self.cache_placeholder();
        };

        match read_with_retries(device, self.settings.read_attempts) {
            Ok(frame) => {
                self.cache.store(frame.clone());
                frame
            }
            Err(e) => {
                log::error!("Failed to capture initial frame: {}", e);
                self.cache_placeholder()
            }
        }
    }

    /// Stop the preview and release the camera.
    ///
    /// Forgets the session's device identity but keeps the cached frame.
    /// Safe to call repeatedly.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let mut stream = self.lock_stream();
        // Dropping the handle releases the device
        stream.device.take();
        stream.identity = None;
        log::info!("Webcam stopped");
    }

    /// Latest frame for the preview tick.
    ///
    /// Reads a fresh frame while running; otherwise, or when every read
    /// fails, returns the cache unchanged (`None` until anything was cached).
    pub fn get_frame(&self) -> Option<Frame> {
        if !self.is_running() {
            return self.cache.latest();
        }

        let mut stream = self.lock_stream();
        let Some(device) = stream.device.as_mut() else {
            return self.cache.latest();
        };

        match read_with_retries(device, self.settings.read_attempts) {
            Ok(frame) => {
                self.cache.store(frame.clone());
                Some(frame)
            }
            Err(e) => {
                log::warn!("Failed to capture frame: {}", e);
                self.cache.latest()
            }
        }
    }

    /// Probe for a camera and keep the winning handle.
    fn acquire(&self, stream: &mut StreamState<B::Device>) -> Result<(), CameraError> {
        let (identity, device) = probe(&self.backend, &self.settings)?;
        stream.identity = Some(identity);
        stream.device = Some(device);
        Ok(())
    }

    fn cache_placeholder(&self) -> Frame {
        let placeholder = placeholder_frame(self.settings.resolution);
        self.cache.store(placeholder.clone());
        placeholder
    }

    fn lock_stream(&self) -> MutexGuard<'_, StreamState<B::Device>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
