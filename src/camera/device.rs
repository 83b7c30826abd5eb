//! Camera device seam and the nokhwa-backed implementation.
//!
//! The rest of the camera module only talks to [`CameraBackend`] and
//! [`CameraDevice`], so discovery and frame serving can be exercised with
//! fake devices. Releasing a device is dropping it.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;

use super::frame_utils::{convert_to_rgb, fit_to_resolution};
use super::types::{Backend, CameraError, CameraInfo, CameraSettings, DeviceIdentity, Frame};

/// An opened camera handle.
pub trait CameraDevice: Send {
    /// Read one frame. A failed read leaves the device usable.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Opens camera handles for a given device identity.
pub trait CameraBackend: Send + Sync {
    type Device: CameraDevice;

    /// Open and configure the device. `Ok` means the device reports itself open.
    fn open(
        &self,
        identity: DeviceIdentity,
        settings: &CameraSettings,
    ) -> Result<Self::Device, CameraError>;
}

/// Read until one frame comes back, giving up after `attempts` failures.
///
/// Some backends hand out a blank first frame right after opening.
pub fn read_with_retries<D: CameraDevice + ?Sized>(
    device: &mut D,
    attempts: u32,
) -> Result<Frame, CameraError> {
    let mut last_error = CameraError::ReadFailure("no read attempted".to_string());
    for _ in 0..attempts.max(1) {
        match device.read_frame() {
            Ok(frame) => return Ok(frame),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

/// List all available camera devices on the system.
///
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

/// Physical cameras through nokhwa.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCameraBackend;

impl CameraBackend for NativeCameraBackend {
    type Device = NativeCamera;

    fn open(
        &self,
        identity: DeviceIdentity,
        settings: &CameraSettings,
    ) -> Result<NativeCamera, CameraError> {
        NativeCamera::open(identity, settings.clone())
    }
}

/// Back-off after a failed grab while draining, so a dead device doesn't spin.
const GRAB_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Commands sent to the camera worker thread.
enum DeviceCommand {
    Read,
    Stop,
}

/// A nokhwa camera owned by a dedicated worker thread.
///
/// nokhwa's `Camera` is not `Send` on every platform, so it never leaves the
/// thread that created it. Reads are request/response over channels.
pub struct NativeCamera {
    identity: DeviceIdentity,
    command_tx: Sender<DeviceCommand>,
    frame_rx: Receiver<Result<Frame, CameraError>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for NativeCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCamera")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl NativeCamera {
    fn open(identity: DeviceIdentity, settings: CameraSettings) -> Result<Self, CameraError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::channel();
        let (info_tx, info_rx) = mpsc::channel::<Result<(), CameraError>>();

        let worker = thread::Builder::new()
            .name(format!("camera-{}-{}", identity.index, identity.backend))
            .spawn(move || run_device_worker(identity, settings, command_rx, frame_tx, info_tx))
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        match info_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                identity,
                command_tx,
                frame_rx,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CameraError::OpenFailed(
                    "Camera thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }
}

impl CameraDevice for NativeCamera {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        self.command_tx
            .send(DeviceCommand::Read)
            .map_err(|_| CameraError::ReadFailure("camera thread is gone".to_string()))?;
        self.frame_rx
            .recv()
            .map_err(|_| CameraError::ReadFailure("camera thread is gone".to_string()))?
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        let _ = self.command_tx.send(DeviceCommand::Stop);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        log::debug!("Released webcam {}", self.identity);
    }
}

fn run_device_worker(
    identity: DeviceIdentity,
    settings: CameraSettings,
    commands: Receiver<DeviceCommand>,
    frames: Sender<Result<Frame, CameraError>>,
    info_tx: Sender<Result<(), CameraError>>,
) {
    let mut camera = match open_camera_with_fallback(identity, &settings) {
        Ok(cam) => cam,
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = info_tx.send(Err(CameraError::OpenFailed(e.to_string())));
        return;
    }

    let res = camera.resolution();
    log::debug!(
        "Webcam {} streaming at {}x{} @ {} fps",
        identity,
        res.width(),
        res.height(),
        camera.frame_rate()
    );
    let _ = info_tx.send(Ok(()));

    serve_latest(
        &commands,
        || {
            camera
                .frame()
                .map_err(|e| CameraError::ReadFailure(e.to_string()))
        },
        |grabbed| {
            let result = grabbed.and_then(|raw| {
                convert_to_rgb(&raw)
                    .and_then(|frame| fit_to_resolution(frame, settings.resolution))
                    .ok_or_else(|| CameraError::ReadFailure("undecodable frame".to_string()))
            });
            frames.send(result).is_ok()
        },
    );

    let _ = camera.stop_stream();
}

/// Keep the driver queue drained and answer each `Read` with the newest grab.
///
/// Between commands every available buffer is pulled and only the latest is
/// kept, so the driver never backs up with stale frames. A `Read` with nothing
/// buffered grabs on demand. Decoding happens in `reply`, once per `Read`.
/// Returns when `Stop` arrives, the handle is dropped, or `reply` returns false.
fn serve_latest<T>(
    commands: &Receiver<DeviceCommand>,
    mut grab: impl FnMut() -> Result<T, CameraError>,
    mut reply: impl FnMut(Result<T, CameraError>) -> bool,
) {
    let mut latest: Option<T> = None;

    loop {
        match commands.try_recv() {
            Ok(DeviceCommand::Read) => {
                let result = match latest.take() {
                    Some(buffer) => Ok(buffer),
                    None => grab(),
                };
                if !reply(result) {
                    break;
                }
                continue;
            }
            Ok(DeviceCommand::Stop) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match grab() {
            Ok(buffer) => latest = Some(buffer),
            Err(e) => {
                log::trace!("Dropped a frame while draining: {}", e);
                thread::sleep(GRAB_RETRY_DELAY);
            }
        }
    }
}

fn api_backend(backend: Backend) -> ApiBackend {
    match backend {
        Backend::Auto => ApiBackend::Auto,
        Backend::MediaFoundation => ApiBackend::MediaFoundation,
        Backend::AVFoundation => ApiBackend::AVFoundation,
        Backend::Video4Linux => ApiBackend::Video4Linux,
    }
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(
    identity: DeviceIdentity,
    settings: &CameraSettings,
) -> Result<Camera, CameraError> {
    let resolution =
        nokhwa::utils::Resolution::new(settings.resolution.width, settings.resolution.height);

    // MJPEG and YUYV close to the preview mode first, then whatever the camera prefers
    let format_attempts = [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            resolution,
            NokhwaFrameFormat::MJPEG,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            resolution,
            NokhwaFrameFormat::YUYV,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
    ];

    let mut last_error = None;

    for requested in format_attempts {
        match Camera::with_backend(
            CameraIndex::Index(identity.index),
            requested,
            api_backend(identity.backend),
        ) {
            Ok(cam) => return Ok(cam),
            Err(e) => last_error = Some(e),
        }
    }

    let msg = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no format accepted".to_string());
    let lower = msg.to_lowercase();
    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("authorization")
    {
        Err(CameraError::PermissionDenied)
    } else {
        Err(CameraError::OpenFailed(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_latest_replies_with_newest_grab() {
        let (tx, rx) = mpsc::channel();
        let grab_tx = tx.clone();
        let mut grabbed = 0u32;
        let mut replies = Vec::new();

        serve_latest(
            &rx,
            || {
                grabbed += 1;
                // The preview asks for a frame only after five have queued up
                if grabbed == 5 {
                    grab_tx.send(DeviceCommand::Read).unwrap();
                }
                Ok(grabbed)
            },
            |result| {
                replies.push(result.unwrap());
                tx.send(DeviceCommand::Stop).unwrap();
                true
            },
        );

        assert_eq!(replies, vec![5]);
        assert_eq!(grabbed, 5);
    }

    #[test]
    fn test_serve_latest_grabs_on_demand_when_nothing_buffered() {
        let (tx, rx) = mpsc::channel();
        tx.send(DeviceCommand::Read).unwrap();
        tx.send(DeviceCommand::Stop).unwrap();
        let mut replies = Vec::new();

        serve_latest(&rx, || Ok(7u32), |result| {
            replies.push(result.unwrap());
            true
        });

        assert_eq!(replies, vec![7]);
    }

    #[test]
    fn test_serve_latest_passes_grab_failure_to_reader() {
        let (tx, rx) = mpsc::channel();
        tx.send(DeviceCommand::Read).unwrap();
        tx.send(DeviceCommand::Stop).unwrap();
        let mut failures = 0;

        serve_latest(
            &rx,
            || Err::<u32, _>(CameraError::ReadFailure("timeout".to_string())),
            |result| {
                assert!(matches!(result, Err(CameraError::ReadFailure(_))));
                failures += 1;
                true
            },
        );

        assert_eq!(failures, 1);
    }

    #[test]
    fn test_serve_latest_stops_when_handle_dropped() {
        let (tx, rx) = mpsc::channel::<DeviceCommand>();
        drop(tx);
        let mut grabs = 0;
        serve_latest(
            &rx,
            || {
                grabs += 1;
                Ok(())
            },
            |_| true,
        );
        assert_eq!(grabs, 0);
    }

    #[test]
    fn test_api_backend_mapping() {
        assert!(matches!(api_backend(Backend::Auto), ApiBackend::Auto));
        assert!(matches!(
            api_backend(Backend::Video4Linux),
            ApiBackend::Video4Linux
        ));
        assert!(matches!(
            api_backend(Backend::MediaFoundation),
            ApiBackend::MediaFoundation
        ));
        assert!(matches!(
            api_backend(Backend::AVFoundation),
            ApiBackend::AVFoundation
        ));
    }
}
