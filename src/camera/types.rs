//! Camera types and data structures.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Information about an available camera device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)
    }
}

/// Camera resolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Preview resolution (320x240) used by both the live feed and snapshots
    pub const PREVIEW: Resolution = Resolution {
        width: 320,
        height: 240,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::PREVIEW
    }
}

/// Driver API used to talk to a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Let the camera library pick
    Auto,
    /// Windows Media Foundation
    MediaFoundation,
    /// macOS AVFoundation
    AVFoundation,
    /// Linux Video4Linux2
    Video4Linux,
}

impl Backend {
    /// Backends tried during discovery, platform-native first.
    pub fn defaults() -> Vec<Backend> {
        if cfg!(target_os = "windows") {
            vec![Backend::MediaFoundation, Backend::Auto]
        } else if cfg!(target_os = "macos") {
            vec![Backend::AVFoundation, Backend::Auto]
        } else {
            vec![Backend::Video4Linux, Backend::Auto]
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::MediaFoundation => "msmf",
            Backend::AVFoundation => "avfoundation",
            Backend::Video4Linux => "v4l2",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "any" => Ok(Backend::Auto),
            "msmf" | "mediafoundation" => Ok(Backend::MediaFoundation),
            "avfoundation" | "avf" => Ok(Backend::AVFoundation),
            "v4l2" | "v4l" | "video4linux" => Ok(Backend::Video4Linux),
            other => Err(format!(
                "Unknown camera backend '{}'. Available backends: auto, msmf, avfoundation, v4l2",
                other
            )),
        }
    }
}

/// The (index, backend) pair identifying one camera among the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub index: u32,
    pub backend: Backend,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index {} via {}", self.index, self.backend)
    }
}

/// A captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data, RGB order, 3 bytes per pixel
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Create a black frame of the given size.
    pub fn black(resolution: Resolution) -> Self {
        let len = resolution.width as usize * resolution.height as usize * Self::BYTES_PER_PIXEL;
        Self {
            data: vec![0; len],
            width: resolution.width,
            height: resolution.height,
            timestamp: Instant::now(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    /// Whether the buffer length matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }
}

/// Settings applied to every camera handle that gets opened.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Capture resolution
    pub resolution: Resolution,
    /// Target FPS (actual may vary)
    pub fps: u32,
    /// Reads attempted before a frame is considered unavailable
    pub read_attempts: u32,
    /// Device indices probed during discovery (0..max_index)
    pub max_index: u32,
    /// Backends probed at each index, in order
    pub backends: Vec<Backend>,
    /// JPEG quality for snapshots (1-100)
    pub jpeg_quality: u8,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            fps: 15,
            read_attempts: 3,
            max_index: 5,
            backends: Backend::defaults(),
            jpeg_quality: 80,
        }
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug)]
pub enum CameraError {
    /// No working (index, backend) pair was found
    DeviceNotFound,
    /// Failed to query camera devices
    QueryFailed(String),
    /// Failed to open a specific device
    OpenFailed(String),
    /// Camera permission denied (macOS)
    PermissionDenied,
    /// Device is open but no frame could be read
    ReadFailure(String),
    /// Frame was captured but could not be compressed
    EncodeFailure(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::DeviceNotFound => {
                write!(f, "No webcam found after trying all indices and backends")
            }
            CameraError::QueryFailed(msg) => write!(f, "Failed to query cameras: {}", msg),
            CameraError::OpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CameraError::PermissionDenied => {
                write!(
                    f,
                    "Camera permission denied. On macOS, grant access in System Settings > Privacy & Security > Camera"
                )
            }
            CameraError::ReadFailure(msg) => write!(f, "Failed to capture frame: {}", msg),
            CameraError::EncodeFailure(msg) => write!(f, "Failed to encode frame: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}
