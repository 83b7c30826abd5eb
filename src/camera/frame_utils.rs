//! Frame conversion, resizing, encoding and the "No Webcam" placeholder.

use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, RgbImage};
use nokhwa::pixel_format::RgbFormat;

use super::types::{CameraError, Frame, Resolution};

/// Text stamped onto the placeholder frame.
pub const PLACEHOLDER_TEXT: &str = "No Webcam";

const PLACEHOLDER_ORIGIN: (u32, u32) = (50, 120);
const GLYPH_SCALE: u32 = 3;

/// Convert a nokhwa buffer to our RGB Frame format.
///
/// nokhwa's `decode_image` handles MJPEG, YUYV, NV12 and friends.
/// Returns `None` if the conversion fails (unsupported format or corrupt data).
pub fn convert_to_rgb(buffer: &nokhwa::Buffer) -> Option<Frame> {
    let decoded = buffer.decode_image::<RgbFormat>().ok()?;
    let resolution = buffer.resolution();

    Some(Frame {
        data: decoded.into_raw(),
        width: resolution.width(),
        height: resolution.height(),
        timestamp: Instant::now(),
    })
}

/// Resize a frame to the target resolution if the camera delivered something else.
///
/// Cameras pick the closest supported mode, so 320x240 is a request, not a promise.
pub fn fit_to_resolution(frame: Frame, target: Resolution) -> Option<Frame> {
    if frame.resolution() == target {
        return Some(frame);
    }

    let timestamp = frame.timestamp;
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data)?;
    let resized = imageops::resize(&image, target.width, target.height, FilterType::Triangle);

    Some(Frame {
        data: resized.into_raw(),
        width: target.width,
        height: target.height,
        timestamp,
    })
}

/// Compress a frame as JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CameraError> {
    if !frame.is_well_formed() {
        return Err(CameraError::EncodeFailure(format!(
            "buffer of {} bytes does not match {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        )));
    }

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| CameraError::EncodeFailure(e.to_string()))?;
    Ok(out)
}

/// Solid black frame with the "No Webcam" marker.
pub fn placeholder_frame(resolution: Resolution) -> Frame {
    let mut frame = Frame::black(resolution);
    let (x, baseline) = PLACEHOLDER_ORIGIN;
    let top = baseline.saturating_sub(7 * GLYPH_SCALE);
    draw_label(&mut frame, x, top, PLACEHOLDER_TEXT, [255, 255, 255]);
    frame
}

fn draw_label(frame: &mut Frame, mut x: u32, y: u32, text: &str, color: [u8; 3]) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5u32 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        fill_block(
                            frame,
                            x + col * GLYPH_SCALE,
                            y + row as u32 * GLYPH_SCALE,
                            color,
                        );
                    }
                }
            }
        }
        x += 6 * GLYPH_SCALE;
    }
}

fn fill_block(frame: &mut Frame, left: u32, top: u32, color: [u8; 3]) {
    for py in top..(top + GLYPH_SCALE).min(frame.height) {
        for px in left..(left + GLYPH_SCALE).min(frame.width) {
            let offset =
                (py as usize * frame.width as usize + px as usize) * Frame::BYTES_PER_PIXEL;
            frame.data[offset..offset + 3].copy_from_slice(&color);
        }
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'B' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110,
        ]),
        'C' => Some([
            0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'N' => Some([
            0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'W' => Some([
            0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001,
        ]),
        _ => None,
    }
}
