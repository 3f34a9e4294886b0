use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use log::{debug, info};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::config::{Config, constants};
use crate::error::CaptureError;

/// Still-capture interface used by the detection loop.
///
/// Implementations own their camera handle exclusively; nothing outside the
/// service may touch it. The trigger timestamp is passed in by the loop so
/// the file name and the logged event share one clock.
pub trait CameraService {
    /// Take one still image, write it to disk, and return its path.
    ///
    /// Failures are reported to the caller and never retried internally.
    fn capture(&mut self, at: DateTime<Local>) -> Result<PathBuf, CaptureError>;

    /// Release the camera handle. Invoked on graceful termination.
    fn shutdown(&mut self);
}

/// File name for a capture taken at `at`.
///
/// Timestamp granularity is one second, so two triggers within the same
/// second would collide. The detection loop's cooldown (validated to be at
/// least one second) is what prevents this in normal operation; it is not
/// separately guarded here.
pub fn image_filename(at: DateTime<Local>) -> String {
    format!("motion_{}.jpg", at.format("%Y%m%d_%H%M%S"))
}

/// Camera capture service backed by a V4L2 device.
///
/// The device is opened and configured once and kept open for the lifetime
/// of the process; re-initializing per capture is the dominant source of
/// capture latency. Frames are requested as MJPEG so the payload can be
/// written out as a JPEG file after validation.
pub struct V4lCamera {
    device: Option<Device>,
    device_path: String,
    save_dir: PathBuf,
}

impl V4lCamera {
    /// Open and configure the camera described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::CameraUnavailable`] if the device cannot be
    /// opened, the resolution cannot be negotiated, or the device does not
    /// provide MJPEG frames.
    pub fn open(config: &Config) -> Result<Self, CaptureError> {
        let device_path = format!("/dev/video{}", config.camera_device);

        let device =
            Device::new(config.camera_device).map_err(|e| CaptureError::CameraUnavailable {
                device: device_path.clone(),
                reason: e.to_string(),
            })?;

        let mut format = device.format().map_err(|e| CaptureError::CameraUnavailable {
            device: device_path.clone(),
            reason: e.to_string(),
        })?;
        format.width = config.image_width;
        format.height = config.image_height;
        format.fourcc = FourCC::new(b"MJPG");

        let format = device
            .set_format(&format)
            .map_err(|e| CaptureError::CameraUnavailable {
                device: device_path.clone(),
                reason: e.to_string(),
            })?;

        if format.fourcc != FourCC::new(b"MJPG") {
            return Err(CaptureError::CameraUnavailable {
                device: device_path,
                reason: format!("device does not provide MJPG frames (got {})", format.fourcc),
            });
        }

        info!(
            "Camera {} initialized at {}x{}",
            device_path, format.width, format.height
        );

        Ok(Self {
            device: Some(device),
            device_path,
            save_dir: config.save_dir.clone(),
        })
    }

    fn grab_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CaptureError::CameraUnavailable {
                device: self.device_path.clone(),
                reason: "camera has been shut down".to_string(),
            })?;

        let mut stream = Stream::with_buffers(device, Type::VideoCapture, constants::CAPTURE_BUFFERS)
            .map_err(|e| CaptureError::CameraUnavailable {
                device: self.device_path.clone(),
                reason: e.to_string(),
            })?;

        // The device stays open across triggers; only the stream is
        // per-capture. Discard the first frames so exposure settles.
        for _ in 0..constants::CAMERA_WARMUP_FRAMES {
            stream.next().map_err(|e| CaptureError::CameraUnavailable {
                device: self.device_path.clone(),
                reason: e.to_string(),
            })?;
        }

        let (buffer, meta) = stream.next().map_err(|e| CaptureError::CameraUnavailable {
            device: self.device_path.clone(),
            reason: e.to_string(),
        })?;

        let used = meta.bytesused as usize;
        let frame = if used > 0 && used <= buffer.len() {
            buffer[..used].to_vec()
        } else {
            buffer.to_vec()
        };

        if frame.is_empty() {
            return Err(CaptureError::InvalidFrame {
                reason: "camera returned an empty frame".to_string(),
            });
        }

        Ok(frame)
    }
}

impl CameraService for V4lCamera {
    fn capture(&mut self, at: DateTime<Local>) -> Result<PathBuf, CaptureError> {
        let frame = self.grab_frame()?;

        // Reject truncated or corrupt payloads before they reach disk and
        // the dispatcher.
        image::load_from_memory(&frame).map_err(|e| CaptureError::InvalidFrame {
            reason: e.to_string(),
        })?;

        let path = self.save_dir.join(image_filename(at));
        fs::write(&path, &frame).map_err(|e| CaptureError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!("Image captured: {}", path.display());
        Ok(path)
    }

    fn shutdown(&mut self) {
        if self.device.take().is_some() {
            info!("Camera {} released", self.device_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_derives_from_timestamp_with_second_resolution() {
        let at = Local.with_ymd_and_hms(2024, 6, 1, 8, 30, 5).unwrap();
        assert_eq!(image_filename(at), "motion_20240601_083005.jpg");
    }

    #[test]
    fn filenames_collide_only_within_the_same_second() {
        let first = Local.with_ymd_and_hms(2024, 6, 1, 8, 30, 5).unwrap();
        let second = Local.with_ymd_and_hms(2024, 6, 1, 8, 30, 6).unwrap();
        assert_ne!(image_filename(first), image_filename(second));
    }
}
