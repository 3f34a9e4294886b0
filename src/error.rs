use std::fmt;

/// Custom error types for the Motion Sentry appliance.
///
/// This module defines specific error types for each subsystem, split along
/// the fatal/recoverable boundary the detection loop relies on: a busy GPIO
/// line may be recovered exactly once, capture and dispatch failures are
/// contained to a single detection event, and configuration errors always
/// abort startup.

/// Main error type for Motion Sentry operations.
#[derive(Debug)]
pub enum SentryError {
    /// Errors raised by the GPIO line controller.
    Gpio(GpioError),

    /// Errors raised by the camera capture service.
    Capture(CaptureError),

    /// Errors raised by the alert dispatcher.
    Dispatch(DispatchError),

    /// Configuration and startup errors.
    Config(ConfigError),
}

/// Errors specific to GPIO line ownership and I/O.
#[derive(Debug)]
pub enum GpioError {
    /// The line is held by another owner, typically a stale process.
    LineBusy { pin: u8 },

    /// The GPIO subsystem itself could not be opened.
    InitFailed { reason: String },

    /// A read or write on an acquired line failed.
    Io { pin: u8, reason: String },

    /// An operation was attempted through a handle that is not held.
    NotAcquired { pin: u8 },

    /// A read was requested on an output line, or a write on an input line.
    WrongDirection { pin: u8 },
}

/// Errors specific to camera capture operations.
#[derive(Debug)]
pub enum CaptureError {
    /// The camera device could not be opened or configured.
    CameraUnavailable { device: String, reason: String },

    /// The camera produced a frame that is not a decodable image.
    InvalidFrame { reason: String },

    /// The captured image could not be written to disk.
    WriteFailed { path: String, reason: String },
}

/// Errors specific to alert dispatch.
#[derive(Debug)]
pub enum DispatchError {
    /// The sender or recipient address could not be parsed.
    InvalidAddress { address: String, reason: String },

    /// The image attachment could not be read from disk.
    AttachmentReadFailed { path: String, reason: String },

    /// The notification message could not be assembled.
    ComposeFailed { reason: String },

    /// The send attempt was rejected by or could not reach the relay.
    SendFailed { relay: String, reason: String },
}

/// Errors related to configuration and application startup.
#[derive(Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    MissingEnvVar { var_name: String },

    /// A value was present but could not be parsed or is out of range.
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

// Implement Display trait for user-friendly error messages
impl fmt::Display for SentryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentryError::Gpio(e) => write!(f, "GPIO error: {}", e),
            SentryError::Capture(e) => write!(f, "Capture error: {}", e),
            SentryError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
            SentryError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioError::LineBusy { pin } => {
                write!(f, "GPIO {} is busy (held by another process)", pin)
            }
            GpioError::InitFailed { reason } => {
                write!(f, "Failed to open the GPIO subsystem: {}", reason)
            }
            GpioError::Io { pin, reason } => {
                write!(f, "I/O failure on GPIO {}: {}", pin, reason)
            }
            GpioError::NotAcquired { pin } => {
                write!(f, "GPIO {} is not acquired", pin)
            }
            GpioError::WrongDirection { pin } => {
                write!(f, "Operation does not match the direction of GPIO {}", pin)
            }
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::CameraUnavailable { device, reason } => {
                write!(f, "Camera '{}' is unavailable: {}", device, reason)
            }
            CaptureError::InvalidFrame { reason } => {
                write!(f, "Camera produced an invalid frame: {}", reason)
            }
            CaptureError::WriteFailed { path, reason } => {
                write!(f, "Failed to write image to '{}': {}", path, reason)
            }
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::InvalidAddress { address, reason } => {
                write!(f, "Invalid email address '{}': {}", address, reason)
            }
            DispatchError::AttachmentReadFailed { path, reason } => {
                write!(f, "Failed to read attachment '{}': {}", path, reason)
            }
            DispatchError::ComposeFailed { reason } => {
                write!(f, "Failed to compose alert message: {}", reason)
            }
            DispatchError::SendFailed { relay, reason } => {
                write!(f, "Failed to send alert via '{}': {}", relay, reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEnvVar { var_name } => {
                write!(f, "Required environment variable '{}' is not set", var_name)
            }
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, reason
                )
            }
        }
    }
}

// Implement std::error::Error trait
impl std::error::Error for SentryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SentryError::Gpio(e) => Some(e),
            SentryError::Capture(e) => Some(e),
            SentryError::Dispatch(e) => Some(e),
            SentryError::Config(e) => Some(e),
        }
    }
}

impl std::error::Error for GpioError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for DispatchError {}
impl std::error::Error for ConfigError {}

// Conversion traits for easy error propagation
impl From<GpioError> for SentryError {
    fn from(err: GpioError) -> Self {
        SentryError::Gpio(err)
    }
}

impl From<CaptureError> for SentryError {
    fn from(err: CaptureError) -> Self {
        SentryError::Capture(err)
    }
}

impl From<DispatchError> for SentryError {
    fn from(err: DispatchError) -> Self {
        SentryError::Dispatch(err)
    }
}

impl From<ConfigError> for SentryError {
    fn from(err: ConfigError) -> Self {
        SentryError::Config(err)
    }
}
