//! Motion Sentry - PIR motion detection and email alert appliance.
//!
//! This library provides the detection-to-notification pipeline for a
//! single-board motion alarm: a PIR sensor triggers an image capture and an
//! email notification, with a status LED and a cooldown to avoid alert
//! storms.
//!
//! # Core Components
//!
//! * [`config`] - Immutable configuration loaded from environment variables
//! * [`gpio`] - GPIO line controller with stale-hold recovery
//! * [`camera`] - Persistent camera handle and capture-to-file service
//! * [`dispatch`] - Email alert dispatch with image attachment
//! * [`detection`] - The detection loop state machine
//! * [`error`] - Error types and the fatal/recoverable taxonomy
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use motion_sentry::{
//!     Config, DetectionLoop, EmailDispatcher, RppalBackend, SystemClock, V4lCamera,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let shutdown = Arc::new(AtomicBool::new(false));
//!
//!     let backend = RppalBackend::new()?;
//!     let camera = V4lCamera::open(&config)?;
//!     let dispatcher = EmailDispatcher::new(&config)?;
//!
//!     let mut sentry =
//!         DetectionLoop::new(backend, camera, dispatcher, SystemClock, config, shutdown)?;
//!     sentry.run()?;
//!     Ok(())
//! }
//! ```

pub mod camera;
pub mod config;
pub mod detection;
pub mod dispatch;
pub mod error;
pub mod gpio;

// Re-export commonly used types for convenience
pub use camera::{CameraService, V4lCamera};
pub use config::Config;
pub use detection::{
    Clock, DetectionEvent, DetectionLoop, DispatchOutcome, LoopState, SystemClock,
};
pub use dispatch::{AlertDispatcher, EmailDispatcher};
pub use error::SentryError;
pub use gpio::{Direction, LineBackend, LineController, LineHandle, RppalBackend};
