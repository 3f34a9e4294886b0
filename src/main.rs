use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::info;

use motion_sentry::{
    Config, DetectionLoop, EmailDispatcher, RppalBackend, SystemClock, V4lCamera,
};

/// Motion Sentry - PIR motion detection and email alert appliance.
///
/// Polls a PIR sensor on a GPIO line; on motion it lights a status LED,
/// captures a still image from the camera, and emails the image to a fixed
/// recipient. A hold keeps the LED meaningful to a human observer and a
/// cooldown prevents alert storms.
///
/// # Environment Variables
///
/// Required:
/// * `SENDER_EMAIL` - Address alerts are sent from
/// * `EMAIL_PASSWORD` - Password or app password for the sender account
/// * `RECIPIENT_EMAIL` - Address alerts are delivered to
///
/// Optional (with defaults):
/// * `EMAIL_SUBJECT` - Subject line (default: "Motion Detected Alert")
/// * `SMTP_RELAY` - SMTP relay host (default: "smtp.gmail.com")
/// * `SENSOR_PIN` - PIR sensor BCM pin (default: 17)
/// * `LED_PIN` - Status LED BCM pin (default: 18)
/// * `LED_ON_SECONDS` - LED hold after a detection (default: 10)
/// * `COOLDOWN_SECONDS` - Cooldown after a cycle, at least 1 (default: 2)
/// * `IMAGE_WIDTH` x `IMAGE_HEIGHT` - Capture resolution (default: 1920x1080)
/// * `SAVE_DIR` - Directory for captured images (default: "./captured_images")
/// * `CAMERA_DEVICE` - Video device index (default: 0)
/// * `SENSOR_ACTIVE_LOW` - Sensor asserts by pulling low (default: "false")
///
/// # Usage
///
/// ```bash
/// export SENDER_EMAIL="pi@example.com"
/// export EMAIL_PASSWORD="app-password"
/// export RECIPIENT_EMAIL="owner@example.com"
/// ./motion-sentry
/// ```
///
/// Exits non-zero on unrecoverable GPIO or camera initialization failure
/// and on fatal loop errors, so a service manager can act on it. On a
/// termination signal the current state transition completes, then GPIO
/// and camera handles are released.
fn main() -> Result<()> {
    // Initialize logger to output to stdout, using RUST_LOG env var or info level by default
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .filter_level(
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Info),
        )
        .init();

    // Load configuration from environment variables
    let config = Config::load().context("Failed to load configuration")?;

    info!("Motion Sentry starting...");
    info!("PIR sensor: GPIO {}", config.sensor_pin);
    info!("Status LED: GPIO {}", config.led_pin);
    info!(
        "LED hold: {}s, cooldown: {}s",
        config.led_on.as_secs(),
        config.cooldown.as_secs()
    );
    // The password is a secret; only the addresses are logged.
    info!(
        "Email alerts: {} -> {}",
        config.sender_email, config.recipient_email
    );

    fs::create_dir_all(&config.save_dir).with_context(|| {
        format!(
            "Failed to create save directory {}",
            config.save_dir.display()
        )
    })?;
    info!("Images will be saved to: {}", config.save_dir.display());

    // Termination signals are honored at state-machine boundaries only.
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install termination handler")?;

    let backend = RppalBackend::new().context("Failed to open the GPIO subsystem")?;
    let camera = V4lCamera::open(&config).context("Failed to initialize camera")?;
    let dispatcher = EmailDispatcher::new(&config).context("Failed to configure alert dispatch")?;

    let mut sentry = DetectionLoop::new(backend, camera, dispatcher, SystemClock, config, shutdown)
        .context("Failed to acquire GPIO lines")?;

    sentry.run()?;

    info!("Motion Sentry stopped");
    Ok(())
}
