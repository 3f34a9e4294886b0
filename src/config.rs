use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the Motion Sentry appliance loaded from environment
/// variables.
///
/// All values are established once at startup and never mutated during the
/// run. The struct is passed into every component constructor; no code looks
/// configuration up ambiently.
#[derive(Debug, Clone)]
pub struct Config {
    /// BCM pin number the PIR sensor's digital output is wired to.
    /// Environment variable: `SENSOR_PIN`
    pub sensor_pin: u8,

    /// BCM pin number driving the status LED.
    /// Environment variable: `LED_PIN`
    pub led_pin: u8,

    /// How long the LED stays lit after a detection.
    /// Environment variable: `LED_ON_SECONDS`
    pub led_on: Duration,

    /// Idle period after an alert cycle during which the sensor is not
    /// polled. Must be at least one second: capture file names have
    /// one-second resolution and the cooldown is what keeps two triggers
    /// from landing in the same second.
    /// Environment variable: `COOLDOWN_SECONDS`
    pub cooldown: Duration,

    /// Capture resolution, width in pixels.
    /// Environment variable: `IMAGE_WIDTH`
    pub image_width: u32,

    /// Capture resolution, height in pixels.
    /// Environment variable: `IMAGE_HEIGHT`
    pub image_height: u32,

    /// Directory captured images are written into. Created at startup.
    /// Environment variable: `SAVE_DIR`
    pub save_dir: PathBuf,

    /// Index of the video device to capture from (`/dev/video<N>`).
    /// Environment variable: `CAMERA_DEVICE`
    pub camera_device: usize,

    /// Whether the sensor asserts "motion present" by pulling the line low.
    ///
    /// Fixed by the wiring of the chosen sensor model; the detection loop
    /// only ever asks "is the sensor asserted", never for a raw level.
    /// Environment variable: `SENSOR_ACTIVE_LOW`
    pub sensor_active_low: bool,

    /// Address alert emails are sent from.
    /// Environment variable: `SENDER_EMAIL` (required)
    pub sender_email: String,

    /// Password or app password for the sender account. Treated as a
    /// secret: never logged.
    /// Environment variable: `EMAIL_PASSWORD` (required)
    pub email_password: String,

    /// Address alert emails are delivered to.
    /// Environment variable: `RECIPIENT_EMAIL` (required)
    pub recipient_email: String,

    /// Subject line for alert emails.
    /// Environment variable: `EMAIL_SUBJECT`
    pub email_subject: String,

    /// SMTP relay host used for dispatch (STARTTLS on the submission port).
    /// Environment variable: `SMTP_RELAY`
    pub smtp_relay: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required variable is missing or any
    /// value fails to parse or validate. There is no partial startup: the
    /// caller is expected to treat every configuration error as fatal.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sensor_pin: u8 = parse_or(&lookup, "SENSOR_PIN", constants::DEFAULT_SENSOR_PIN)?;
        let led_pin: u8 = parse_or(&lookup, "LED_PIN", constants::DEFAULT_LED_PIN)?;

        if sensor_pin == led_pin {
            return Err(ConfigError::InvalidValue {
                field: "LED_PIN".to_string(),
                value: led_pin.to_string(),
                reason: "sensor and LED pins must differ".to_string(),
            });
        }

        let led_on_seconds: u64 =
            parse_or(&lookup, "LED_ON_SECONDS", constants::DEFAULT_LED_ON_SECONDS)?;

        let cooldown_seconds: u64 = parse_or(
            &lookup,
            "COOLDOWN_SECONDS",
            constants::DEFAULT_COOLDOWN_SECONDS,
        )?;
        if cooldown_seconds < 1 {
            return Err(ConfigError::InvalidValue {
                field: "COOLDOWN_SECONDS".to_string(),
                value: cooldown_seconds.to_string(),
                reason: "must be at least 1 second so capture file names cannot collide"
                    .to_string(),
            });
        }

        let image_width: u32 = parse_or(&lookup, "IMAGE_WIDTH", constants::DEFAULT_IMAGE_WIDTH)?;
        let image_height: u32 =
            parse_or(&lookup, "IMAGE_HEIGHT", constants::DEFAULT_IMAGE_HEIGHT)?;
        if image_width == 0 || image_height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "IMAGE_WIDTH/IMAGE_HEIGHT".to_string(),
                value: format!("{}x{}", image_width, image_height),
                reason: "resolution must be nonzero".to_string(),
            });
        }

        let save_dir = PathBuf::from(
            lookup("SAVE_DIR").unwrap_or_else(|| constants::DEFAULT_SAVE_DIR.to_string()),
        );

        let camera_device: usize = parse_or(&lookup, "CAMERA_DEVICE", 0)?;

        let sensor_active_low: bool = parse_or(&lookup, "SENSOR_ACTIVE_LOW", false)?;

        let sender_email = required(&lookup, "SENDER_EMAIL")?;
        let email_password = required(&lookup, "EMAIL_PASSWORD")?;
        let recipient_email = required(&lookup, "RECIPIENT_EMAIL")?;

        let email_subject = lookup("EMAIL_SUBJECT")
            .unwrap_or_else(|| constants::DEFAULT_EMAIL_SUBJECT.to_string());
        let smtp_relay =
            lookup("SMTP_RELAY").unwrap_or_else(|| constants::DEFAULT_SMTP_RELAY.to_string());

        Ok(Config {
            sensor_pin,
            led_pin,
            led_on: Duration::from_secs(led_on_seconds),
            cooldown: Duration::from_secs(cooldown_seconds),
            image_width,
            image_height,
            save_dir,
            camera_device,
            sensor_active_low,
            sender_email,
            email_password,
            recipient_email,
            email_subject,
            smtp_relay,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar {
            var_name: key.to_string(),
        })
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Application constants used throughout the system.
pub mod constants {
    /// Interval between sensor polls while the loop is idle, in
    /// milliseconds. Bounds how long a single read may appear to block.
    pub const POLL_INTERVAL_MS: u64 = 100;

    /// Frames discarded at the start of a capture so exposure can settle.
    pub const CAMERA_WARMUP_FRAMES: u32 = 3;

    /// Buffers mapped for a capture stream.
    pub const CAPTURE_BUFFERS: u32 = 2;

    /// Default BCM pin for the PIR sensor.
    pub const DEFAULT_SENSOR_PIN: u8 = 17;

    /// Default BCM pin for the status LED.
    pub const DEFAULT_LED_PIN: u8 = 18;

    /// Default LED hold duration after a detection, in seconds.
    pub const DEFAULT_LED_ON_SECONDS: u64 = 10;

    /// Default cooldown after an alert cycle, in seconds.
    pub const DEFAULT_COOLDOWN_SECONDS: u64 = 2;

    /// Default capture width in pixels.
    pub const DEFAULT_IMAGE_WIDTH: u32 = 1920;

    /// Default capture height in pixels.
    pub const DEFAULT_IMAGE_HEIGHT: u32 = 1080;

    /// Default directory for captured images.
    pub const DEFAULT_SAVE_DIR: &str = "./captured_images";

    /// Default SMTP relay host.
    pub const DEFAULT_SMTP_RELAY: &str = "smtp.gmail.com";

    /// Default subject line for alert emails.
    pub const DEFAULT_EMAIL_SUBJECT: &str = "Motion Detected Alert";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(map: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|value| value.to_string())
    }

    fn required_only() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SENDER_EMAIL", "pi@example.com"),
            ("EMAIL_PASSWORD", "app-password"),
            ("RECIPIENT_EMAIL", "owner@example.com"),
        ])
    }

    #[test]
    fn defaults_applied_when_only_required_keys_present() {
        let map = required_only();
        let config = Config::from_lookup(lookup(&map)).unwrap();

        assert_eq!(config.sensor_pin, 17);
        assert_eq!(config.led_pin, 18);
        assert_eq!(config.led_on, Duration::from_secs(10));
        assert_eq!(config.cooldown, Duration::from_secs(2));
        assert_eq!(config.image_width, 1920);
        assert_eq!(config.image_height, 1080);
        assert_eq!(config.save_dir, PathBuf::from("./captured_images"));
        assert_eq!(config.camera_device, 0);
        assert!(!config.sensor_active_low);
        assert_eq!(config.email_subject, "Motion Detected Alert");
        assert_eq!(config.smtp_relay, "smtp.gmail.com");
    }

    #[test]
    fn missing_required_key_is_fatal() {
        let mut map = required_only();
        map.remove("SENDER_EMAIL");

        let err = Config::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar { var_name } if var_name == "SENDER_EMAIL"
        ));
    }

    #[test]
    fn empty_required_key_is_fatal() {
        let mut map = required_only();
        map.insert("RECIPIENT_EMAIL", "");

        let err = Config::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { .. }));
    }

    #[test]
    fn malformed_pin_rejected() {
        let mut map = required_only();
        map.insert("SENSOR_PIN", "seventeen");

        let err = Config::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field, .. } if field == "SENSOR_PIN"
        ));
    }

    #[test]
    fn zero_cooldown_rejected() {
        let mut map = required_only();
        map.insert("COOLDOWN_SECONDS", "0");

        let err = Config::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field, .. } if field == "COOLDOWN_SECONDS"
        ));
    }

    #[test]
    fn identical_pins_rejected() {
        let mut map = required_only();
        map.insert("SENSOR_PIN", "18");

        let err = Config::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn polarity_override_parsed() {
        let mut map = required_only();
        map.insert("SENSOR_ACTIVE_LOW", "true");

        let config = Config::from_lookup(lookup(&map)).unwrap();
        assert!(config.sensor_active_low);
    }
}
