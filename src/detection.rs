use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info, warn};

use crate::camera::CameraService;
use crate::config::{Config, constants};
use crate::dispatch::AlertDispatcher;
use crate::error::{GpioError, SentryError};
use crate::gpio::{Direction, LineBackend, LineController, LineHandle};

/// Wall-clock and sleep source for the detection loop.
///
/// All timing goes through this seam so tests can drive the loop with a
/// virtual clock instead of real sleeps.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
    fn sleep(&mut self, duration: Duration);
}

/// System clock backed by chrono and `thread::sleep`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// States of the detection cycle.
///
/// The LED is driven high exactly while the machine is in `Triggered` or
/// `Hold`. The sensor is polled only in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Armed: polling the sensor, LED off.
    Idle,
    /// Edge observed: LED on, capture and dispatch in flight.
    Triggered,
    /// LED stays on for the configured duration after dispatch completes.
    Hold,
    /// LED off, sensor polling paused until the cooldown elapses.
    Cooldown,
}

/// Outcome of the dispatch step for one detection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed,
    NotAttempted,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Sent => write!(f, "sent"),
            DispatchOutcome::Failed => write!(f, "failed"),
            DispatchOutcome::NotAttempted => write!(f, "not attempted"),
        }
    }
}

/// Record of one trigger occurrence. Immutable after creation; retained
/// only as a log line.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    /// When the trigger was observed.
    pub triggered_at: DateTime<Local>,
    /// Path of the captured image, or `None` if capture failed.
    pub image: Option<PathBuf>,
    /// Whether the alert went out for this event.
    pub dispatch: DispatchOutcome,
}

/// Whether a raw sensor level means "motion present".
///
/// Polarity depends on the wiring of the chosen sensor model, so the loop
/// never compares raw levels directly.
pub fn sensor_asserted(level: bool, active_low: bool) -> bool {
    level != active_low
}

/// The detection-to-notification orchestrator.
///
/// One cooperative loop owns the sensor line, the LED line, the camera
/// handle, and dispatch calls, strictly sequentially. Suspension points are
/// bounded sleeps; shutdown is honored at state boundaries only.
pub struct DetectionLoop<B, C, D, K>
where
    B: LineBackend,
    C: CameraService,
    D: AlertDispatcher,
    K: Clock,
{
    lines: LineController<B>,
    sensor: LineHandle,
    led: LineHandle,
    camera: C,
    dispatcher: D,
    clock: K,
    config: Config,
    state: LoopState,
    shutdown: Arc<AtomicBool>,
}

impl<B, C, D, K> DetectionLoop<B, C, D, K>
where
    B: LineBackend,
    C: CameraService,
    D: AlertDispatcher,
    K: Clock,
{
    /// Acquire both GPIO lines and arm the loop.
    ///
    /// Each acquisition tolerates one busy line by forcing a release and
    /// retrying once; a line that stays busy is a fatal startup condition.
    /// The LED is driven low before the loop is considered armed.
    pub fn new(
        backend: B,
        camera: C,
        dispatcher: D,
        clock: K,
        config: Config,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, SentryError> {
        let mut lines = LineController::new(backend);

        let mut sensor = lines.acquire_with_recovery(config.sensor_pin, Direction::Input)?;
        let led = match lines.acquire_with_recovery(config.led_pin, Direction::Output) {
            Ok(handle) => handle,
            Err(e) => {
                lines.release(&mut sensor);
                return Err(e.into());
            }
        };
        lines.write(&led, false)?;

        info!(
            "GPIO initialized (sensor: GPIO {}, LED: GPIO {})",
            sensor.pin(),
            led.pin()
        );

        Ok(Self {
            lines,
            sensor,
            led,
            camera,
            dispatcher,
            clock,
            config,
            state: LoopState::Idle,
            shutdown,
        })
    }

    /// Current state of the cycle.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until the shutdown flag is set or a fatal error occurs.
    ///
    /// Resources are released on both exit paths. The error, if any, is
    /// returned so the process can exit non-zero for the service manager.
    pub fn run(&mut self) -> Result<(), SentryError> {
        info!("System armed, monitoring for motion");

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.step() {
                error!("Fatal error in detection loop: {}", e);
                self.release_resources();
                return Err(e);
            }
        }

        info!("Shutdown requested, releasing resources");
        self.release_resources();
        Ok(())
    }

    /// Advance the state machine by one transition.
    ///
    /// Returns the [`DetectionEvent`] when a trigger was processed. The
    /// only errors that escape are fatal GPIO conditions; capture and
    /// dispatch failures are recorded in the event and the machine still
    /// advances to `Hold`.
    pub fn step(&mut self) -> Result<Option<DetectionEvent>, SentryError> {
        match self.state {
            LoopState::Idle => {
                let level = self.read_sensor()?;
                if sensor_asserted(level, self.config.sensor_active_low) {
                    info!("Motion detected on GPIO {}", self.sensor.pin());
                    self.lines.write(&self.led, true)?;
                    self.state = LoopState::Triggered;
                } else {
                    self.clock
                        .sleep(Duration::from_millis(constants::POLL_INTERVAL_MS));
                }
                Ok(None)
            }
            LoopState::Triggered => {
                let event = self.process_trigger();
                info!(
                    "Detection event at {}: capture={}, dispatch={}",
                    event.triggered_at.format("%Y-%m-%d %H:%M:%S"),
                    event
                        .image
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "failed".to_string()),
                    event.dispatch
                );
                self.state = LoopState::Hold;
                Ok(Some(event))
            }
            LoopState::Hold => {
                self.clock.sleep(self.config.led_on);
                self.lines.write(&self.led, false)?;
                self.state = LoopState::Cooldown;
                Ok(None)
            }
            LoopState::Cooldown => {
                self.clock.sleep(self.config.cooldown);
                self.state = LoopState::Idle;
                Ok(None)
            }
        }
    }

    /// Capture and dispatch for one trigger. Both attempts are contained:
    /// a capture failure skips dispatch for this event, a dispatch failure
    /// is logged, and in every case the caller advances to `Hold`.
    fn process_trigger(&mut self) -> DetectionEvent {
        let triggered_at = self.clock.now();

        let image = match self.camera.capture(triggered_at) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Capture failed, skipping dispatch for this event: {}", e);
                None
            }
        };

        let dispatch = match &image {
            Some(path) => match self.dispatcher.send(path, triggered_at) {
                Ok(()) => DispatchOutcome::Sent,
                Err(e) => {
                    warn!("Alert dispatch failed: {}", e);
                    DispatchOutcome::Failed
                }
            },
            None => DispatchOutcome::NotAttempted,
        };

        DetectionEvent {
            triggered_at,
            image,
            dispatch,
        }
    }

    /// Poll the sensor, recovering from a busy line exactly once.
    fn read_sensor(&mut self) -> Result<bool, SentryError> {
        match self.lines.read(&self.sensor) {
            Ok(level) => Ok(level),
            Err(GpioError::LineBusy { pin }) => {
                warn!("GPIO {} busy while polling, attempting recovery", pin);
                self.recover_lines()?;
                Ok(self.lines.read(&self.sensor)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One recovery cycle for both lines: force-release, then re-acquire.
    /// A stale holder that claims one of our pins has claimed both in every
    /// observed failure mode, so both are recycled together.
    fn recover_lines(&mut self) -> Result<(), SentryError> {
        self.lines.recover(&mut self.sensor)?;
        self.lines.recover(&mut self.led)?;

        // Re-acquisition leaves the output low, which matches the only
        // state that polls the sensor.
        info!("GPIO lines recovered");
        Ok(())
    }

    fn release_resources(&mut self) {
        if self.led.is_held() {
            if let Err(e) = self.lines.write(&self.led, false) {
                warn!("Failed to turn the LED off during shutdown: {}", e);
            }
        }
        self.lines.release(&mut self.led);
        self.lines.release(&mut self.sensor);
        self.camera.shutdown();
    }
}
