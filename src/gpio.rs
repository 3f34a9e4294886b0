use std::collections::HashMap;

use log::warn;
use rppal::gpio::{Gpio, InputPin, Level, OutputPin};

use crate::error::GpioError;

/// GPIO line controller with stale-hold recovery.
///
/// The appliance owns exactly two digital lines: the PIR sensor input and
/// the status LED output. Lines are polled rather than interrupt-driven, so
/// a busy or wedged GPIO subsystem is recovered from in one place instead of
/// inside callback handlers. All hardware access goes through the
/// [`LineBackend`] trait; tests substitute scripted backends.

/// Direction of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// An acquired, exclusive reference to one GPIO pin.
///
/// At most one active handle exists per pin per process; a handle must be
/// released before the pin can be acquired again.
#[derive(Debug)]
pub struct LineHandle {
    pin: u8,
    direction: Direction,
    held: bool,
}

impl LineHandle {
    /// The BCM pin number behind this handle.
    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// The direction the line was acquired with.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the handle currently holds its pin.
    pub fn is_held(&self) -> bool {
        self.held
    }
}

/// Low-level pin operations, keyed by pin number.
///
/// Implemented by [`RppalBackend`] for real hardware and by scripted fakes
/// in tests.
pub trait LineBackend {
    /// Claim exclusive control of a pin. Fails with
    /// [`GpioError::LineBusy`] when the line is already held.
    fn acquire(&mut self, pin: u8, direction: Direction) -> Result<(), GpioError>;

    /// Current logic level of an acquired input pin.
    fn read(&mut self, pin: u8) -> Result<bool, GpioError>;

    /// Drive an acquired output pin to the given level.
    fn write(&mut self, pin: u8, level: bool) -> Result<(), GpioError>;

    /// Relinquish a pin. Releasing a pin that is not held is a no-op.
    fn release(&mut self, pin: u8);

    /// Revoke a stale hold on a pin so it can be acquired again.
    fn force_release(&mut self, pin: u8) -> Result<(), GpioError>;
}

/// Owns a [`LineBackend`] and hands out [`LineHandle`]s.
pub struct LineController<B: LineBackend> {
    backend: B,
}

impl<B: LineBackend> LineController<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Request exclusive control of a pin.
    ///
    /// # Errors
    ///
    /// Returns [`GpioError::LineBusy`] if another owner holds the pin; the
    /// caller may invoke [`LineController::recover`] (or acquire through
    /// [`LineController::acquire_with_recovery`]) to revoke a stale hold.
    pub fn acquire(&mut self, pin: u8, direction: Direction) -> Result<LineHandle, GpioError> {
        self.backend.acquire(pin, direction)?;
        Ok(LineHandle {
            pin,
            direction,
            held: true,
        })
    }

    /// Acquire a pin, forcing a release and retrying exactly once if the
    /// line is busy.
    ///
    /// A line that is still busy after the forced release is a fatal
    /// condition for the caller; the error is returned, never retried
    /// again.
    pub fn acquire_with_recovery(
        &mut self,
        pin: u8,
        direction: Direction,
    ) -> Result<LineHandle, GpioError> {
        match self.acquire(pin, direction) {
            Err(GpioError::LineBusy { .. }) => {
                warn!("GPIO {} is busy, forcing release and retrying once", pin);
                self.backend.force_release(pin)?;
                self.acquire(pin, direction)
            }
            other => other,
        }
    }

    /// Force-release the line behind a held-or-lost handle and claim it
    /// again. One recovery cycle; a second busy propagates to the caller.
    pub fn recover(&mut self, handle: &mut LineHandle) -> Result<(), GpioError> {
        self.backend.force_release(handle.pin)?;
        handle.held = false;
        self.backend.acquire(handle.pin, handle.direction)?;
        handle.held = true;
        Ok(())
    }

    /// Read the current logic level of an input line.
    ///
    /// Returns within one polling interval; the sensor is polled, not
    /// interrupt-driven.
    pub fn read(&mut self, handle: &LineHandle) -> Result<bool, GpioError> {
        if !handle.held {
            return Err(GpioError::NotAcquired { pin: handle.pin });
        }
        if handle.direction != Direction::Input {
            return Err(GpioError::WrongDirection { pin: handle.pin });
        }
        self.backend.read(handle.pin)
    }

    /// Set the output level of an output line. The observable side effect
    /// is the physical LED state.
    pub fn write(&mut self, handle: &LineHandle, level: bool) -> Result<(), GpioError> {
        if !handle.held {
            return Err(GpioError::NotAcquired { pin: handle.pin });
        }
        if handle.direction != Direction::Output {
            return Err(GpioError::WrongDirection { pin: handle.pin });
        }
        self.backend.write(handle.pin, level)
    }

    /// Relinquish the pin behind a handle. Idempotent: releasing an
    /// already-released handle is a no-op.
    pub fn release(&mut self, handle: &mut LineHandle) {
        if handle.held {
            self.backend.release(handle.pin);
            handle.held = false;
        }
    }
}

enum HeldPin {
    Input(InputPin),
    Output(OutputPin),
}

/// Hardware backend using the Raspberry Pi GPIO peripheral via rppal.
///
/// Sensor inputs are configured with the internal pull-down so a floating
/// line reads low; outputs are driven low on acquisition. `force_release`
/// drops every claim this process holds on the pin. Holds owned by a
/// foreign process cannot be revoked from here; clearing our own stale
/// claim covers the failure mode seen in the field (a crashed predecessor
/// instance of this binary).
pub struct RppalBackend {
    gpio: Gpio,
    held: HashMap<u8, HeldPin>,
}

impl RppalBackend {
    pub fn new() -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|e| GpioError::InitFailed {
            reason: e.to_string(),
        })?;
        Ok(Self {
            gpio,
            held: HashMap::new(),
        })
    }
}

impl LineBackend for RppalBackend {
    fn acquire(&mut self, pin: u8, direction: Direction) -> Result<(), GpioError> {
        if self.held.contains_key(&pin) {
            return Err(GpioError::LineBusy { pin });
        }

        let raw = self.gpio.get(pin).map_err(|e| match e {
            rppal::gpio::Error::PinNotAvailable(_) => GpioError::LineBusy { pin },
            other => GpioError::Io {
                pin,
                reason: other.to_string(),
            },
        })?;

        let held = match direction {
            Direction::Input => HeldPin::Input(raw.into_input_pulldown()),
            Direction::Output => {
                let mut output = raw.into_output();
                output.set_low();
                HeldPin::Output(output)
            }
        };
        self.held.insert(pin, held);
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<bool, GpioError> {
        match self.held.get(&pin) {
            Some(HeldPin::Input(input)) => Ok(input.read() == Level::High),
            Some(HeldPin::Output(_)) => Err(GpioError::WrongDirection { pin }),
            None => Err(GpioError::NotAcquired { pin }),
        }
    }

    fn write(&mut self, pin: u8, level: bool) -> Result<(), GpioError> {
        match self.held.get_mut(&pin) {
            Some(HeldPin::Output(output)) => {
                if level {
                    output.set_high();
                } else {
                    output.set_low();
                }
                Ok(())
            }
            Some(HeldPin::Input(_)) => Err(GpioError::WrongDirection { pin }),
            None => Err(GpioError::NotAcquired { pin }),
        }
    }

    fn release(&mut self, pin: u8) {
        // Dropping the rppal pin resets it and returns it to the pool.
        self.held.remove(&pin);
    }

    fn force_release(&mut self, pin: u8) -> Result<(), GpioError> {
        self.held.remove(&pin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ScriptedBackend {
        busy_acquires: u32,
        acquires: u32,
        releases: u32,
        force_releases: u32,
        level: bool,
    }

    impl LineBackend for ScriptedBackend {
        fn acquire(&mut self, pin: u8, _direction: Direction) -> Result<(), GpioError> {
            if self.busy_acquires > 0 {
                self.busy_acquires -= 1;
                return Err(GpioError::LineBusy { pin });
            }
            self.acquires += 1;
            Ok(())
        }

        fn read(&mut self, _pin: u8) -> Result<bool, GpioError> {
            Ok(self.level)
        }

        fn write(&mut self, _pin: u8, level: bool) -> Result<(), GpioError> {
            self.level = level;
            Ok(())
        }

        fn release(&mut self, _pin: u8) {
            self.releases += 1;
        }

        fn force_release(&mut self, _pin: u8) -> Result<(), GpioError> {
            self.force_releases += 1;
            Ok(())
        }
    }

    #[test]
    fn acquire_with_recovery_retries_once() {
        let mut lines = LineController::new(ScriptedBackend {
            busy_acquires: 1,
            ..Default::default()
        });

        let handle = lines.acquire_with_recovery(17, Direction::Input).unwrap();
        assert!(handle.is_held());
        assert_eq!(lines.backend.force_releases, 1);
        assert_eq!(lines.backend.acquires, 1);
    }

    #[test]
    fn persistently_busy_line_is_an_error() {
        let mut lines = LineController::new(ScriptedBackend {
            busy_acquires: 2,
            ..Default::default()
        });

        let err = lines.acquire_with_recovery(17, Direction::Input).unwrap_err();
        assert!(matches!(err, GpioError::LineBusy { pin: 17 }));
        assert_eq!(lines.backend.force_releases, 1);
    }

    #[test]
    fn release_is_idempotent() {
        let mut lines = LineController::new(ScriptedBackend::default());
        let mut handle = lines.acquire(18, Direction::Output).unwrap();

        lines.release(&mut handle);
        lines.release(&mut handle);

        assert!(!handle.is_held());
        assert_eq!(lines.backend.releases, 1);
    }

    #[test]
    fn read_requires_an_input_handle() {
        let mut lines = LineController::new(ScriptedBackend::default());
        let handle = lines.acquire(18, Direction::Output).unwrap();

        let err = lines.read(&handle).unwrap_err();
        assert!(matches!(err, GpioError::WrongDirection { pin: 18 }));
    }

    #[test]
    fn released_handle_rejects_io() {
        let mut lines = LineController::new(ScriptedBackend::default());
        let mut handle = lines.acquire(18, Direction::Output).unwrap();
        lines.release(&mut handle);

        let err = lines.write(&handle, true).unwrap_err();
        assert!(matches!(err, GpioError::NotAcquired { pin: 18 }));
    }
}
