//! Hardware ports the boot state machine drives directly.
//!
//! Each trait is a narrow seam around one piece of the board: the sensor's ADC
//! channel, the status LED and the reset line. Real adapters live in
//! [`crate::host`]; tests substitute recording fakes.

use std::fmt;

/// Source of raw 16-bit samples from the moisture sensor.
pub trait AnalogSensor {
    /// Take one sample, scaled to the full `u16` range.
    fn read_u16(&mut self) -> anyhow::Result<u16>;
}

/// Single on/off status indicator.
pub trait StatusLed {
    fn set(&mut self, on: bool);

    fn toggle(&mut self);
}

/// Why the state machine left the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// A staged update was installed and only takes effect after a restart.
    UpdateApplied,
    /// A newer release was found; the next boot installs it.
    UpdateStaged,
    /// The network never associated within the configured attempts.
    AssociationFailed,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestartReason::UpdateApplied => "update applied",
            RestartReason::UpdateStaged => "update staged for next boot",
            RestartReason::AssociationFailed => "network association failed",
        };
        f.write_str(s)
    }
}

/// Hard restart of the whole firmware image.
///
/// Hardware implementations never return from [`DeviceReset::reset`]; a
/// restart is indistinguishable from a power cycle. Test doubles record the
/// call and return so the state machine's terminal transition can be observed.
pub trait DeviceReset {
    fn reset(&mut self, reason: RestartReason);
}
