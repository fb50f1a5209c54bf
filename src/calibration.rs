//! Two-point calibration from raw ADC samples to a moisture percentage.
//!
//! Capacitive soil sensors read *lower* the wetter the soil is, so the dry
//! reference point (`analog_min`, 0 %) is numerically larger than the wet one
//! (`analog_max`, 100 %). The mapping keeps whatever order the two points are
//! configured in and never assumes an increasing sensor.

use thiserror::Error;

/// Raw ADC reading at 0 % moisture on the reference sensor (sensor in air).
pub const DEFAULT_ANALOG_MIN: u16 = 40_000;

/// Raw ADC reading at 100 % moisture on the reference sensor (sensor in water).
pub const DEFAULT_ANALOG_MAX: u16 = 14_000;

pub const MOISTURE_MIN: f64 = 0.0;
pub const MOISTURE_MAX: f64 = 100.0;

// ---

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalibrationError {
    /// Both reference points read the same, the map would divide by zero.
    #[error("calibration points must differ (both are {0})")]
    DegeneratePoints(u16),
}

/// Validated two-point linear map.
///
/// Construction is the only fallible step; once a `Calibration` exists,
/// [`Calibration::map`] is total and always lands in `[0.0, 100.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    // ---
    analog_min: u16,
    analog_max: u16,
}

impl Calibration {
    // ---
    pub fn new(analog_min: u16, analog_max: u16) -> Result<Self, CalibrationError> {
        // ---
        if analog_min == analog_max {
            return Err(CalibrationError::DegeneratePoints(analog_min));
        }
        Ok(Self {
            analog_min,
            analog_max,
        })
    }

    pub fn analog_min(&self) -> u16 {
        self.analog_min
    }

    pub fn analog_max(&self) -> u16 {
        self.analog_max
    }

    /// Map a raw sample to a moisture percentage.
    ///
    /// Samples beyond either reference point saturate at the nearest bound
    /// instead of extrapolating.
    pub fn map(&self, raw: u16) -> f64 {
        // ---
        let raw = f64::from(raw);
        let lo = f64::from(self.analog_min);
        let hi = f64::from(self.analog_max);

        let pct = MOISTURE_MIN + ((raw - lo) / (hi - lo)) * (MOISTURE_MAX - MOISTURE_MIN);
        pct.clamp(MOISTURE_MIN, MOISTURE_MAX)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            analog_min: DEFAULT_ANALOG_MIN,
            analog_max: DEFAULT_ANALOG_MAX,
        }
    }
}
