//! Soil sensor sampling through the Linux IIO sysfs interface.

use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::device::AnalogSensor;

/// First ADC-capable GPIO on RP2040-style boards (GPIO26..=29 → ADC0..=3).
const FIRST_ADC_PIN: u8 = 26;
const ADC_CHANNELS: u8 = 4;

/// ADC channel wired to `pin`, if the pin has one.
pub fn adc_channel_for_pin(pin: u8) -> Option<u8> {
    // ---
    pin.checked_sub(FIRST_ADC_PIN)
        .filter(|channel| *channel < ADC_CHANNELS)
}

/// Reads `in_voltage<N>_raw` and widens it to 16 bits.
pub struct SysfsAdc {
    // ---
    path: PathBuf,
    resolution_bits: u8,
}

impl SysfsAdc {
    pub fn new(path: impl Into<PathBuf>, resolution_bits: u8) -> Self {
        Self {
            path: path.into(),
            resolution_bits,
        }
    }
}

impl AnalogSensor for SysfsAdc {
    fn read_u16(&mut self) -> Result<u16> {
        // ---
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let raw: u32 = text
            .trim()
            .parse()
            .with_context(|| format!("parsing ADC value {:?}", text.trim()))?;

        let max = (1u32 << self.resolution_bits) - 1;
        if raw > max {
            return Err(anyhow!(
                "ADC value {} exceeds {}-bit range",
                raw,
                self.resolution_bits
            ));
        }

        tracing::trace!(raw, "ADC sample");
        Ok(widen_to_u16(raw, self.resolution_bits))
    }
}

/// Rescale a `bits`-wide sample to the full `u16` range, rounding to nearest
/// so full scale stays full scale (4095 → 65535 at 12 bits).
fn widen_to_u16(raw: u32, bits: u8) -> u16 {
    // ---
    let max = (1u64 << bits) - 1;
    let scaled = (u64::from(raw) * u64::from(u16::MAX) + max / 2) / max;
    scaled.min(u64::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_pin_to_channel() {
        // ---
        assert_eq!(adc_channel_for_pin(26), Some(0));
        assert_eq!(adc_channel_for_pin(29), Some(3));
        assert_eq!(adc_channel_for_pin(25), None);
        assert_eq!(adc_channel_for_pin(30), None);
    }

    #[test]
    fn test_widen_twelve_bit() {
        // ---
        assert_eq!(widen_to_u16(0, 12), 0);
        assert_eq!(widen_to_u16(4095, 12), 65535);
        assert_eq!(widen_to_u16(2048, 12), 0x8008);
    }

    #[test]
    fn test_reads_sysfs_file() {
        // ---
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "4095").unwrap();

        let mut adc = SysfsAdc::new(file.path(), 12);
        assert_eq!(adc.read_u16().unwrap(), 65535);
    }

    #[test]
    fn test_out_of_range_rejected() {
        // ---
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "5000").unwrap();

        let mut adc = SysfsAdc::new(file.path(), 12);
        assert!(adc.read_u16().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        // ---
        let mut adc = SysfsAdc::new("/nonexistent/in_voltage0_raw", 12);
        assert!(adc.read_u16().is_err());
    }
}
