//! Status LED through `/sys/class/leds/<name>/brightness`.

use std::{fs, path::PathBuf};

use tracing::{debug, trace};

use crate::device::StatusLed;

/// Sysfs-backed LED. Without a path the LED only exists in the logs, which
/// keeps boards without a user LED running.
pub struct SysfsLed {
    // ---
    path: Option<PathBuf>,
    on: bool,
    warned: bool,
}

impl SysfsLed {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            on: false,
            warned: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    fn write(&mut self) {
        // ---
        let Some(path) = &self.path else {
            trace!(on = self.on, "Status LED");
            return;
        };

        let value = if self.on { "1" } else { "0" };
        if let Err(e) = fs::write(path, value) {
            // Report once; a missing LED must not flood the log at 10 Hz
            if !self.warned {
                debug!("Cannot drive status LED {}: {}", path.display(), e);
                self.warned = true;
            }
        }
    }
}

impl StatusLed for SysfsLed {
    fn set(&mut self, on: bool) {
        self.on = on;
        self.write();
    }

    fn toggle(&mut self) {
        self.on = !self.on;
        self.write();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_writes_brightness() {
        // ---
        let file = NamedTempFile::new().unwrap();
        let mut led = SysfsLed::new(Some(file.path().to_path_buf()));

        led.set(true);
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "1");

        led.toggle();
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "0");
        assert!(!led.is_on());
    }

    #[test]
    fn test_without_path_tracks_state() {
        // ---
        let mut led = SysfsLed::new(None);

        led.toggle();
        assert!(led.is_on());
    }
}
