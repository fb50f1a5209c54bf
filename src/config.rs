//! Configuration loader for the `soil-moisture-agent` firmware.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The result is an immutable [`Config`] snapshot that
//! `main.rs` hands to each component's constructor; nothing else in the crate
//! reads the environment.
//!
//! Loading is fail-fast: a missing credential, an unparsable URL or a
//! degenerate calibration is reported here, before the boot state machine
//! starts, instead of surfacing as NaN readings or failed requests later.
use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;

use crate::calibration::{Calibration, DEFAULT_ANALOG_MAX, DEFAULT_ANALOG_MIN};
use crate::host::{adc_channel_for_pin, github_release_api_url};

/// Parse an optional environment variable into `$ty`, falling back to a default.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required, non-empty string environment variable.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

pub const DEFAULT_SENSOR_PIN: u8 = 26;
pub const DEFAULT_DEVICE_TAG: &str = "raspberry_pico_w";
pub const DEFAULT_STATE_DIR: &str = "/var/lib/soil-moisture-agent";

/// Upper bound for a single association attempt (one day).
pub const MAX_WIFI_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Strongly typed agent configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// WiFi network to associate with.
    pub wifi_ssid: String,

    /// WiFi passphrase.
    pub wifi_password: String,

    /// Hand association to NetworkManager instead of assuming the OS does it.
    pub wifi_manage: bool,

    /// Association attempts before giving up and restarting.
    pub wifi_max_attempts: u32,

    /// How long a single association attempt may take.
    pub wifi_attempt_timeout: Duration,

    /// InfluxDB write endpoint, including `org`/`bucket` query parameters.
    pub influx_url: Url,

    /// InfluxDB API token sent as `Authorization: Token <token>`.
    pub influx_token: String,

    /// Request timeout for telemetry posts and release queries.
    pub http_timeout: Duration,

    /// GitHub project that publishes firmware releases.
    pub update_url: String,

    /// Optional API token; raises the release API rate limit.
    pub github_token: Option<String>,

    /// GPIO the sensor is wired to (GPIO26..=29 are ADC-capable).
    pub sensor_pin: u8,

    /// IIO raw channel file backing the sensor.
    pub adc_path: PathBuf,

    /// Native ADC resolution, rescaled to 16 bits on read.
    pub adc_resolution_bits: u8,

    /// Validated dry/wet calibration points.
    pub calibration: Calibration,

    /// Value of the `device` tag on every point.
    pub device_tag: String,

    /// Pause between publishing and the next update check.
    pub sample_interval: Duration,

    /// How long the status LED stays lit at the top of each cycle.
    pub blink: Duration,

    /// Sysfs LED brightness file; `None` disables the indicator.
    pub led_path: Option<PathBuf>,

    /// Where the updater keeps `.version` and staged releases.
    pub state_dir: PathBuf,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `WIFI_SSID`, `WIFI_PASSWORD` – network credentials
/// - `INFLUXDB_URL` – InfluxDB write endpoint
/// - `INFLUXDB_TOKEN` – InfluxDB API token
/// - `GITHUB_PROJECT_URL` – `https://github.com/<owner>/<repo>` release source
///
/// Optional:
/// - `SENSOR_PIN` (default: 26), `ANALOG_MIN` (40000), `ANALOG_MAX` (14000)
/// - `DEVICE_TAG` (`raspberry_pico_w`)
/// - `SAMPLE_INTERVAL_SECS` (3), `BLINK_MILLIS` (500), `HTTP_TIMEOUT_SECS` (10)
/// - `WIFI_MANAGE` (false), `WIFI_MAX_ATTEMPTS` (5), `WIFI_ATTEMPT_TIMEOUT_SECS` (30)
/// - `ADC_PATH` (derived from the pin), `ADC_RESOLUTION_BITS` (12)
/// - `LED_PATH` (unset), `STATE_DIR` (`/var/lib/soil-moisture-agent`)
/// - `GITHUB_TOKEN` (unset) – authenticates release queries
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    load_from(|key| env::var(key).ok())
}

/// Same as [`load_from_env`] but reading values through `lookup`.
pub fn load_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let wifi_ssid = require_env!(lookup, "WIFI_SSID");
    let wifi_password = require_env!(lookup, "WIFI_PASSWORD");
    let influx_url = require_env!(lookup, "INFLUXDB_URL");
    let influx_token = require_env!(lookup, "INFLUXDB_TOKEN");
    let update_url = require_env!(lookup, "GITHUB_PROJECT_URL");

    let sensor_pin = parse_env!(lookup, "SENSOR_PIN", u8, DEFAULT_SENSOR_PIN);
    let analog_min = parse_env!(lookup, "ANALOG_MIN", u16, DEFAULT_ANALOG_MIN);
    let analog_max = parse_env!(lookup, "ANALOG_MAX", u16, DEFAULT_ANALOG_MAX);
    let sample_secs = parse_env!(lookup, "SAMPLE_INTERVAL_SECS", u64, 3);
    let blink_millis = parse_env!(lookup, "BLINK_MILLIS", u64, 500);
    let http_timeout_secs = parse_env!(lookup, "HTTP_TIMEOUT_SECS", u64, 10);
    let wifi_manage = parse_env!(lookup, "WIFI_MANAGE", bool, false);
    let wifi_max_attempts = parse_env!(lookup, "WIFI_MAX_ATTEMPTS", u32, 5);
    let wifi_attempt_secs = parse_env!(lookup, "WIFI_ATTEMPT_TIMEOUT_SECS", u64, 30);
    let adc_resolution_bits = parse_env!(lookup, "ADC_RESOLUTION_BITS", u8, 12);

    let influx_url = Url::parse(&influx_url).context("Invalid INFLUXDB_URL")?;

    let calibration = Calibration::new(analog_min, analog_max)
        .map_err(|e| anyhow!("Invalid ANALOG_MIN/ANALOG_MAX: {}", e))?;

    let channel = adc_channel_for_pin(sensor_pin)
        .ok_or_else(|| anyhow!("Invalid SENSOR_PIN: GPIO{} is not ADC-capable", sensor_pin))?;

    let adc_path = lookup("ADC_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(format!(
                "/sys/bus/iio/devices/iio:device0/in_voltage{channel}_raw"
            ))
        });

    let cfg = Config {
        wifi_ssid,
        wifi_password,
        wifi_manage,
        wifi_max_attempts,
        wifi_attempt_timeout: Duration::from_secs(wifi_attempt_secs),
        influx_url,
        influx_token,
        http_timeout: Duration::from_secs(http_timeout_secs),
        update_url,
        github_token: lookup("GITHUB_TOKEN").filter(|v| !v.trim().is_empty()),
        sensor_pin,
        adc_path,
        adc_resolution_bits,
        calibration,
        device_tag: lookup("DEVICE_TAG").unwrap_or_else(|| DEFAULT_DEVICE_TAG.to_string()),
        sample_interval: Duration::from_secs(sample_secs),
        blink: Duration::from_millis(blink_millis),
        led_path: lookup("LED_PATH").map(PathBuf::from),
        state_dir: lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
    };

    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Reject configurations the state machine cannot run with.
    pub fn validate(&self) -> Result<()> {
        // ---
        if !matches!(self.influx_url.scheme(), "http" | "https") {
            bail!(
                "Invalid INFLUXDB_URL: unsupported scheme '{}'",
                self.influx_url.scheme()
            );
        }
        github_release_api_url(&self.update_url).context("Invalid GITHUB_PROJECT_URL")?;

        if self.device_tag.trim().is_empty() {
            bail!("DEVICE_TAG must not be empty");
        }
        if self.device_tag.chars().any(char::is_control) {
            bail!("DEVICE_TAG must not contain control characters");
        }
        if self.sample_interval.is_zero() {
            bail!("SAMPLE_INTERVAL_SECS must be greater than zero");
        }
        if self.http_timeout.is_zero() {
            bail!("HTTP_TIMEOUT_SECS must be greater than zero");
        }
        if self.wifi_max_attempts == 0 {
            bail!("WIFI_MAX_ATTEMPTS must be at least 1");
        }
        if self.wifi_attempt_timeout.is_zero() {
            bail!("WIFI_ATTEMPT_TIMEOUT_SECS must be greater than zero");
        }
        if self.wifi_attempt_timeout > MAX_WIFI_ATTEMPT_TIMEOUT {
            bail!(
                "WIFI_ATTEMPT_TIMEOUT_SECS must be at most {}, got {}",
                MAX_WIFI_ATTEMPT_TIMEOUT.as_secs(),
                self.wifi_attempt_timeout.as_secs()
            );
        }
        if !(1..=16).contains(&self.adc_resolution_bits) {
            bail!(
                "ADC_RESOLUTION_BITS must be between 1 and 16, got {}",
                self.adc_resolution_bits
            );
        }
        Ok(())
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the WiFi password and the InfluxDB and GitHub tokens while
    /// showing all other configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  WIFI_SSID          : {}", self.wifi_ssid);
        tracing::info!("  WIFI_PASSWORD      : ****");
        tracing::info!("  WIFI_MANAGE        : {}", self.wifi_manage);
        tracing::info!(
            "  WIFI_ATTEMPTS      : {} x {:?}",
            self.wifi_max_attempts,
            self.wifi_attempt_timeout
        );
        tracing::info!("  INFLUXDB_URL       : {}", self.influx_url);
        tracing::info!("  INFLUXDB_TOKEN     : {}", mask_secret(&self.influx_token));
        tracing::info!("  GITHUB_PROJECT_URL : {}", self.update_url);
        tracing::info!(
            "  GITHUB_TOKEN       : {}",
            self.github_token.as_deref().map_or("(none)".into(), mask_secret)
        );
        tracing::info!(
            "  SENSOR_PIN         : GPIO{} ({})",
            self.sensor_pin,
            self.adc_path.display()
        );
        tracing::info!(
            "  CALIBRATION        : dry={} wet={}",
            self.calibration.analog_min(),
            self.calibration.analog_max()
        );
        tracing::info!("  DEVICE_TAG         : {}", self.device_tag);
        tracing::info!("  SAMPLE_INTERVAL    : {:?}", self.sample_interval);
        tracing::info!("  STATE_DIR          : {}", self.state_dir.display());
    }
}

/// Show only the first four characters of a secret.
fn mask_secret(secret: &str) -> String {
    // ---
    let visible: String = secret.chars().take(4).collect();
    if visible.len() == secret.len() {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}
