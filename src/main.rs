//! Firmware entry point for `soil-moisture-agent`.
//!
//! This binary wires the host adapters to the boot/run state machine:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Validating the configuration before any hardware is touched
//! - Building the ADC, LED, network, telemetry and updater adapters
//! - Running the state machine until it restarts the device
//!
//! # Environment Variables
//! - `WIFI_SSID`, `WIFI_PASSWORD`, `INFLUXDB_URL`, `INFLUXDB_TOKEN`,
//!   `GITHUB_PROJECT_URL` (**required**)
//! - `AGENT_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AGENT_SPAN_EVENTS` (optional) – span event mode for tracing
//! - `GITHUB_TOKEN` (optional) – authenticates release queries
//!
//! See `config.rs` for the full list. There is no command line; the agent
//! runs its state machine unconditionally from start-up.
use std::env;

use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

use soil_agent::{
    config,
    host::{GithubUpdater, HostNetwork, ProcessReset, SysfsAdc, SysfsLed},
    Agent, AgentSettings, ConnectivityManager, InfluxPublisher, Peripherals, UpdateCoordinator,
    WifiSettings,
};

// ---

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let peripherals = Peripherals {
        sensor: SysfsAdc::new(&cfg.adc_path, cfg.adc_resolution_bits),
        led: SysfsLed::new(cfg.led_path.clone()),
        reset: ProcessReset,
    };
    let connectivity = ConnectivityManager::new(
        HostNetwork::new(cfg.wifi_manage),
        WifiSettings::from_config(&cfg),
    );
    let telemetry = InfluxPublisher::from_config(&cfg)?;
    let updates = UpdateCoordinator::new(GithubUpdater::from_config(&cfg)?);

    let agent = Agent::new(
        AgentSettings::from_config(&cfg),
        peripherals,
        connectivity,
        telemetry,
        updates,
    );
    tracing::info!("Booting, id {}", agent.boot_id());

    let reason = agent.run().await;

    // Only reachable if the reset adapter returned
    anyhow::bail!("state machine stopped without a reset ({reason})")
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AGENT_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AGENT_LOG_LEVEL` env var
///
/// This should be called once at start-up before any logging or tracing
/// macros are invoked. It installs the subscriber globally for the lifetime
/// of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("AGENT_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AGENT_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AGENT_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},reqwest=info,hyper=warn,hyper_util=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
