//! Soil moisture telemetry agent.
//!
//! Samples a capacitive soil sensor, publishes each reading to InfluxDB as a
//! line-protocol point, and keeps its own firmware current through staged
//! over-the-air updates. The entry point is [`Agent::run`], the boot/run state
//! machine; every piece of hardware it touches sits behind a trait so the
//! sequencing can be exercised without a board.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): siblings depend on the
//! re-exports below rather than on each other's file layout.

pub mod agent;
pub mod calibration;
pub mod config;
pub mod connectivity;
pub mod device;
pub mod host;
pub mod line_protocol;
pub mod publisher;
pub mod updates;

pub use agent::{Agent, AgentSettings, BootState, Peripherals};
pub use calibration::{Calibration, CalibrationError};
pub use config::Config;
pub use connectivity::{
    Association, ConnectivityError, ConnectivityManager, NetworkInterface, WifiSettings,
};
pub use device::{AnalogSensor, DeviceReset, RestartReason, StatusLed};
pub use line_protocol::{encode, MeasurementPoint};
pub use publisher::{InfluxPublisher, PublishError, PublishOutcome, PublishStats, TelemetrySink};
pub use updates::{UpdateCoordinator, UpdateDecision, Updater};
