//! Boot/run state machine.
//!
//! ```text
//! BootApply ──no──▶ BootCheck ──no──▶ Running ⟲
//!     │ yes             │ yes            │ update found / association failed
//!     ▼                 ▼                ▼
//!  Restart           Restart          Restart
//! ```
//!
//! A staged update is installed first, before the device does any other work.
//! Detection of new releases follows, and is repeated after every published
//! sample. Every positive answer ends in [`Restart`](DeviceReset), the only
//! way new firmware becomes active. Everything runs sequentially on one task;
//! sampling, publishing and update checks never overlap.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    calibration::Calibration,
    connectivity::{ConnectivityManager, NetworkInterface},
    device::{AnalogSensor, DeviceReset, RestartReason, StatusLed},
    line_protocol::MeasurementPoint,
    publisher::{PublishOutcome, TelemetrySink},
    updates::{UpdateCoordinator, UpdateDecision, Updater},
    Config,
};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    BootApply,
    BootCheck,
    Running,
}

/// Sampling parameters taken from [`Config`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    // ---
    pub device_tag: String,
    pub calibration: Calibration,
    pub sample_interval: Duration,
    pub blink: Duration,
}

impl AgentSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            device_tag: cfg.device_tag.clone(),
            calibration: cfg.calibration,
            sample_interval: cfg.sample_interval,
            blink: cfg.blink,
        }
    }
}

/// Board-level devices owned by the agent.
pub struct Peripherals<S, L, R> {
    pub sensor: S,
    pub led: L,
    pub reset: R,
}

pub struct Agent<S, L, R, N, T, U> {
    // ---
    settings: AgentSettings,
    sensor: S,
    led: L,
    reset: R,
    connectivity: ConnectivityManager<N>,
    telemetry: T,
    updates: UpdateCoordinator<U>,
    boot_id: Uuid,
}

impl<S, L, R, N, T, U> Agent<S, L, R, N, T, U>
where
    S: AnalogSensor,
    L: StatusLed,
    R: DeviceReset,
    N: NetworkInterface,
    T: TelemetrySink,
    U: Updater,
{
    // ---
    pub fn new(
        settings: AgentSettings,
        peripherals: Peripherals<S, L, R>,
        connectivity: ConnectivityManager<N>,
        telemetry: T,
        updates: UpdateCoordinator<U>,
    ) -> Self {
        // ---
        Self {
            settings,
            sensor: peripherals.sensor,
            led: peripherals.led,
            reset: peripherals.reset,
            connectivity,
            telemetry,
            updates,
            boot_id: Uuid::new_v4(),
        }
    }

    pub fn boot_id(&self) -> Uuid {
        self.boot_id
    }

    /// Drive the state machine until it reaches the terminal restart state.
    ///
    /// On hardware the reset never returns and neither does this future; with
    /// a recording reset the reason is handed back to the caller.
    pub async fn run(mut self) -> RestartReason {
        // ---
        let span = info_span!("agent", boot_id = %self.boot_id);
        async move {
            let mut state = BootState::BootApply;
            loop {
                debug!(?state, "Entering state");
                state = match state {
                    BootState::BootApply => match self.updates.apply_pending().await {
                        UpdateDecision::RebootRequired => {
                            return self.restart(RestartReason::UpdateApplied)
                        }
                        UpdateDecision::NoUpdate => BootState::BootCheck,
                    },
                    BootState::BootCheck => match self.updates.check_for_next_reboot().await {
                        UpdateDecision::RebootRequired => {
                            return self.restart(RestartReason::UpdateStaged)
                        }
                        UpdateDecision::NoUpdate => BootState::Running,
                    },
                    BootState::Running => return self.running().await,
                };
            }
        }
        .instrument(span)
        .await
    }

    async fn running(&mut self) -> RestartReason {
        // ---
        self.led.set(false);

        if let Err(e) = self.connectivity.connect_blocking(&mut self.led).await {
            error!("{}", e);
            return self.restart(RestartReason::AssociationFailed);
        }
        info!("---------------------");

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let outcome = self
                .sample_and_publish()
                .instrument(info_span!("cycle", cycle))
                .await;
            if outcome.is_none() {
                debug!(cycle, "Nothing published this cycle");
            }

            sleep(self.settings.sample_interval).await;

            if self.updates.check_for_next_reboot().await == UpdateDecision::RebootRequired {
                return self.restart(RestartReason::UpdateStaged);
            }
        }
    }

    /// One blink, sample, encode and publish pass. `None` when the sensor
    /// could not be read and nothing was sent.
    async fn sample_and_publish(&mut self) -> Option<PublishOutcome> {
        // ---
        self.led.set(true);
        sleep(self.settings.blink).await;
        self.led.set(false);

        let raw = match self.sensor.read_u16() {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Sensor read failed, skipping sample: {:#}", e);
                return None;
            }
        };

        let percentage = self.settings.calibration.map(raw);
        info!(raw, "Sensor Data {:.2}%", percentage);

        let point = MeasurementPoint::soil_moisture(&self.settings.device_tag, percentage);
        let line = point.to_line();
        let outcome = self.telemetry.publish(&line).await;

        let stats = self.telemetry.stats();
        debug!(sent = stats.sent, dropped = stats.dropped, "Telemetry counters");

        Some(outcome)
    }

    fn restart(&mut self, reason: RestartReason) -> RestartReason {
        // ---
        warn!("Restarting device: {}", reason);
        self.reset.reset(reason);
        reason
    }
}
