//! WiFi bring-up with a blinking status LED.
//!
//! The connect call blocks the boot sequence until the interface associates.
//! While it waits, the status LED toggles at [`BLINK_HZ`] from the same task
//! (a ticker interleaved with the join and the association polls), so the LED
//! never needs to be shared. Waiting is bounded: after
//! `max_attempts` attempts of `attempt_timeout` each the manager reports
//! [`ConnectivityError::AssociationFailed`] and the caller decides what to do.

use std::{future::Future, net::IpAddr, time::Duration};

use thiserror::Error;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::{device::StatusLed, Config};

/// Indicator frequency while waiting for association.
pub const BLINK_HZ: u64 = 10;

pub const BLINK_PERIOD: Duration = Duration::from_millis(1000 / BLINK_HZ);

// ---

/// The station-mode network interface.
pub trait NetworkInterface {
    /// Power the interface up. Idempotent.
    fn activate(&mut self);

    /// Ask the interface to join `ssid`. Completion does not imply
    /// association; callers poll [`NetworkInterface::is_associated`].
    fn join(&mut self, ssid: &str, password: &str) -> impl Future<Output = anyhow::Result<()>>;

    fn is_associated(&self) -> bool;

    /// Address assigned to the interface, once associated.
    fn local_ip(&self) -> Option<IpAddr>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("could not associate with '{ssid}' after {attempts} attempt(s)")]
    AssociationFailed { ssid: String, attempts: u32 },
}

/// Credentials and retry bounds for association.
#[derive(Debug, Clone)]
pub struct WifiSettings {
    // ---
    pub ssid: String,
    pub password: String,
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
}

impl WifiSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            ssid: cfg.wifi_ssid.clone(),
            password: cfg.wifi_password.clone(),
            max_attempts: cfg.wifi_max_attempts,
            attempt_timeout: cfg.wifi_attempt_timeout,
        }
    }
}

/// Successful association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    /// Join attempts used; zero when the interface was already up.
    pub attempts: u32,
    pub local_ip: Option<IpAddr>,
}

pub struct ConnectivityManager<N> {
    // ---
    net: N,
    settings: WifiSettings,
}

impl<N: NetworkInterface> ConnectivityManager<N> {
    // ---
    pub fn new(net: N, settings: WifiSettings) -> Self {
        Self { net, settings }
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    /// Bring the interface up and wait for association, blinking `led`.
    ///
    /// The LED is left off on return, whatever the outcome.
    pub async fn connect_blocking<L: StatusLed>(
        &mut self,
        led: &mut L,
    ) -> Result<Association, ConnectivityError> {
        // ---
        self.net.activate();

        let attempts = if self.net.is_associated() {
            0
        } else {
            info!("Connecting to Wi-Fi...");
            let mut ticker = interval(BLINK_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let outcome = self.wait_for_association(led, &mut ticker).await;
            led.set(false);
            outcome?
        };

        let association = Association {
            attempts,
            local_ip: self.net.local_ip(),
        };

        info!("WiFi SSID: {}", self.settings.ssid);
        info!("Wi-Fi connected!");
        match association.local_ip {
            Some(ip) => info!("Local IP: {}", ip),
            None => warn!("Associated but no local IP reported"),
        }

        Ok(association)
    }

    async fn wait_for_association<L: StatusLed>(
        &mut self,
        led: &mut L,
        ticker: &mut Interval,
    ) -> Result<u32, ConnectivityError> {
        // ---
        let max_attempts = self.settings.max_attempts;

        for attempt in 1..=max_attempts {
            // `None` when the timeout is too large to represent: wait without a deadline
            let deadline = Instant::now().checked_add(self.settings.attempt_timeout);

            let joined = {
                let join = self.net.join(&self.settings.ssid, &self.settings.password);
                tokio::pin!(join);
                let expiry = expire_at(deadline);
                tokio::pin!(expiry);

                loop {
                    tokio::select! {
                        res = &mut join => break res,
                        _ = ticker.tick() => led.toggle(),
                        _ = &mut expiry => {
                            break Err(anyhow::anyhow!("join did not complete in time"))
                        }
                    }
                }
            };

            if let Err(e) = joined {
                warn!(attempt, "Wi-Fi join failed: {:#}", e);
            }

            loop {
                if self.net.is_associated() {
                    return Ok(attempt);
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
                ticker.tick().await;
                led.toggle();
            }

            warn!(
                "Wi-Fi association attempt {}/{} timed out after {:?}",
                attempt, max_attempts, self.settings.attempt_timeout
            );
        }

        Err(ConnectivityError::AssociationFailed {
            ssid: self.settings.ssid.clone(),
            attempts: max_attempts,
        })
    }
}

async fn expire_at(deadline: Option<Instant>) {
    // ---
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::{cell::Cell, net::Ipv4Addr};

    /// Associates after `polls_needed` calls to `is_associated`.
    struct FakeNet {
        polls_needed: Option<u32>,
        polls: Cell<u32>,
        joins: u32,
        fail_join: bool,
    }

    impl FakeNet {
        fn associating_after(polls: u32) -> Self {
            Self {
                polls_needed: Some(polls),
                polls: Cell::new(0),
                joins: 0,
                fail_join: false,
            }
        }

        fn never() -> Self {
            Self {
                polls_needed: None,
                polls: Cell::new(0),
                joins: 0,
                fail_join: false,
            }
        }
    }

    impl NetworkInterface for FakeNet {
        fn activate(&mut self) {}

        async fn join(&mut self, _ssid: &str, _password: &str) -> anyhow::Result<()> {
            self.joins += 1;
            if self.fail_join {
                anyhow::bail!("radio busy");
            }
            Ok(())
        }

        fn is_associated(&self) -> bool {
            let n = self.polls.get() + 1;
            self.polls.set(n);
            self.polls_needed.is_some_and(|needed| n > needed)
        }

        fn local_ip(&self) -> Option<IpAddr> {
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42)))
        }
    }

    #[derive(Default)]
    struct FakeLed {
        on: bool,
        toggles: u32,
    }

    impl StatusLed for FakeLed {
        fn set(&mut self, on: bool) {
            self.on = on;
        }

        fn toggle(&mut self) {
            self.on = !self.on;
            self.toggles += 1;
        }
    }

    fn settings() -> WifiSettings {
        WifiSettings {
            ssid: "garden".into(),
            password: "hunter22".into(),
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_associated_skips_join() {
        // ---
        let mut mgr = ConnectivityManager::new(FakeNet::associating_after(0), settings());
        let mut led = FakeLed::default();

        let assoc = mgr.connect_blocking(&mut led).await.unwrap();

        assert_eq!(assoc.attempts, 0);
        assert_eq!(mgr.network().joins, 0);
        assert_eq!(led.toggles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blinks_while_waiting_and_ends_dark() {
        // ---
        // First poll happens before the join, so 5 more polls are spent waiting
        let mut mgr = ConnectivityManager::new(FakeNet::associating_after(6), settings());
        let mut led = FakeLed::default();

        let assoc = mgr.connect_blocking(&mut led).await.unwrap();

        assert_eq!(assoc.attempts, 1);
        assert_eq!(
            assoc.local_ip,
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42)))
        );
        assert!(led.toggles >= 4, "toggled {} times", led.toggles);
        assert!(!led.on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        // ---
        let mut mgr = ConnectivityManager::new(FakeNet::never(), settings());
        let mut led = FakeLed::default();

        let err = mgr.connect_blocking(&mut led).await.unwrap_err();

        assert_eq!(
            err,
            ConnectivityError::AssociationFailed {
                ssid: "garden".into(),
                attempts: 3
            }
        );
        assert_eq!(mgr.network().joins, 3);
        assert!(!led.on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_error_still_polls() {
        // ---
        let mut net = FakeNet::associating_after(3);
        net.fail_join = true;
        let mut mgr = ConnectivityManager::new(net, settings());
        let mut led = FakeLed::default();

        let assoc = mgr.connect_blocking(&mut led).await.unwrap();

        assert_eq!(assoc.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_waits_without_deadline() {
        // ---
        let mut wifi = settings();
        wifi.attempt_timeout = Duration::from_secs(u64::MAX);
        let mut mgr = ConnectivityManager::new(FakeNet::associating_after(50), wifi);
        let mut led = FakeLed::default();

        let assoc = mgr.connect_blocking(&mut led).await.unwrap();

        assert_eq!(assoc.attempts, 1);
        assert_eq!(mgr.network().joins, 1);
        assert!(!led.on);
    }
}
