//! Update coordination on top of an over-the-air updater.
//!
//! Updates are eventually consistent: a newer release is *detected* while the
//! device runs, staged, and only *installed* by the next boot's apply step.
//! The coordinator reduces the updater's two operations to an
//! [`UpdateDecision`]; any positive decision ends the process in a restart.

use std::future::Future;

use tracing::{error, info};

/// External OTA updater.
///
/// How releases are discovered, downloaded and written to storage is the
/// updater's concern; the boot state machine only needs these two answers.
pub trait Updater {
    /// Install a previously staged update. `true` means storage changed and a
    /// restart is required for it to take effect.
    fn apply_pending_if_available(&mut self) -> impl Future<Output = anyhow::Result<bool>>;

    /// Look for a newer release and stage it for the next boot. `true` means
    /// one was found.
    fn check_available_for_next_reboot(&mut self) -> impl Future<Output = anyhow::Result<bool>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    RebootRequired,
    NoUpdate,
}

impl UpdateDecision {
    fn from_flag(flag: bool) -> Self {
        if flag {
            UpdateDecision::RebootRequired
        } else {
            UpdateDecision::NoUpdate
        }
    }
}

pub struct UpdateCoordinator<U> {
    // ---
    updater: U,
}

impl<U: Updater> UpdateCoordinator<U> {
    // ---
    pub fn new(updater: U) -> Self {
        Self { updater }
    }

    pub fn updater(&self) -> &U {
        &self.updater
    }

    /// Boot-time install of an update staged by a previous run.
    ///
    /// Updater failures are logged and treated as "nothing to apply" so a
    /// broken update channel cannot keep the device from sampling.
    pub async fn apply_pending(&mut self) -> UpdateDecision {
        // ---
        match self.updater.apply_pending_if_available().await {
            Ok(applied) => {
                if applied {
                    info!("Staged update installed, restart required");
                }
                UpdateDecision::from_flag(applied)
            }
            Err(e) => {
                error!("Applying staged update failed: {:#}", e);
                UpdateDecision::NoUpdate
            }
        }
    }

    /// Check for a newer release to install on the next boot.
    pub async fn check_for_next_reboot(&mut self) -> UpdateDecision {
        // ---
        match self.updater.check_available_for_next_reboot().await {
            Ok(true) => {
                info!("New version available, restarting to install it");
                UpdateDecision::RebootRequired
            }
            Ok(false) => {
                info!("No new version to update");
                UpdateDecision::NoUpdate
            }
            Err(e) => {
                error!("Update check failed: {:#}", e);
                UpdateDecision::NoUpdate
            }
        }
    }
}
