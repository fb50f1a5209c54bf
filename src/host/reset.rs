//! Restart by handing control back to the service supervisor.

use crate::device::{DeviceReset, RestartReason};

/// `EX_TEMPFAIL`; the systemd unit restarts the agent on this status.
pub const RESTART_EXIT_CODE: i32 = 75;

/// Ends the process so the supervisor starts a fresh image, the host
/// equivalent of `machine.reset()` on a microcontroller.
#[derive(Debug, Default)]
pub struct ProcessReset;

impl DeviceReset for ProcessReset {
    fn reset(&mut self, reason: RestartReason) {
        tracing::info!("Exiting with status {} ({})", RESTART_EXIT_CODE, reason);
        std::process::exit(RESTART_EXIT_CODE);
    }
}
