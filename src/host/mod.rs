//! Adapters binding the agent's ports to an embedded Linux board.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): each sibling file owns
//! one adapter, and this gateway re-exports only what `main.rs` and the config
//! loader need.

mod adc;
mod github;
mod led;
mod network;
mod reset;

pub use adc::{adc_channel_for_pin, SysfsAdc};
pub use github::{github_release_api_url, GithubUpdater};
pub use led::SysfsLed;
pub use network::HostNetwork;
pub use reset::{ProcessReset, RESTART_EXIT_CODE};
