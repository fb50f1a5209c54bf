//! Station-mode networking on a Linux host.
//!
//! Association is whatever the OS says it is: the interface counts as
//! associated once the kernel has a non-loopback route out. When `manage` is
//! set the join is delegated to NetworkManager through `nmcli`; otherwise the
//! board's own supervisor (wpa_supplicant, systemd-networkd) is assumed to
//! handle the radio.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::connectivity::NetworkInterface;

/// Any routable address works; connecting a UDP socket sends no packets.
const ROUTE_TARGET: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(1, 1, 1, 1), 53));

const NMCLI: &str = "nmcli";

pub struct HostNetwork {
    // ---
    manage: bool,
    route_target: SocketAddr,
    nmcli: PathBuf,
}

impl HostNetwork {
    pub fn new(manage: bool) -> Self {
        Self {
            manage,
            route_target: ROUTE_TARGET,
            nmcli: PathBuf::from(NMCLI),
        }
    }

    /// Run joins through `program` instead of `nmcli` from `PATH`.
    pub fn with_nmcli(mut self, program: impl Into<PathBuf>) -> Self {
        self.nmcli = program.into();
        self
    }

    /// Route lookups towards `target` instead of the public default.
    pub fn with_route_target(mut self, target: SocketAddr) -> Self {
        self.route_target = target;
        self
    }
}

impl NetworkInterface for HostNetwork {
    fn activate(&mut self) {
        debug!(manage = self.manage, "Network interface active");
    }

    async fn join(&mut self, ssid: &str, password: &str) -> Result<()> {
        // ---
        if !self.manage {
            debug!("Association left to the OS network stack");
            return Ok(());
        }

        info!("Asking NetworkManager to join '{}'", ssid);
        // An abandoned attempt must not leave nmcli racing the next one
        let output = Command::new(&self.nmcli)
            .args(["device", "wifi", "connect", ssid, "password", password])
            .kill_on_drop(true)
            .output()
            .await
            .context("running nmcli")?;

        if !output.status.success() {
            bail!(
                "nmcli exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn is_associated(&self) -> bool {
        self.local_ip().is_some()
    }

    fn local_ip(&self) -> Option<IpAddr> {
        // ---
        let bind: SocketAddr = match self.route_target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind).ok()?;
        socket.connect(self.route_target).ok()?;

        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_loopback_route_is_not_association() {
        // ---
        let net = HostNetwork::new(false).with_route_target("127.0.0.1:9".parse().unwrap());

        assert!(!net.is_associated());
        assert_eq!(net.local_ip(), None);
    }

    #[test]
    fn test_unmanaged_join_is_noop() {
        // ---
        let mut net = HostNetwork::new(false);

        assert!(tokio_test::block_on(net.join("garden", "hunter22")).is_ok());
    }

    #[tokio::test]
    async fn test_failed_nmcli_reports_stderr() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "echo 'No network with SSID' >&2\nexit 10\n");
        let mut net = HostNetwork::new(true).with_nmcli(&script);

        let err = net.join("garden", "hunter22").await.unwrap_err().to_string();
        assert!(err.contains("No network with SSID"), "{err}");
    }

    #[tokio::test]
    async fn test_abandoned_join_kills_nmcli() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("nmcli.pid");
        let script = write_script(
            &dir,
            &format!("echo $$ > {}\nexec sleep 30\n", pid_file.display()),
        );
        let mut net = HostNetwork::new(true).with_nmcli(&script);

        let res = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            net.join("garden", "hunter22"),
        )
        .await;
        assert!(res.is_err(), "join should still be running");

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        // Gone, or a zombie awaiting reaping; either way no longer running
        let status = std::fs::read_to_string(format!("/proc/{}/status", pid.trim()));
        let running = status.is_ok_and(|s| {
            s.lines()
                .any(|line| line.starts_with("State:") && !line.contains("zombie"))
        });
        assert!(!running, "nmcli {} outlived its join", pid.trim());
    }

    fn write_script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        // ---
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("nmcli");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
