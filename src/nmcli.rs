//! NetworkManager-backed radio interface.
//!
//! Implements [`NetworkInterface`] for both radio roles on top of the
//! `nmcli` command-line tool: the access-point role runs a hotspot on the
//! chosen device, the station role joins the network the operator submitted.
//!
//! # Requirements
//!
//! - NetworkManager must be installed and running
//! - The `nmcli` command must be available in PATH
//! - User must have permission to manage network connections

use serde::Serialize;
use std::process::Command;

use crate::error::ProvisionError;
use crate::iface::{ApOptions, ConnectionStatus, NetworkInterface};

/// Which radio role an [`NmcliInterface`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    AccessPoint,
    Station,
}

/// A Wi-Fi device managed through `nmcli`.
///
/// One instance per role; the same physical device may back both when the
/// hardware supports simultaneous AP+STA operation.
pub struct NmcliInterface {
    name: String,
    role: Role,
    ap_options: Option<ApOptions>,
    active: bool,
}

impl NmcliInterface {
    /// Station role on the named device.
    pub fn station(name: &str) -> Self {
        NmcliInterface {
            name: name.to_string(),
            role: Role::Station,
            ap_options: None,
            active: false,
        }
    }

    /// Access-point role on the named device, broadcasting `options.ssid`.
    pub fn access_point(name: &str, options: ApOptions) -> Self {
        NmcliInterface {
            name: name.to_string(),
            role: Role::AccessPoint,
            ap_options: Some(options),
            active: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn start_hotspot(&self) -> Result<(), ProvisionError> {
        let options = self
            .ap_options
            .as_ref()
            .ok_or_else(|| ProvisionError::ConnectionFailed("hotspot not configured".into()))?;

        let mut args = vec![
            "device".to_string(),
            "wifi".to_string(),
            "hotspot".to_string(),
            "ifname".to_string(),
            self.name.clone(),
            "ssid".to_string(),
            options.ssid.clone(),
        ];
        if let Some(ref passphrase) = options.passphrase {
            args.push("password".to_string());
            args.push(passphrase.clone());
        }

        nmcli(&args.iter().map(String::as_str).collect::<Vec<_>>())?;
        Ok(())
    }
}

impl NetworkInterface for NmcliInterface {
    fn activate(&mut self, up: bool) -> Result<(), ProvisionError> {
        if up {
            match self.role {
                Role::AccessPoint => self.start_hotspot()?,
                // Stations only need the radio enabled; association is a
                // separate `connect` step.
                Role::Station => {
                    nmcli(&["radio", "wifi", "on"])?;
                }
            }
            self.active = true;
        } else {
            nmcli(&["device", "disconnect", self.name.as_str()])?;
            self.active = false;
        }
        Ok(())
    }

    fn configure(&mut self, options: &ApOptions) -> Result<(), ProvisionError> {
        // A live hotspot cannot change SSID or auth settings in place.
        if self.active && self.role == Role::AccessPoint {
            return Err(ProvisionError::InterfaceBusy(self.name.clone()));
        }
        self.ap_options = Some(options.clone());
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), ProvisionError> {
        // --wait 0 initiates the association and returns immediately; the
        // caller polls `status` for the result.
        nmcli(&[
            "--wait",
            "0",
            "device",
            "wifi",
            "connect",
            ssid,
            "password",
            password,
            "ifname",
            self.name.as_str(),
        ])?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ProvisionError> {
        nmcli(&["device", "disconnect", self.name.as_str()])?;
        Ok(())
    }

    fn status(&mut self) -> Result<ConnectionStatus, ProvisionError> {
        let report = device_report(&self.name)?;
        let code = parse_state_code(&report.state)?;
        Ok(status_from_state_code(code))
    }

    fn is_connected(&mut self) -> Result<bool, ProvisionError> {
        let report = device_report(&self.name)?;
        Ok(parse_state_code(&report.state)? == NM_STATE_ACTIVATED)
    }

    fn local_address(&mut self) -> Result<String, ProvisionError> {
        let report = device_report(&self.name)?;
        let address = report.ip_address.ok_or_else(|| {
            ProvisionError::ConnectionFailed(format!("no address on interface {}", self.name))
        })?;
        // nmcli reports CIDR notation ("192.168.1.7/24"); callers want the
        // bare address.
        Ok(address.split('/').next().unwrap_or(&address).to_string())
    }
}

// NetworkManager device state codes (GENERAL.STATE).
const NM_STATE_ACTIVATED: i32 = 100;

/// Maps a NetworkManager device state code to a [`ConnectionStatus`].
///
/// The prepare/config/ip-config/ip-check/secondaries phases (40-90 except
/// 60) all count as `Connecting`; 60 is need-auth, the closest NM gets to
/// reporting a bad passphrase.
pub fn status_from_state_code(code: i32) -> ConnectionStatus {
    match code {
        10 | 20 | 30 | 110 => ConnectionStatus::Idle,
        40 | 50 | 70 | 80 | 90 => ConnectionStatus::Connecting,
        60 => ConnectionStatus::WrongPassword,
        100 => ConnectionStatus::GotAddress,
        120 => ConnectionStatus::ConnectFailed,
        other => ConnectionStatus::Unrecognized(other),
    }
}

/// Extracts the numeric code from an nmcli state string like
/// "100 (connected)".
fn parse_state_code(state: &str) -> Result<i32, ProvisionError> {
    state
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProvisionError::NmcliParse(format!("unrecognized state '{state}'")))
}

/// Snapshot of one device as reported by `nmcli device show`.
#[derive(Debug, Serialize)]
pub struct DeviceReport {
    /// Device name (e.g. "wlan1").
    pub interface: String,
    /// Raw state string from nmcli (e.g. "100 (connected)").
    pub state: String,
    /// Active connection profile name, if any.
    pub connection: Option<String>,
    /// Primary IPv4 address with CIDR notation, if assigned.
    pub ip_address: Option<String>,
    /// IPv4 gateway address, if configured.
    pub gateway: Option<String>,
}

/// Queries NetworkManager for the named device's state, active connection,
/// address and gateway.
pub fn device_report(interface: &str) -> Result<DeviceReport, ProvisionError> {
    let stdout = nmcli(&["-t", "device", "show", interface])?;
    Ok(parse_device_show(interface, &stdout))
}

fn parse_device_show(interface: &str, stdout: &str) -> DeviceReport {
    let mut report = DeviceReport {
        interface: interface.to_string(),
        state: "unknown".to_string(),
        connection: None,
        ip_address: None,
        gateway: None,
    };

    for line in stdout.lines() {
        // Terse output is KEY:VALUE; values may themselves contain colons.
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        match key {
            "GENERAL.STATE" => report.state = value.to_string(),
            "GENERAL.CONNECTION" => {
                if !value.is_empty() && value != "--" {
                    report.connection = Some(value.to_string());
                }
            }
            "IP4.ADDRESS[1]" => report.ip_address = Some(value.to_string()),
            "IP4.GATEWAY" => {
                if !value.is_empty() && value != "--" {
                    report.gateway = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    report
}

/// Prints a device report in a human-readable layout.
pub fn display_report(report: &DeviceReport) {
    println!("Interface: {}", report.interface);
    println!("State:     {}", report.state);
    if let Some(ref conn) = report.connection {
        println!("Connected: {}", conn);
    } else {
        println!("Connected: (none)");
    }
    if let Some(ref ip) = report.ip_address {
        println!("IP:        {}", ip);
    }
    if let Some(ref gw) = report.gateway {
        println!("Gateway:   {}", gw);
    }
}

/// A Wi-Fi capable device known to NetworkManager.
#[derive(Debug, Clone)]
pub struct WifiDevice {
    pub name: String,
    pub state: String,
}

/// Lists all Wi-Fi devices on the system.
pub fn list_wifi_interfaces() -> Result<Vec<WifiDevice>, ProvisionError> {
    let stdout = nmcli(&["-t", "-f", "DEVICE,TYPE,STATE", "device"])?;
    Ok(parse_device_list(&stdout))
}

fn parse_device_list(stdout: &str) -> Vec<WifiDevice> {
    let mut devices = Vec::new();
    for line in stdout.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3 && parts[1] == "wifi" {
            devices.push(WifiDevice {
                name: parts[0].to_string(),
                state: parts[2].to_string(),
            });
        }
    }
    devices
}

/// Resolves an interface name: the one given, or the first Wi-Fi device
/// found when none was.
pub fn resolve_interface(name: Option<&str>) -> Result<WifiDevice, ProvisionError> {
    let devices = list_wifi_interfaces()?;
    match name {
        Some(name) => devices
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ProvisionError::InterfaceNotFound(name.to_string())),
        None => devices
            .into_iter()
            .next()
            .ok_or(ProvisionError::NoWifiInterfaceFound),
    }
}

/// Runs nmcli with the given arguments and returns its stdout.
fn nmcli(args: &[&str]) -> Result<String, ProvisionError> {
    let output = Command::new("nmcli")
        .args(args)
        .output()
        .map_err(|e| ProvisionError::NmcliExecution(e.to_string()))?;

    if !output.status.success() {
        // Prefer stderr for the failure text; some nmcli errors land on
        // stdout instead.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() {
            stdout.to_string()
        } else {
            stderr.to_string()
        };
        return Err(ProvisionError::NmcliExecution(message));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
