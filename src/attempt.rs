//! Station connection attempts.
//!
//! One attempt activates the station role, drops any prior association,
//! initiates a join and then polls the interface status until it resolves
//! or the poll budget runs out. The outcome is summarized as an
//! [`AttemptResult`] the portal folds into its response page.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::error::ProvisionError;
use crate::iface::{ConnectionStatus, NetworkInterface};

/// Timing knobs for one attempt. The defaults poll once per second for 20
/// seconds with a 1 second settle delay between disconnect and connect,
/// matching what consumer access points need to complete a handshake.
#[derive(Debug, Clone)]
pub struct AttemptSettings {
    /// Maximum number of status polls before giving up.
    pub timeout_polls: u32,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Delay between dropping a prior association and connecting.
    pub settle_delay: Duration,
}

impl Default for AttemptSettings {
    fn default() -> Self {
        AttemptSettings {
            timeout_polls: 20,
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Summary of one attempt, consumed immediately by the portal.
#[derive(Debug)]
pub struct AttemptResult {
    pub succeeded: bool,
    pub message: String,
    /// Address assigned by the network, when one was observed.
    pub address: Option<String>,
}

fn msg_timeout(ssid: &str, seconds: u32) -> String {
    format!(
        "Failed to connect to WiFi network '{ssid}' within {seconds} seconds \
         - the password might be wrong."
    )
}

fn msg_now_connected(ssid: &str, address: &str) -> String {
    format!("Connected to WiFi network '{ssid}' with address {address}.")
}

fn msg_not_found(ssid: &str) -> String {
    format!("WiFi network '{ssid}' not found.")
}

fn msg_failed_to_connect(ssid: &str) -> String {
    format!("Failed to connect to WiFi network '{ssid}'")
}

fn msg_bad_password(password: &str, ssid: &str) -> String {
    format!("Error: incorrect password '{password}' for network '{ssid}'")
}

const MSG_NETWORK_IDLE: &str = "Internal Error: network is idle after being activated.";

fn msg_unrecognized_status(code: i32) -> String {
    format!("Internal Error: unrecognized network interface status: {code}")
}

/// Runs one station-join attempt against `sta`.
///
/// The station interface is left active when this returns, whatever the
/// result; a successful association is deliberately not torn down.
/// Radio errors on activation or status polls propagate; a rejected connect
/// initiation counts as a failed attempt, not a fatal error.
pub fn connect_station(
    sta: &mut dyn NetworkInterface,
    ssid: &str,
    password: &str,
    settings: &AttemptSettings,
) -> Result<AttemptResult, ProvisionError> {
    info!("Connecting to network: {ssid}");

    sta.activate(true)?;
    sta.disconnect()?;
    thread::sleep(settings.settle_delay);

    if let Err(e) = sta.connect(ssid, password) {
        let message = format!("{}: {e}", msg_failed_to_connect(ssid));
        info!("{message}");
        return Ok(AttemptResult {
            succeeded: false,
            message,
            address: None,
        });
    }

    // If the loop exhausts its budget we were still connecting at the end.
    let mut message = msg_timeout(ssid, settings.timeout_polls);
    let mut address = None;

    for _ in 0..settings.timeout_polls {
        thread::sleep(settings.poll_interval);
        match sta.status()? {
            ConnectionStatus::Connecting => {
                debug!("still connecting to {ssid}");
                continue;
            }
            ConnectionStatus::GotAddress => {
                let assigned = sta.local_address()?;
                message = msg_now_connected(ssid, &assigned);
                address = Some(assigned);
                break;
            }
            ConnectionStatus::NoAccessPointFound => {
                message = msg_not_found(ssid);
                break;
            }
            ConnectionStatus::ConnectFailed => {
                message = msg_failed_to_connect(ssid);
                break;
            }
            ConnectionStatus::WrongPassword => {
                // Some networks never report this status; they time out
                // instead.
                message = msg_bad_password(password, ssid);
                break;
            }
            ConnectionStatus::Idle => {
                message = MSG_NETWORK_IDLE.to_string();
                break;
            }
            ConnectionStatus::Unrecognized(code) => {
                message = msg_unrecognized_status(code);
                break;
            }
        }
    }

    // The last status seen is advisory; the interface's own connected-state
    // query decides success.
    let succeeded = sta.is_connected()?;
    info!("{message}");

    Ok(AttemptResult {
        succeeded,
        message,
        address,
    })
}
