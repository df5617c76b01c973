//! Radio interface facade.
//!
//! This module defines the contract the portal uses to drive the two radio
//! roles (access point and station). Production code talks to NetworkManager
//! through [`crate::nmcli::NmcliInterface`]; tests substitute a scripted
//! double. The portal never touches a socket or spawns a process through
//! anything but this trait.

use crate::error::ProvisionError;

/// Snapshot of a station interface's association state, taken once per poll.
///
/// Mirrors the status codes a Wi-Fi supplicant reports while joining a
/// network. Codes the backend does not recognize are carried through as
/// [`ConnectionStatus::Unrecognized`] so they can be surfaced to the operator
/// verbatim rather than silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Interface is up but has no association in progress.
    Idle,
    /// Association/authentication/DHCP still in progress.
    Connecting,
    /// Fully associated with an address assigned.
    GotAddress,
    /// No access point with the requested SSID was found.
    NoAccessPointFound,
    /// Association failed for an unspecified reason.
    ConnectFailed,
    /// The access point rejected the credentials.
    ///
    /// Not all radios report this distinctly; many time out instead.
    WrongPassword,
    /// A status code this crate does not know about.
    Unrecognized(i32),
}

/// Settings applied to the access-point role before activation.
#[derive(Debug, Clone)]
pub struct ApOptions {
    /// SSID the device broadcasts while provisioning.
    pub ssid: String,
    /// WPA2 passphrase; `None` leaves the network open.
    pub passphrase: Option<String>,
}

/// One radio role (access point or station) as the portal sees it.
///
/// Implementations are expected to block: `connect` initiates the attempt
/// and returns, `status` reports a fresh snapshot each call.
pub trait NetworkInterface {
    /// Bring the interface up or down.
    fn activate(&mut self, up: bool) -> Result<(), ProvisionError>;

    /// Apply access-point settings. Only meaningful for the AP role.
    fn configure(&mut self, options: &ApOptions) -> Result<(), ProvisionError>;

    /// Begin associating with `ssid` using `password`. Returns once the
    /// attempt is initiated; progress is observed through `status`.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), ProvisionError>;

    /// Drop the current association, if any.
    fn disconnect(&mut self) -> Result<(), ProvisionError>;

    /// Current association state.
    fn status(&mut self) -> Result<ConnectionStatus, ProvisionError>;

    /// Whether the interface holds a working association right now.
    fn is_connected(&mut self) -> Result<bool, ProvisionError>;

    /// Address assigned to the interface, e.g. "192.168.1.7".
    fn local_address(&mut self) -> Result<String, ProvisionError>;
}
