//! Wi-Fi Provisioning Portal Library
//!
//! This library provisions Wi-Fi credentials for a headless device: it
//! temporarily runs a wireless access point, serves a minimal credential
//! form over HTTP, joins the submitted network as a station and reports
//! the outcome to the caller.
//!
//! # Modules
//!
//! - [`attempt`] - One bounded station-connection attempt with status polling
//! - [`config`] - Portal settings file (AP name, port, timeouts)
//! - [`error`] - Custom error types for the library
//! - [`iface`] - Radio interface facade shared by both radio roles
//! - [`nmcli`] - NetworkManager-backed radio implementation
//! - [`page`] - Response page rendering
//! - [`portal`] - The provisioning state machine
//! - [`request`] - HTTP request and form-body parsing
//! - [`transport`] - Blocking socket transport
//!
//! # Example Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use wifi_provision::{Portal, PortalSettings};
//! use wifi_provision::nmcli::NmcliInterface;
//! use wifi_provision::transport::TcpTransport;
//!
//! let settings = PortalSettings::default();
//! let ap = NmcliInterface::access_point("wlan0", settings.ap.clone());
//! let sta = NmcliInterface::station("wlan0");
//!
//! let mut listener = TcpTransport::bind(80, Duration::from_secs(10)).expect("bind failed");
//! let mut portal = Portal::new(ap, sta, settings);
//!
//! // Blocks until the session reaches a terminal outcome.
//! let outcome = portal.run(&mut listener);
//! println!("{outcome}");
//! ```

/// Attempt module running one station-join with bounded status polling.
pub mod attempt;

/// Configuration module for the portal's own settings.
/// Handles reading/writing the TOML config file.
pub mod config;

/// Error module defining custom error types for the library.
/// Uses `thiserror` for ergonomic error handling.
pub mod error;

/// Interface module defining the radio facade the portal drives.
pub mod iface;

/// NetworkManager module implementing the radio facade with `nmcli`.
pub mod nmcli;

/// Page module rendering the portal's fixed HTML responses.
pub mod page;

/// Portal module owning the provisioning session state machine.
pub mod portal;

/// Request module parsing raw request bytes and form bodies.
pub mod request;

/// Transport module providing the blocking listener seam and its TCP
/// implementation.
pub mod transport;

// Re-export the session types most callers need.
pub use portal::{Credentials, Outcome, Portal, PortalSettings};

// Re-export the main error types for library users.
pub use error::{ProvisionError, TransportError};

// Re-export the radio facade contract.
pub use iface::{ApOptions, ConnectionStatus, NetworkInterface};

// Re-export attempt types for callers tuning the poll budget.
pub use attempt::{AttemptResult, AttemptSettings};
