use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("No WiFi interface found")]
    NoWifiInterfaceFound,

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Interface '{0}' is not a WiFi device")]
    NotWifiInterface(String),

    #[error("Interface '{0}' is busy")]
    InterfaceBusy(String),

    #[error("Failed to execute nmcli: {0}")]
    NmcliExecution(String),

    #[error("Failed to parse nmcli output: {0}")]
    NmcliParse(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Malformed request line: '{0}'")]
    MalformedRequestLine(String),

    #[error("Malformed header line: '{0}'")]
    MalformedHeader(String),

    #[error("Malformed form segment: '{0}'")]
    MalformedFormSegment(String),
}

/// Failure of the socket transport, classified at the transport boundary.
///
/// The portal maps `Timeout` to a `TimedOut` session outcome and everything
/// else to an `Error` outcome. Classification happens where the `io::Error`
/// is observed, never by matching message text.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport timed out")]
    Timeout,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::ConnectionReset,
            _ => TransportError::Other(err.to_string()),
        }
    }
}
