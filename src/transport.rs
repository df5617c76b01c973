//! Socket transport.
//!
//! The portal only sees this seam: a listener that yields blocking
//! connections, one at a time, with an accept deadline. `io::Error`s are
//! classified into [`TransportError`] here, at the boundary, so the portal
//! can tell a timeout from a reset without inspecting message text.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::TransportError;

/// Accepts one connection at a time. The session services each connection
/// fully before asking for the next.
pub trait Listener {
    type Conn: Read + Write;

    /// Waits up to `wait` for the next connection.
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrives in time;
    /// the portal treats that as the end of the session.
    fn accept_within(&mut self, wait: Duration) -> Result<Self::Conn, TransportError>;

    /// Port the listener is bound to, when it has one.
    fn local_port(&self) -> Option<u16> {
        None
    }
}

/// TCP listener for the provisioning portal.
pub struct TcpTransport {
    listener: TcpListener,
    /// Read/write deadline applied to every accepted connection.
    io_timeout: Duration,
}

impl TcpTransport {
    /// Binds to `0.0.0.0:port`. The listener itself is non-blocking so the
    /// accept deadline can be enforced; accepted connections are switched
    /// back to blocking with an I/O timeout.
    pub fn bind(port: u16, io_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        Ok(TcpTransport {
            listener,
            io_timeout,
        })
    }
}

impl Listener for TcpTransport {
    type Conn = TcpStream;

    fn accept_within(&mut self, wait: Duration) -> Result<TcpStream, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {peer}");
                    stream.set_nonblocking(false).map_err(TransportError::from)?;
                    stream
                        .set_read_timeout(Some(self.io_timeout))
                        .map_err(TransportError::from)?;
                    stream
                        .set_write_timeout(Some(self.io_timeout))
                        .map_err(TransportError::from)?;
                    return Ok(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout);
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn local_port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|addr| addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_listener_reports_its_port() {
        let transport = TcpTransport::bind(0, Duration::from_secs(1)).unwrap();
        assert!(transport.local_port().unwrap() > 0);
    }

    #[test]
    fn empty_accept_window_times_out() {
        let mut transport = TcpTransport::bind(0, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            transport.accept_within(Duration::ZERO),
            Err(TransportError::Timeout)
        ));
    }
}
