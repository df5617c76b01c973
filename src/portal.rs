//! The provisioning state machine.
//!
//! A [`Portal`] owns one provisioning session end to end: it brings the
//! access point up, accepts one browser connection at a time, parses and
//! answers each request, runs station-connection attempts for valid
//! submissions, and settles on a terminal [`Outcome`]. The access point is
//! taken down on every exit path, success or not; a successfully connected
//! station is left connected for the caller.
//!
//! Request servicing is strictly sequential blocking I/O: one connection is
//! read, handled and answered before the next accept. A client arriving
//! during a connection attempt waits in the listener's backlog.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::attempt::{AttemptSettings, connect_station};
use crate::error::{ProvisionError, TransportError};
use crate::iface::{ApOptions, NetworkInterface};
use crate::page::{
    CANCEL_VALUE, FIELD_PASSWORD, FIELD_SSID, FIELD_SUBMIT, NETWORK_ID_LABEL, PAGE_TITLE,
    credential_form, render_page,
};
use crate::request::{HttpRequest, parse_form, parse_request};
use crate::transport::Listener;

const MSG_ENTER_INFO: &str = "Please enter your WiFi Info";
const MSG_CANCELLED: &str = "WiFi setup cancelled.";
const MSG_NO_CONTENT_LENGTH: &str = "Browser Error: no content length";

fn msg_already_connected() -> String {
    format!("WiFi is already connected to a network - hit {CANCEL_VALUE} to leave it be.")
}

/// How one provisioning session ended (or that it hasn't yet).
///
/// Starts as `Pending`, is mutated only by the portal, and never changes
/// again once terminal. `Display` renders the descriptor handed back to the
/// caller of the provisioning routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Session still in progress.
    Pending,
    /// Station joined the target network and got this address.
    Connected { address: String },
    /// Operator pressed Cancel after `attempts` connection attempts.
    Cancelled { attempts: u32 },
    /// Nobody talked to the portal within the inactivity timeout.
    TimedOut,
    /// The session died on a transport or radio failure.
    Error { message: String },
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Connected { .. } => write!(f, "connected"),
            Outcome::Cancelled { attempts } => write!(f, "cancelled: attempts={attempts}"),
            Outcome::TimedOut => write!(f, "timeout"),
            Outcome::Error { message } => write!(f, "exception: {message}"),
        }
    }
}

/// A validated SSID/password pair from one submission.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub const MIN_SSID_LEN: usize = 2;
    pub const MIN_PASSWORD_LEN: usize = 4;
}

/// Session-level knobs.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    /// Access-point settings broadcast while provisioning.
    pub ap: ApOptions,
    /// Delay after AP activation before serving, so DHCP comes up.
    pub ap_settle: Duration,
    /// Accept-level timeout; no connection within it ends the session.
    pub inactivity_timeout: Duration,
    /// Timing of each station-connection attempt.
    pub attempt: AttemptSettings,
}

impl Default for PortalSettings {
    fn default() -> Self {
        PortalSettings {
            ap: ApOptions {
                ssid: "WiFi-Setup".to_string(),
                passphrase: None,
            },
            ap_settle: Duration::from_secs(1),
            inactivity_timeout: Duration::from_secs(35),
            attempt: AttemptSettings::default(),
        }
    }
}

/// Anything that kills the whole session, as opposed to the per-request
/// errors the portal reports in-page.
enum Fatal {
    Transport(TransportError),
    Radio(ProvisionError),
}

impl From<TransportError> for Fatal {
    fn from(e: TransportError) -> Self {
        Fatal::Transport(e)
    }
}

impl From<ProvisionError> for Fatal {
    fn from(e: ProvisionError) -> Self {
        Fatal::Radio(e)
    }
}

/// One provisioning session.
pub struct Portal<A: NetworkInterface, S: NetworkInterface> {
    ap: A,
    sta: S,
    settings: PortalSettings,
    /// Form fields accumulated from the current submission; discarded on
    /// validation failure and after failed attempts.
    pending: HashMap<String, String>,
    /// Connection attempts made this session.
    attempts: u32,
    outcome: Outcome,
}

impl<A: NetworkInterface, S: NetworkInterface> Portal<A, S> {
    pub fn new(ap: A, sta: S, settings: PortalSettings) -> Self {
        Portal {
            ap,
            sta,
            settings,
            pending: HashMap::new(),
            attempts: 0,
            outcome: Outcome::Pending,
        }
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Runs the session to its terminal outcome.
    ///
    /// The access point is deactivated before this returns no matter how
    /// the session ends.
    pub fn run<L: Listener>(&mut self, listener: &mut L) -> Outcome {
        if let Err(e) = self.start_access_point() {
            self.outcome = Outcome::Error {
                message: e.to_string(),
            };
        } else {
            self.announce(listener);
            self.accept_loop(listener);
        }

        if let Err(e) = self.ap.activate(false) {
            warn!("failed to deactivate access point: {e}");
        }

        info!("provisioning session ended: {}", self.outcome);
        self.outcome.clone()
    }

    fn start_access_point(&mut self) -> Result<(), ProvisionError> {
        let options = self.settings.ap.clone();
        match self.ap.configure(&options) {
            // A busy interface means the AP is already broadcasting a
            // usable network; keep going with what is there.
            Err(ProvisionError::InterfaceBusy(name)) => {
                warn!("interface '{name}' busy, keeping current AP configuration");
            }
            other => other?,
        }
        self.ap.activate(true)?;
        thread::sleep(self.settings.ap_settle);
        info!("access point '{}' is up", self.settings.ap.ssid);
        Ok(())
    }

    /// Tells the operator where to point the browser: the access point's
    /// own address, not the wildcard the socket was bound on.
    fn announce<L: Listener>(&mut self, listener: &L) {
        match self.ap.local_address() {
            Ok(address) => {
                let port = listener.local_port().unwrap_or(80);
                info!("Now listening on {address}:{port}");
            }
            Err(e) => warn!("could not read access point address: {e}"),
        }
    }

    fn accept_loop<L: Listener>(&mut self, listener: &mut L) {
        while !self.outcome.is_terminal() {
            let conn = match listener.accept_within(self.settings.inactivity_timeout) {
                Ok(conn) => conn,
                Err(TransportError::Timeout) => {
                    self.outcome = Outcome::TimedOut;
                    return;
                }
                Err(e) => {
                    self.outcome = Outcome::Error {
                        message: e.to_string(),
                    };
                    return;
                }
            };

            if let Err(fatal) = self.serve_connection(conn) {
                self.outcome = match fatal {
                    Fatal::Transport(TransportError::Timeout) => Outcome::TimedOut,
                    Fatal::Transport(e) => Outcome::Error {
                        message: e.to_string(),
                    },
                    Fatal::Radio(e) => Outcome::Error {
                        message: e.to_string(),
                    },
                };
                return;
            }
        }
    }

    /// Services one connection: read, handle, respond, close. The response
    /// is always sent, even for requests the parser rejected.
    fn serve_connection<C: Read + Write>(&mut self, mut conn: C) -> Result<(), Fatal> {
        let mut buf = [0u8; 1024];
        let n = conn.read(&mut buf).map_err(TransportError::from)?;

        let page = match parse_request(&buf[..n]) {
            // Fail closed: a request we cannot parse gets the idle page
            // with the error as its banner, and the outcome is untouched.
            Err(e) => {
                warn!("rejected request: {e}");
                render_page(PAGE_TITLE, &e.to_string(), MSG_ENTER_INFO, &credential_form())
            }
            Ok((request, body_start)) => self.handle_request(&mut conn, request, body_start)?,
        };

        conn.write_all(&page).map_err(TransportError::from)?;
        Ok(())
    }

    fn handle_request<C: Read>(
        &mut self,
        conn: &mut C,
        request: HttpRequest,
        body_start: Vec<u8>,
    ) -> Result<Vec<u8>, Fatal> {
        let mut message = String::new();
        if self.sta.is_connected()? {
            message = msg_already_connected();
        }
        let mut body = MSG_ENTER_INFO.to_string();
        let mut form = credential_form();

        if request.method == "POST" {
            match request.content_length() {
                None => {
                    warn!("POST without content length");
                    message = MSG_NO_CONTENT_LENGTH.to_string();
                }
                Some(length) => {
                    let raw_body = read_body(conn, body_start, length)?;
                    match parse_form(&raw_body) {
                        // One bad segment rejects the whole submission; the
                        // buffer keeps whatever it had before.
                        Err(e) => {
                            warn!("rejected form body: {e}");
                            message = e.to_string();
                        }
                        Ok(pairs) => {
                            for (key, value) in pairs {
                                self.pending.insert(key, value);
                            }
                            self.process_submission(&mut message, &mut body, &mut form)?;
                        }
                    }
                }
            }
        }

        Ok(render_page(PAGE_TITLE, &message, &body, &form))
    }

    /// Steps the state machine for one merged submission: cancel, reject,
    /// or attempt.
    fn process_submission(
        &mut self,
        message: &mut String,
        body: &mut String,
        form: &mut String,
    ) -> Result<(), Fatal> {
        if self.pending.get(FIELD_SUBMIT).map(String::as_str) == Some(CANCEL_VALUE) {
            self.outcome = Outcome::Cancelled {
                attempts: self.attempts,
            };
            message.clear();
            *body = MSG_CANCELLED.to_string();
            form.clear();
            return Ok(());
        }

        let credentials = match self.validate_pending() {
            Err(rejection) => {
                *message = rejection;
                self.pending.clear();
                return Ok(());
            }
            Ok(credentials) => credentials,
        };

        self.attempts += 1;
        let result = connect_station(
            &mut self.sta,
            &credentials.ssid,
            &credentials.password,
            &self.settings.attempt,
        )?;

        if result.succeeded {
            let address = match result.address {
                Some(address) => address,
                None => self.sta.local_address()?,
            };
            self.outcome = Outcome::Connected { address };
            *body = result.message;
            form.clear();
        } else {
            *message = result.message;
            self.pending.clear();
        }
        Ok(())
    }

    /// Checks the pending buffer against the validity invariant. The error
    /// message names the first offending field with its submitted value; a
    /// missing field reads as empty.
    fn validate_pending(&self) -> Result<Credentials, String> {
        let ssid = self
            .pending
            .get(FIELD_SSID)
            .map(String::as_str)
            .unwrap_or("");
        let password = self
            .pending
            .get(FIELD_PASSWORD)
            .map(String::as_str)
            .unwrap_or("");

        if ssid.chars().count() < Credentials::MIN_SSID_LEN {
            return Err(format!("Invalid {NETWORK_ID_LABEL}: '{ssid}'"));
        }
        if password.chars().count() < Credentials::MIN_PASSWORD_LEN {
            return Err(format!("Invalid {FIELD_PASSWORD}: '{password}'"));
        }

        Ok(Credentials {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }
}

/// Reads the rest of a declared body: whatever trailed the head in the
/// first read, topped up from the connection until `length` bytes are in
/// hand. Blocks until satisfied or the transport deadline fires.
fn read_body<C: Read>(
    conn: &mut C,
    mut body: Vec<u8>,
    length: usize,
) -> Result<Vec<u8>, TransportError> {
    if body.len() >= length {
        body.truncate(length);
        return Ok(body);
    }
    let mut rest = vec![0u8; length - body.len()];
    conn.read_exact(&mut rest)?;
    body.extend_from_slice(&rest);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::ConnectionStatus;
    use crate::iface::testing::ScriptedInterface;
    use crate::transport::testing::ScriptedListener;

    fn fast_settings() -> PortalSettings {
        PortalSettings {
            ap_settle: Duration::ZERO,
            inactivity_timeout: Duration::from_millis(1),
            attempt: AttemptSettings {
                timeout_polls: 20,
                poll_interval: Duration::ZERO,
                settle_delay: Duration::ZERO,
            },
            ..PortalSettings::default()
        }
    }

    fn post(body: &str) -> Vec<u8> {
        format!(
            "POST / HTTP/1.1\r\nHost: 192.168.4.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    const GET: &[u8] = b"GET / HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n";

    #[test]
    fn valid_submission_connects_and_drops_the_form() {
        let mut sta = ScriptedInterface::new(vec![ConnectionStatus::GotAddress]);
        sta.connected = true;
        sta.address = "192.168.4.77".to_string();
        let mut portal = Portal::new(ScriptedInterface::idle(), sta, fast_settings());
        let mut listener = ScriptedListener::new(vec![post(
            "SSID=HomeNet&password=longpass1&submit_value=Go",
        )]);

        let outcome = portal.run(&mut listener);

        assert_eq!(
            outcome,
            Outcome::Connected {
                address: "192.168.4.77".to_string()
            }
        );
        assert_eq!(portal.attempts, 1);
        let response = listener.response_text(0);
        assert!(response.contains("192.168.4.77"));
        assert!(!response.contains("<form"));
    }

    #[test]
    fn short_ssid_is_rejected_and_outcome_stays_pending() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let mut listener =
            ScriptedListener::new(vec![post("SSID=H&password=longpass1&submit_value=Go")]);

        let conn = listener.accept_within(Duration::ZERO).unwrap();
        portal.serve_connection(conn).ok().unwrap();

        assert_eq!(*portal.outcome(), Outcome::Pending);
        assert!(portal.pending.is_empty());
        assert_eq!(portal.attempts, 0);
        let response = listener.response_text(0);
        assert!(response.contains("Invalid Network ID: 'H'"));
        assert!(response.contains("<form"));
    }

    #[test]
    fn short_password_names_the_password_field() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let mut listener =
            ScriptedListener::new(vec![post("SSID=HomeNet&password=abc&submit_value=Go")]);

        let conn = listener.accept_within(Duration::ZERO).unwrap();
        portal.serve_connection(conn).ok().unwrap();

        assert_eq!(*portal.outcome(), Outcome::Pending);
        assert!(listener.response_text(0).contains("Invalid password: 'abc'"));
    }

    #[test]
    fn cancel_ends_the_session_with_attempt_count() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let mut listener = ScriptedListener::new(vec![post("submit_value=Cancel")]);

        let outcome = portal.run(&mut listener);

        assert_eq!(outcome, Outcome::Cancelled { attempts: 0 });
        let response = listener.response_text(0);
        assert!(response.contains("WiFi setup cancelled."));
        assert!(!response.contains("<form"));
    }

    #[test]
    fn failed_attempt_keeps_the_session_going() {
        let mut sta = ScriptedInterface::new(vec![ConnectionStatus::ConnectFailed]);
        sta.connected = false;
        let mut portal = Portal::new(ScriptedInterface::idle(), sta, fast_settings());
        let mut listener = ScriptedListener::new(vec![
            post("SSID=HomeNet&password=longpass1&submit_value=Go"),
            post("submit_value=Cancel"),
        ]);

        let outcome = portal.run(&mut listener);

        // The failed attempt still counts toward the cancel tally.
        assert_eq!(outcome, Outcome::Cancelled { attempts: 1 });
        let first = listener.response_text(0);
        assert!(first.contains("Failed to connect to WiFi network 'HomeNet'"));
        assert!(first.contains("<form"));
    }

    #[test]
    fn get_serves_the_form() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let mut listener = ScriptedListener::new(vec![GET.to_vec()]);

        let conn = listener.accept_within(Duration::ZERO).unwrap();
        portal.serve_connection(conn).ok().unwrap();

        let response = listener.response_text(0);
        assert!(response.contains("<form"));
        assert!(response.contains("Please enter your WiFi Info"));
        assert!(!response.contains("already connected"));
    }

    #[test]
    fn get_warns_when_station_already_connected() {
        let mut sta = ScriptedInterface::idle();
        sta.connected = true;
        let mut portal = Portal::new(ScriptedInterface::idle(), sta, fast_settings());
        let mut listener = ScriptedListener::new(vec![GET.to_vec()]);

        let conn = listener.accept_within(Duration::ZERO).unwrap();
        portal.serve_connection(conn).ok().unwrap();

        let response = listener.response_text(0);
        assert!(response.contains("WiFi is already connected to a network"));
        assert!(response.contains("<form"));
    }

    #[test]
    fn post_without_content_length_is_a_browser_error() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let raw = b"POST / HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n".to_vec();
        let mut listener = ScriptedListener::new(vec![raw]);

        let conn = listener.accept_within(Duration::ZERO).unwrap();
        portal.serve_connection(conn).ok().unwrap();

        assert_eq!(*portal.outcome(), Outcome::Pending);
        let response = listener.response_text(0);
        assert!(response.contains("Browser Error: no content length"));
        assert!(response.contains("<form"));
    }

    #[test]
    fn malformed_request_gets_an_error_banner() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let mut listener = ScriptedListener::new(vec![b"BOGUS\r\n\r\n".to_vec()]);

        let conn = listener.accept_within(Duration::ZERO).unwrap();
        portal.serve_connection(conn).ok().unwrap();

        assert_eq!(*portal.outcome(), Outcome::Pending);
        let response = listener.response_text(0);
        assert!(response.contains("Malformed request line"));
        assert!(response.contains("<form"));
    }

    #[test]
    fn malformed_form_segment_rejects_the_whole_submission() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let mut listener = ScriptedListener::new(vec![post("SSID=HomeNet&junk")]);

        let conn = listener.accept_within(Duration::ZERO).unwrap();
        portal.serve_connection(conn).ok().unwrap();

        assert_eq!(*portal.outcome(), Outcome::Pending);
        assert!(portal.pending.is_empty());
        assert!(listener.response_text(0).contains("Malformed form segment"));
    }

    #[test]
    fn busy_ap_configuration_keeps_the_session_going() {
        let mut ap = ScriptedInterface::idle();
        ap.configure_error = Some(ProvisionError::InterfaceBusy("wlan0".to_string()));
        let mut portal = Portal::new(ap, ScriptedInterface::idle(), fast_settings());

        let outcome = portal.run(&mut ScriptedListener::new(vec![]));

        // The session reached the accept loop and timed out there; the AP
        // was activated with its existing configuration.
        assert_eq!(outcome, Outcome::TimedOut);
        assert_eq!(portal.ap.deactivations, 1);
    }

    #[test]
    fn fatal_ap_configuration_error_still_deactivates_the_ap() {
        let mut ap = ScriptedInterface::idle();
        ap.configure_error = Some(ProvisionError::NmcliExecution(
            "hotspot rejected".to_string(),
        ));
        let mut portal = Portal::new(ap, ScriptedInterface::idle(), fast_settings());

        let outcome = portal.run(&mut ScriptedListener::new(vec![]));

        assert!(matches!(outcome, Outcome::Error { .. }));
        assert_eq!(portal.ap.deactivations, 1);
    }

    #[test]
    fn session_start_announces_the_access_point_address() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        portal.run(&mut ScriptedListener::new(vec![]));
        assert!(portal.ap.address_queries >= 1);
    }

    #[test]
    fn idle_session_times_out() {
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        let mut listener = ScriptedListener::new(vec![]);

        let outcome = portal.run(&mut listener);
        assert_eq!(outcome, Outcome::TimedOut);
    }

    #[test]
    fn access_point_is_deactivated_on_every_exit_path() {
        // Timeout path.
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        portal.run(&mut ScriptedListener::new(vec![]));
        assert_eq!(portal.ap.deactivations, 1);

        // Success path.
        let mut sta = ScriptedInterface::new(vec![ConnectionStatus::GotAddress]);
        sta.connected = true;
        let mut portal = Portal::new(ScriptedInterface::idle(), sta, fast_settings());
        portal.run(&mut ScriptedListener::new(vec![post(
            "SSID=HomeNet&password=longpass1&submit_value=Go",
        )]));
        assert_eq!(portal.ap.deactivations, 1);

        // Cancel path.
        let mut portal = Portal::new(
            ScriptedInterface::idle(),
            ScriptedInterface::idle(),
            fast_settings(),
        );
        portal.run(&mut ScriptedListener::new(vec![post("submit_value=Cancel")]));
        assert_eq!(portal.ap.deactivations, 1);
    }

    #[test]
    fn station_stays_active_after_success() {
        let mut sta = ScriptedInterface::new(vec![ConnectionStatus::GotAddress]);
        sta.connected = true;
        let mut portal = Portal::new(ScriptedInterface::idle(), sta, fast_settings());
        portal.run(&mut ScriptedListener::new(vec![post(
            "SSID=HomeNet&password=longpass1&submit_value=Go",
        )]));
        assert!(portal.sta.active);
        assert_eq!(portal.sta.deactivations, 0);
    }

    #[test]
    fn outcome_descriptors_render() {
        assert_eq!(Outcome::Pending.to_string(), "pending");
        assert_eq!(
            Outcome::Connected {
                address: "10.0.0.2".into()
            }
            .to_string(),
            "connected"
        );
        assert_eq!(
            Outcome::Cancelled { attempts: 3 }.to_string(),
            "cancelled: attempts=3"
        );
        assert_eq!(Outcome::TimedOut.to_string(), "timeout");
        assert_eq!(
            Outcome::Error {
                message: "boom".into()
            }
            .to_string(),
            "exception: boom"
        );
    }
}
