//! HTTP request parsing.
//!
//! Turns the raw bytes read from an accepted connection into a structured
//! request, and decodes form-encoded POST bodies into key/value pairs. The
//! parser handles exactly the subset of HTTP/1.1 a provisioning browser
//! produces; anything outside it is a parse error the portal reports
//! in-page.

use std::collections::HashMap;

use crate::error::ProvisionError;

/// One parsed request. Lives for a single accepted connection.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    /// Header fields in arbitrary lookup order; duplicate keys keep the
    /// last occurrence.
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Declared body length, if the client sent a parseable
    /// `Content-Length` header.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.parse().ok())
    }
}

/// Parses the head of a request from `raw` and returns it together with
/// whatever body bytes were already in the buffer.
///
/// The start line must decompose into exactly `method path version`; header
/// lines must contain a `": "` separator. Either violation is a parse
/// error.
pub fn parse_request(raw: &[u8]) -> Result<(HttpRequest, Vec<u8>), ProvisionError> {
    // Body bytes may already trail the head in the first read.
    let (head, remainder) = match find_blank_line(raw) {
        Some(pos) => (&raw[..pos], raw[pos + 4..].to_vec()),
        None => (raw, Vec::new()),
    };
    let head = String::from_utf8_lossy(head);

    let mut lines = head.split("\r\n");
    let start_line = lines.next().unwrap_or("").trim();

    let parts: Vec<&str> = start_line.split(' ').collect();
    let &[method, path, version] = parts.as_slice() else {
        return Err(ProvisionError::MalformedRequestLine(start_line.to_string()));
    };

    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(": ") else {
            return Err(ProvisionError::MalformedHeader(line.to_string()));
        };
        headers.insert(key.to_string(), value.to_string());
    }

    Ok((
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            version: version.to_string(),
            headers,
        },
        remainder,
    ))
}

fn find_blank_line(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Decodes a form-encoded body (`&`-joined `key=value` pairs) into pairs in
/// submission order.
///
/// Any segment without an `=` rejects the whole submission; a partially
/// merged form could otherwise pair one submission's SSID with another's
/// password.
pub fn parse_form(body: &[u8]) -> Result<Vec<(String, String)>, ProvisionError> {
    let text = String::from_utf8_lossy(body);
    let mut pairs = Vec::new();
    for segment in text.split('&') {
        let Some((key, value)) = segment.split_once('=') else {
            return Err(ProvisionError::MalformedFormSegment(segment.to_string()));
        };
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}
