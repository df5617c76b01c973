//! Response page rendering.
//!
//! Pure string assembly: every response the portal sends is one fixed
//! HTTP/1.1 200 document with a title, a message line, a body line and an
//! optional form block. No state, no failure modes.

/// Form field carrying the network name.
pub const FIELD_SSID: &str = "SSID";
/// Form field carrying the passphrase.
pub const FIELD_PASSWORD: &str = "password";
/// Form field carrying the pressed submit button's value.
pub const FIELD_SUBMIT: &str = "submit_value";
/// Submit value that cancels provisioning.
pub const CANCEL_VALUE: &str = "Cancel";
/// Operator-facing label for the SSID field.
pub const NETWORK_ID_LABEL: &str = "Network ID";

pub const PAGE_TITLE: &str = "Configure WiFi";

/// Renders a complete response: status line, headers, then the HTML
/// document. `form` may be empty to omit the form block entirely.
pub fn render_page(title: &str, message: &str, body: &str, form: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-type: text/html\r\n\
         Connection: close\r\n\
         \r\n\
         <!DOCTYPE html><html>\n\
         <head><title>{title}</title></head>\n\
         <style>body {{background-color: lightblue}} h2 {{color: Red;}}</style>\n\
         <div style=\"display: inline-block; text-align: center; color: Black; align: center; width: 100%\">\n\
         <body><h2>{message}</h2><h3>{body}</h3></body>\n\
         {form}\n\
         </div>\n\
         </html>"
    )
    .into_bytes()
}

/// The credential entry form: SSID, password, and a submit plus a Cancel
/// button sharing the `submit_value` field name.
pub fn credential_form() -> String {
    format!(
        "<form method=\"POST\">\n\
         {NETWORK_ID_LABEL}:<br>\n\
         <input type=\"text\" name=\"{FIELD_SSID}\"><br>\n\
         Password:<br>\n\
         <input type=\"password\" name=\"{FIELD_PASSWORD}\"><br><br>\n\
         <input type=\"submit\" name=\"{FIELD_SUBMIT}\" style=\"background-color:#00FF80\">\n\
         <input type=\"submit\" name=\"{FIELD_SUBMIT}\" value=\"{CANCEL_VALUE}\" style=\"background-color:#D8D8D8\">\n\
         </form>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_has_fixed_headers() {
        let page = render_page(PAGE_TITLE, "", "hello", "");
        let text = String::from_utf8(page).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-type: text/html\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn title_message_and_body_are_substituted() {
        let page = render_page("Configure WiFi", "a message", "a body", "");
        let text = String::from_utf8(page).unwrap();
        assert!(text.contains("<title>Configure WiFi</title>"));
        assert!(text.contains("<h2>a message</h2>"));
        assert!(text.contains("<h3>a body</h3>"));
    }

    #[test]
    fn form_block_is_included_verbatim() {
        let form = credential_form();
        let page = render_page("t", "m", "b", &form);
        let text = String::from_utf8(page).unwrap();
        assert!(text.contains("name=\"SSID\""));
        assert!(text.contains("value=\"Cancel\""));
    }

    #[test]
    fn empty_form_leaves_no_form_tag() {
        let page = render_page("t", "m", "b", "");
        let text = String::from_utf8(page).unwrap();
        assert!(!text.contains("<form"));
    }
}
