//! Wire-format SMTP responses: `NNN[SP|-]text CRLF`, possibly multiline.

use std::fmt;

/// A complete SMTP reply, one or more lines sharing the same status code.
///
/// All but the final line are joined to the code with `-`; the final line
/// uses a single space, per RFC 5321 §4.2.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpResponse {
    /// Builds a single-line response. Panics in debug builds if `code` is
    /// outside the valid 200..=599 wire range, since that would violate the
    /// crate's own invariant that every response carries a valid status.
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        debug_assert!((200..=599).contains(&code), "invalid SMTP status code {code}");
        Self { code, lines: vec![text.into()] }
    }

    /// Builds a multiline response from an ordered list of text lines.
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        debug_assert!((200..=599).contains(&code), "invalid SMTP status code {code}");
        debug_assert!(!lines.is_empty(), "multiline response needs at least one line");
        Self { code, lines }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Renders the response as it goes on the wire, CRLF-terminated.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            out.push_str(&self.code.to_string());
            out.push(sep);
            out.push_str(line);
            out.push_str("\r\n");
        }
        out
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire().trim_end())
    }
}

// Common replies used throughout `command` and `session`.
impl SmtpResponse {
    pub fn syntax_error() -> Self {
        Self::new(500, "Syntax error, command unrecognized")
    }

    pub fn syntax_error_in_parameters() -> Self {
        Self::new(501, "Syntax error in parameters or arguments")
    }

    pub fn bad_sequence(expected: &[&str]) -> Self {
        Self::new(503, format!("Bad sequence of commands, expected {}", expected.join("/")))
    }

    pub fn command_not_implemented() -> Self {
        Self::new(502, "Command not implemented")
    }

    pub fn ok() -> Self {
        Self::new(250, "Ok")
    }

    pub fn too_many_errors() -> Self {
        Self::new(421, "Too many bad commands, closing connection")
    }

    pub fn timeout() -> Self {
        Self::new(421, "Timeout waiting for command")
    }

    pub fn line_too_long() -> Self {
        Self::new(500, "Line too long")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_uses_space_separator() {
        let r = SmtpResponse::new(250, "Ok");
        assert_eq!(r.to_wire(), "250 Ok\r\n");
    }

    #[test]
    fn multiline_uses_dash_then_space() {
        let r = SmtpResponse::multiline(250, vec!["localhost".into(), "PIPELINING".into()]);
        assert_eq!(r.to_wire(), "250-localhost\r\n250 PIPELINING\r\n");
    }

    #[test]
    fn every_status_in_range() {
        for code in [200u16, 250, 354, 421, 500, 599] {
            let r = SmtpResponse::new(code, "x");
            assert!((200..=599).contains(&r.code));
        }
    }
}
