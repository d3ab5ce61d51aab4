//! The `Mailbox` value type shared by `MAIL FROM` and `RCPT TO`.

use std::fmt;

/// A parsed SMTP mailbox: `local@domain`.
///
/// `domain` is stored exactly as written on the wire, including brackets
/// for address literals (`[192.0.2.1]`, `[IPv6:2001:db8::1]`), since the
/// grammar already validated its shape before a `Mailbox` is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    pub local: String,
    pub domain: String,
}

impl Mailbox {
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self { local: local.into(), domain: domain.into() }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}
