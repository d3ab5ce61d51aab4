//! The in-flight mail transaction carried by a `SessionContext`.

use std::collections::HashMap;

use crate::mailbox::Mailbox;

/// State accumulated across `MAIL FROM` / `RCPT TO` / `DATA`.
///
/// Reset to `MessageTransaction::default()` whenever the session returns to
/// `WaitingForMail` (explicit RSET, successful DATA, or a MAIL that recycles
/// an in-progress transaction).
#[derive(Debug, Clone, Default)]
pub struct MessageTransaction {
    pub from: Option<Mailbox>,
    pub to: Vec<Mailbox>,
    parameters: HashMap<String, String>,
    pub message_bytes: Vec<u8>,
}

impl MessageTransaction {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records a `MAIL FROM` ESMTP parameter. Keys are matched
    /// case-insensitively, per §3's data model.
    pub fn set_param(&mut self, key: &str, value: impl Into<String>) {
        self.parameters.insert(key.to_ascii_uppercase(), value.into());
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(&key.to_ascii_uppercase()).map(String::as_str)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_lookup_is_case_insensitive() {
        let mut tx = MessageTransaction::default();
        tx.set_param("size", "1024");
        assert_eq!(tx.param("SIZE"), Some("1024"));
        assert_eq!(tx.param("Size"), Some("1024"));
    }

    #[test]
    fn reset_clears_everything() {
        let mut tx = MessageTransaction::default();
        tx.from = Some(Mailbox::new("a", "b.com"));
        tx.to.push(Mailbox::new("c", "d.com"));
        tx.message_bytes = vec![1, 2, 3];
        tx.set_param("BODY", "8BITMIME");

        tx.reset();

        assert!(tx.from.is_none());
        assert!(tx.to.is_empty());
        assert!(tx.message_bytes.is_empty());
        assert!(tx.param("BODY").is_none());
    }
}
