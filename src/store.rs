//! Collaborator traits the core depends on but never implements itself:
//! the message store, the mailbox filter, and the user authenticator.
//!
//! Per §1, these are external collaborators — the core exposes the
//! interface and drives it at the right point in the protocol, but does
//! not dictate persistence, policy, or credential storage.

use async_trait::async_trait;

use crate::mailbox::Mailbox;
use crate::response::SmtpResponse;
use crate::transaction::MessageTransaction;

/// The three-valued outcome returned by a mailbox filter or user
/// authenticator, per §4.3's filter protocol.
#[derive(Debug, Clone)]
pub enum FilterResult {
    Yes,
    NoTemporarily(Option<SmtpResponse>),
    NoPermanently(Option<SmtpResponse>),
}

impl FilterResult {
    pub fn is_yes(&self) -> bool {
        matches!(self, FilterResult::Yes)
    }
}

/// Accepts or rejects senders and recipients within a single session.
///
/// A fresh instance is produced per session by [`MailboxFilterFactory`], so
/// implementations that are not inherently concurrent-safe can hold
/// ordinary (non-atomic) state.
#[async_trait]
pub trait MailboxFilter: Send {
    async fn accept_from(&mut self, from: Option<&Mailbox>, params: &MessageTransaction) -> FilterResult;
    async fn accept_recipient(&mut self, to: &Mailbox) -> FilterResult;
}

#[async_trait]
pub trait MailboxFilterFactory: Send + Sync {
    fn create(&self) -> Box<dyn MailboxFilter>;
}

/// Persists a completed mail transaction. Returning `Ok(Some(response))`
/// overrides the default `250 Ok`; returning `Err` surfaces as a transient
/// `451` without terminating the session, per §4.3's DATA row.
#[async_trait]
pub trait MessageStore: Send {
    async fn save(&mut self, transaction: &MessageTransaction) -> Result<Option<SmtpResponse>, String>;
}

#[async_trait]
pub trait MessageStoreFactory: Send + Sync {
    fn create(&self) -> Box<dyn MessageStore>;
}

/// Verifies AUTH credentials. A fresh instance is produced per session by
/// [`UserAuthenticatorFactory`].
#[async_trait]
pub trait UserAuthenticator: Send {
    async fn authenticate_plain(&mut self, authorization_id: Option<&str>, authentication_id: &str, password: &str) -> FilterResult;

    async fn authenticate_login(&mut self, username: &str, password: &str) -> FilterResult;
}

#[async_trait]
pub trait UserAuthenticatorFactory: Send + Sync {
    fn create(&self) -> Box<dyn UserAuthenticator>;
}
