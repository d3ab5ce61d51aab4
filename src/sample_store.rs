//! A minimal file-backed [`MessageStore`] and allow-list [`MailboxFilter`]
//! used by the sample binary and integration tests to exercise the
//! collaborator traits end to end. Not part of the core's public contract
//! — a real deployment brings its own store and filter (§1).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::mailbox::Mailbox;
use crate::response::SmtpResponse;
use crate::store::{FilterResult, MailboxFilter, MailboxFilterFactory, MessageStore, MessageStoreFactory};
use crate::transaction::MessageTransaction;

/// Accepts mail only for the addresses named in `allowed_recipients`,
/// matched case-insensitively.
pub struct AllowListFilter {
    allowed_recipients: Arc<Vec<String>>,
}

#[async_trait]
impl MailboxFilter for AllowListFilter {
    async fn accept_from(&mut self, _from: Option<&Mailbox>, _tx: &MessageTransaction) -> FilterResult {
        FilterResult::Yes
    }

    async fn accept_recipient(&mut self, to: &Mailbox) -> FilterResult {
        let address = to.to_string().to_ascii_lowercase();
        if self.allowed_recipients.iter().any(|allowed| *allowed == address) {
            FilterResult::Yes
        } else {
            FilterResult::NoPermanently(Some(SmtpResponse::new(550, "No such user here")))
        }
    }
}

pub struct AllowListFilterFactory {
    allowed_recipients: Arc<Vec<String>>,
}

impl AllowListFilterFactory {
    pub fn new(allowed_recipients: Vec<String>) -> Self {
        Self { allowed_recipients: Arc::new(allowed_recipients) }
    }
}

impl MailboxFilterFactory for AllowListFilterFactory {
    fn create(&self) -> Box<dyn MailboxFilter> {
        Box::new(AllowListFilter { allowed_recipients: Arc::clone(&self.allowed_recipients) })
    }
}

/// Writes each accepted message to `<maildir>/<unix-timestamp>-<counter>.eml`.
/// Intentionally simple: no Maildir `tmp`/`new`/`cur` dance, since this is a
/// sample collaborator, not a mail store implementation this crate ships.
pub struct MaildirStore {
    maildir: PathBuf,
}

#[async_trait]
impl MessageStore for MaildirStore {
    async fn save(&mut self, transaction: &MessageTransaction) -> Result<Option<SmtpResponse>, String> {
        tokio::fs::create_dir_all(&self.maildir).await.map_err(|e| e.to_string())?;

        let recipients: Vec<String> = transaction.to.iter().map(|m| m.to_string()).collect();
        let sender = transaction.from.as_ref().map(|m| m.to_string()).unwrap_or_else(|| "<>".to_string());

        let mut contents = Vec::new();
        contents.extend_from_slice(format!("X-Smtp-Laser-From: {sender}\r\n").as_bytes());
        contents.extend_from_slice(format!("X-Smtp-Laser-To: {}\r\n", recipients.join(", ")).as_bytes());
        contents.extend_from_slice(&transaction.message_bytes);

        let file_name = format!("{}.eml", uuid_like_name());
        let path = self.maildir.join(file_name);
        if let Err(e) = tokio::fs::write(&path, &contents).await {
            warn!(error = %e, path = %path.display(), "failed to persist message");
            return Err(e.to_string());
        }
        Ok(None)
    }
}

fn uuid_like_name() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("msg-{n:016x}")
}

pub struct MaildirStoreFactory {
    maildir: PathBuf,
}

impl MaildirStoreFactory {
    pub fn new(maildir: PathBuf) -> Self {
        Self { maildir }
    }
}

impl MessageStoreFactory for MaildirStoreFactory {
    fn create(&self) -> Box<dyn MessageStore> {
        Box::new(MaildirStore { maildir: self.maildir.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_list_accepts_configured_recipient() {
        let mut filter = AllowListFilterFactory::new(vec!["alice@example.com".into()]).create();
        let result = filter.accept_recipient(&Mailbox::new("alice", "example.com")).await;
        assert!(result.is_yes());
    }

    #[tokio::test]
    async fn allow_list_rejects_unknown_recipient() {
        let mut filter = AllowListFilterFactory::new(vec!["alice@example.com".into()]).create();
        let result = filter.accept_recipient(&Mailbox::new("bob", "example.com")).await;
        assert!(!result.is_yes());
    }

    #[tokio::test]
    async fn maildir_store_writes_a_file() {
        let dir = std::env::temp_dir().join(format!("smtp-laser-test-{}", uuid_like_name()));
        let mut store = MaildirStoreFactory::new(dir.clone()).create();
        let mut tx = MessageTransaction::default();
        tx.from = Some(Mailbox::new("alice", "example.com"));
        tx.to.push(Mailbox::new("bob", "example.com"));
        tx.message_bytes = b"Subject: hi\r\n\r\nbody\r\n".to_vec();

        store.save(&tx).await.unwrap();

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        let entry = entries.next_entry().await.unwrap();
        assert!(entry.is_some());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
