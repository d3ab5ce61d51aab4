//! Per-connection session state: everything that varies between one
//! client's conversation and the next, per §3's "Session context" record.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::options::{EndpointDefinition, ServerOptions};
use crate::session::io::NetworkClient;
use crate::state::State;
use crate::store::{MailboxFilter, MessageStore, UserAuthenticator};
use crate::transaction::MessageTransaction;

/// Everything the session loop and command handlers need to carry across
/// one TCP connection's lifetime. Not `Clone`: a session context owns its
/// collaborators and its transport exclusively.
pub struct SessionContext {
    pub connection_id: u64,
    pub options: Arc<ServerOptions>,
    pub endpoint: EndpointDefinition,
    pub remote_endpoint: SocketAddr,
    pub network: NetworkClient,
    pub state: State,
    pub transaction: MessageTransaction,
    pub helo_domain: Option<String>,
    pub authenticated_user: Option<String>,
    pub retry_count: u32,
    pub authentication_attempts: u32,
    pub properties: HashMap<String, String>,
    pub store: Box<dyn MessageStore>,
    pub filter: Box<dyn MailboxFilter>,
    pub authenticator: Option<Box<dyn UserAuthenticator>>,
}

impl SessionContext {
    pub fn new(
        connection_id: u64,
        options: Arc<ServerOptions>,
        endpoint: EndpointDefinition,
        remote_endpoint: SocketAddr,
        network: NetworkClient,
    ) -> Self {
        let store = options.message_store_factory.create();
        let filter = options.mailbox_filter_factory.create();
        let authenticator = options.user_authenticator_factory.as_ref().map(|f| f.create());
        Self {
            connection_id,
            options,
            endpoint,
            remote_endpoint,
            network,
            state: State::Initialized,
            transaction: MessageTransaction::default(),
            helo_domain: None,
            authenticated_user: None,
            retry_count: 0,
            authentication_attempts: 0,
            properties: HashMap::new(),
            store,
            filter,
            authenticator,
        }
    }

    /// RSET: clears the in-progress transaction and returns to
    /// `WaitingForMail`, per §4.3's RSET row. HELO state and authentication
    /// survive a reset.
    pub fn reset_transaction(&mut self) {
        self.transaction.reset();
        self.state = State::WaitingForMail;
    }

    /// A failed command increments the retry counter; the session loop
    /// terminates with `421` once [`ServerOptions::max_retry_count`] is
    /// exceeded, per §4.5.
    pub fn register_error(&mut self) -> bool {
        self.retry_count += 1;
        self.retry_count > self.options.max_retry_count
    }

    /// Resets the error-retry counter, per §3's "retryCount ... resets on
    /// any successful command".
    pub fn record_success(&mut self) {
        self.retry_count = 0;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user.is_some()
    }
}
