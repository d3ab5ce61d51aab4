//! Immutable server and endpoint configuration, per §3's "Server options"
//! and "Endpoint definition" records.
//!
//! Built once via [`ServerOptionsBuilder`] and shared read-only across every
//! session; there is no deferred mutation once a server is started, per §9.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::parser::AuthMechanism;
use crate::server::ServerEvents;
use crate::store::{MailboxFilterFactory, MessageStoreFactory, UserAuthenticatorFactory};

/// One TCP listening endpoint.
#[derive(Clone)]
pub struct EndpointDefinition {
    pub address: IpAddr,
    pub port: u16,
    pub read_timeout: Duration,
    pub is_secure: bool,
    pub tls_config: Option<Arc<rustls::ServerConfig>>,
    pub allow_unsecure_authentication: bool,
    /// Whether connections on this endpoint are expected to open with a
    /// PROXY protocol v1 header (§6), e.g. because it sits behind a load
    /// balancer. Off by default: accepting a PROXY header from an
    /// untrusted peer lets it spoof its own remote address.
    pub trust_proxy_protocol: bool,
}

impl EndpointDefinition {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            read_timeout: Duration::from_secs(120),
            is_secure: false,
            tls_config: None,
            allow_unsecure_authentication: false,
            trust_proxy_protocol: false,
        }
    }

    pub fn with_trust_proxy_protocol(mut self, trust: bool) -> Self {
        self.trust_proxy_protocol = trust;
        self
    }

    pub fn with_tls(mut self, config: Arc<rustls::ServerConfig>, implicit: bool) -> Self {
        self.tls_config = Some(config);
        self.is_secure = implicit;
        self
    }

    pub fn with_allow_unsecure_authentication(mut self, allow: bool) -> Self {
        self.allow_unsecure_authentication = allow;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Immutable, shared configuration for a running [`crate::server::Server`].
pub struct ServerOptions {
    pub server_name: String,
    pub endpoints: Vec<EndpointDefinition>,
    pub message_store_factory: Arc<dyn MessageStoreFactory>,
    pub mailbox_filter_factory: Arc<dyn MailboxFilterFactory>,
    pub user_authenticator_factory: Option<Arc<dyn UserAuthenticatorFactory>>,
    pub max_message_size: usize,
    pub max_retry_count: u32,
    pub max_authentication_attempts: u32,
    pub max_recipients: usize,
    pub network_buffer_size: usize,
    pub command_wait_timeout: Duration,
    pub supported_authentication_methods: Vec<AuthMechanism>,
    pub events: Arc<dyn ServerEvents>,
}

pub struct ServerOptionsBuilder {
    server_name: String,
    endpoints: Vec<EndpointDefinition>,
    message_store_factory: Option<Arc<dyn MessageStoreFactory>>,
    mailbox_filter_factory: Option<Arc<dyn MailboxFilterFactory>>,
    user_authenticator_factory: Option<Arc<dyn UserAuthenticatorFactory>>,
    max_message_size: usize,
    max_retry_count: u32,
    max_authentication_attempts: u32,
    max_recipients: usize,
    network_buffer_size: usize,
    command_wait_timeout: Duration,
    supported_authentication_methods: Vec<AuthMechanism>,
    events: Option<Arc<dyn ServerEvents>>,
}

impl ServerOptionsBuilder {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            endpoints: Vec::new(),
            message_store_factory: None,
            mailbox_filter_factory: None,
            user_authenticator_factory: None,
            max_message_size: 0,
            max_retry_count: 5,
            max_authentication_attempts: 3,
            max_recipients: 100,
            network_buffer_size: 128,
            command_wait_timeout: Duration::from_secs(300),
            supported_authentication_methods: vec![AuthMechanism::Plain, AuthMechanism::Login],
            events: None,
        }
    }

    pub fn endpoint(mut self, endpoint: EndpointDefinition) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn message_store_factory(mut self, factory: Arc<dyn MessageStoreFactory>) -> Self {
        self.message_store_factory = Some(factory);
        self
    }

    pub fn mailbox_filter_factory(mut self, factory: Arc<dyn MailboxFilterFactory>) -> Self {
        self.mailbox_filter_factory = Some(factory);
        self
    }

    pub fn user_authenticator_factory(mut self, factory: Arc<dyn UserAuthenticatorFactory>) -> Self {
        self.user_authenticator_factory = Some(factory);
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    pub fn max_authentication_attempts(mut self, count: u32) -> Self {
        self.max_authentication_attempts = count;
        self
    }

    pub fn max_recipients(mut self, count: usize) -> Self {
        self.max_recipients = count;
        self
    }

    pub fn command_wait_timeout(mut self, timeout: Duration) -> Self {
        self.command_wait_timeout = timeout;
        self
    }

    pub fn events(mut self, events: Arc<dyn ServerEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Finishes the configuration. Fails if no endpoints, no message store
    /// factory, or no mailbox filter factory were supplied — every
    /// transaction needs both collaborators.
    pub fn build(self) -> Result<ServerOptions, String> {
        if self.endpoints.is_empty() {
            return Err("at least one endpoint is required".into());
        }
        let message_store_factory =
            self.message_store_factory.ok_or_else(|| "a message store factory is required".to_string())?;
        let mailbox_filter_factory =
            self.mailbox_filter_factory.ok_or_else(|| "a mailbox filter factory is required".to_string())?;

        Ok(ServerOptions {
            server_name: self.server_name,
            endpoints: self.endpoints,
            message_store_factory,
            mailbox_filter_factory,
            user_authenticator_factory: self.user_authenticator_factory,
            max_message_size: self.max_message_size,
            max_retry_count: self.max_retry_count,
            max_authentication_attempts: self.max_authentication_attempts,
            max_recipients: self.max_recipients,
            network_buffer_size: self.network_buffer_size,
            command_wait_timeout: self.command_wait_timeout,
            supported_authentication_methods: self.supported_authentication_methods,
            events: self.events.unwrap_or_else(|| Arc::new(crate::server::NoopServerEvents)),
        })
    }
}
