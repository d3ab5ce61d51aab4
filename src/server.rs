//! Orchestrates endpoint lifecycle: binds every configured endpoint,
//! accepts connections concurrently, and shuts all of them down together
//! on cancellation, per §4.7.
//!
//! Fans out a task per endpoint and `select!`s on whichever finishes
//! first; the per-endpoint accept loop itself lives in [`crate::endpoint`].

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::SmtpError;
use crate::options::{EndpointDefinition, ServerOptions};

/// Lifecycle hooks a host application can observe. Every method has a
/// no-op default so implementors only override what they care about.
#[async_trait]
pub trait ServerEvents: Send + Sync {
    async fn endpoint_started(&self, _endpoint: &EndpointDefinition) {}
    async fn endpoint_stopped(&self, _endpoint: &EndpointDefinition) {}
    async fn session_created(&self, _session_id: u64, _remote: std::net::SocketAddr) {}
    async fn session_completed(&self, _session_id: u64) {}
    async fn command_executing(&self, _session_id: u64, _keyword: &str) {}
}

/// The default, silent [`ServerEvents`] implementation.
pub struct NoopServerEvents;

#[async_trait]
impl ServerEvents for NoopServerEvents {}

/// Runs every configured endpoint until [`Server::stop`] is called or the
/// process is interrupted.
pub struct Server {
    options: Arc<ServerOptions>,
    cancellation: CancellationToken,
    next_session_id: Arc<AtomicU64>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: Arc::new(options),
            cancellation: CancellationToken::new(),
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// A cancellation handle callers can use to trigger [`Server::start`]'s
    /// graceful shutdown from outside, e.g. on SIGTERM.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    /// Binds and runs every endpoint concurrently. Returns once all
    /// endpoints have stopped, which normally only happens after
    /// [`Server::stop`] is called; an endpoint that fails to bind causes
    /// the others to be cancelled too, so one essential listener dying
    /// brings the whole server down rather than limping on partially.
    pub async fn start(&self) -> Result<(), SmtpError> {
        if self.options.endpoints.is_empty() {
            return Err(SmtpError::Protocol("no endpoints configured".into()));
        }

        let mut handles = Vec::with_capacity(self.options.endpoints.len());
        for endpoint in self.options.endpoints.clone() {
            let options = Arc::clone(&self.options);
            let cancellation = self.cancellation.clone();
            let next_session_id = Arc::clone(&self.next_session_id);
            handles.push(tokio::spawn(async move {
                crate::endpoint::run_endpoint(endpoint, options, cancellation, next_session_id).await
            }));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "endpoint terminated with an error");
                    self.cancellation.cancel();
                    first_error.get_or_insert(e);
                }
                Err(join_error) => {
                    error!(%join_error, "endpoint task panicked or was cancelled");
                    self.cancellation.cancel();
                    first_error.get_or_insert(SmtpError::Protocol(join_error.to_string()));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        info!("all endpoints stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::RecordingStoreFactory;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    fn test_options(port: u16) -> ServerOptions {
        let factory = Arc::new(RecordingStoreFactory { saved: Arc::new(Mutex::new(Vec::new())) });
        crate::options::ServerOptionsBuilder::new("test.invalid")
            .endpoint(EndpointDefinition::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
            .message_store_factory(factory.clone())
            .mailbox_filter_factory(factory)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn stop_unblocks_start() {
        let server = Server::new(test_options(0));
        let token = server.cancellation_token();
        let handle = tokio::spawn(async move { server.start().await });
        token.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "start() should return promptly after stop()");
    }
}
