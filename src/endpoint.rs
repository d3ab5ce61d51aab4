//! Endpoint bind/accept loop. One of these runs per configured
//! [`EndpointDefinition`], spawning a fresh session per accepted
//! connection, with cooperative cancellation and an implicit-TLS upgrade
//! for endpoints that need one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::context::SessionContext;
use crate::error::SmtpError;
use crate::options::{EndpointDefinition, ServerOptions};
use crate::session::io::NetworkClient;

pub async fn run_endpoint(
    endpoint: EndpointDefinition,
    options: Arc<ServerOptions>,
    cancellation: CancellationToken,
    next_session_id: Arc<AtomicU64>,
) -> Result<(), SmtpError> {
    let listener = TcpListener::bind((endpoint.address, endpoint.port)).await?;
    info!(address = %endpoint.address, port = endpoint.port, secure = endpoint.is_secure, "endpoint listening");
    options.events.endpoint_started(&endpoint).await;

    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, remote_endpoint) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let connection_id = next_session_id.fetch_add(1, Ordering::Relaxed);
                let options = Arc::clone(&options);
                let endpoint = endpoint.clone();
                let cancellation = cancellation.clone();

                sessions.spawn(async move {
                    options.events.session_created(connection_id, remote_endpoint).await;

                    let transport: Box<dyn crate::session::io::Transport> = Box::new(stream);
                    let mut network = NetworkClient::new(transport, false, endpoint.read_timeout);

                    if endpoint.is_secure {
                        let Some(tls_config) = endpoint.tls_config.clone() else {
                            error!(connection_id, "implicit-TLS endpoint has no TLS config");
                            return;
                        };
                        if let Err(e) = crate::tls::upgrade(&mut network, tls_config).await {
                            error!(connection_id, error = %e, "implicit TLS handshake failed");
                            return;
                        }
                    }

                    let ctx = SessionContext::new(connection_id, options.clone(), endpoint, remote_endpoint, network);
                    if let Err(e) = crate::session::run(ctx, cancellation).await {
                        error!(connection_id, error = %e, "session ended with an error");
                    }
                    options.events.session_completed(connection_id).await;
                });
            }
        }
    }

    // The accept loop is done, but sessions already in flight must finish
    // before this endpoint is reported stopped.
    while let Some(result) = sessions.join_next().await {
        if let Err(join_error) = result {
            error!(%join_error, "session task panicked");
        }
    }

    options.events.endpoint_stopped(&endpoint).await;
    info!(address = %endpoint.address, port = endpoint.port, "endpoint stopped");
    Ok(())
}
