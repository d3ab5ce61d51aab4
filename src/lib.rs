//! A pluggable ESMTP receive server core.
//!
//! This crate owns the protocol: a hand-written command tokenizer and
//! grammar, a declarative session state machine, line and DATA-body I/O
//! with STARTTLS/implicit-TLS upgrade, and a multi-endpoint accept loop.
//! It does not own policy or persistence — [`store::MessageStore`],
//! [`store::MailboxFilter`], and [`store::UserAuthenticator`] are
//! supplied by the host application via [`options::ServerOptionsBuilder`].

pub mod command;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod mailbox;
pub mod options;
pub mod parser;
pub mod proxy;
pub mod response;
pub mod sample_store;
pub mod server;
pub mod session;
pub mod state;
pub mod store;
pub mod tls;
pub mod transaction;

pub use error::SmtpError;
pub use options::{EndpointDefinition, ServerOptions, ServerOptionsBuilder};
pub use response::SmtpResponse;
pub use server::Server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::sample_store::{AllowListFilterFactory, MaildirStoreFactory};

/// Builds and runs the sample server from environment-sourced
/// configuration. Returns once the server is cancelled (e.g. via
/// `ctrl_c`) or an endpoint fails unrecoverably.
///
/// Loads configuration, builds the long-running service, and races it
/// against a shutdown signal.
pub async fn run() -> Result<()> {
    info!("starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let cfg = config::Config::from_env().context("failed to load configuration")?;

    let tls_config = load_tls_config(&cfg)?;
    let mut endpoint = EndpointDefinition::new(cfg.bind_address, cfg.port)
        .with_allow_unsecure_authentication(cfg.allow_unsecure_authentication);
    if let Some(tls_config) = tls_config {
        endpoint = endpoint.with_tls(tls_config, cfg.implicit_tls);
    }

    let store_factory = Arc::new(MaildirStoreFactory::new(cfg.maildir.clone()));
    let filter_factory = Arc::new(AllowListFilterFactory::new(cfg.allowed_recipients.clone()));

    let options = ServerOptionsBuilder::new(cfg.server_name.clone())
        .endpoint(endpoint)
        .message_store_factory(store_factory)
        .mailbox_filter_factory(filter_factory)
        .max_message_size(cfg.max_message_size)
        .max_retry_count(cfg.max_retry_count)
        .command_wait_timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    let server = Server::new(options);
    let token = server.cancellation_token();

    let mut start = std::pin::pin!(server.start());
    tokio::select! {
        result = &mut start => {
            if let Err(e) = &result {
                error!(error = %e, "server terminated with an error");
            }
            result.map_err(|e| anyhow::anyhow!(e))
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, waiting for in-flight sessions to finish");
            token.cancel();
            let result = start.await;
            if let Err(e) = &result {
                error!(error = %e, "server terminated with an error during shutdown");
            }
            result.map_err(|e| anyhow::anyhow!(e))
        }
    }
}

fn load_tls_config(cfg: &config::Config) -> Result<Option<Arc<rustls::ServerConfig>>> {
    let (Some(cert_path), Some(key_path)) = (&cfg.tls_cert_path, &cfg.tls_key_path) else {
        return Ok(None);
    };

    let cert_file = std::fs::File::open(cert_path).context("failed to open TLS certificate file")?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
        .collect::<std::result::Result<_, _>>()
        .context("failed to parse TLS certificate file")?;

    let key_file = std::fs::File::open(key_path).context("failed to open TLS private key file")?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
        .context("failed to parse TLS private key file")?
        .context("TLS private key file contained no private key")?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS certificate/key pair")?;

    Ok(Some(Arc::new(config)))
}
