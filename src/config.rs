//! Environment-variable configuration for the sample binary.
//!
//! A `.env` file is loaded via `dotenv`, required variables are reported
//! with context on failure, optional variables fall back to sane
//! defaults, and every resolved value is logged at startup.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    /// (Required: `SMTP_LASER_ALLOWED_RECIPIENTS`, comma-separated)
    pub allowed_recipients: Vec<String>,
    /// (Optional: `SMTP_LASER_BIND_ADDRESS`, default `0.0.0.0`)
    pub bind_address: IpAddr,
    /// (Optional: `SMTP_LASER_PORT`, default `2525`)
    pub port: u16,
    /// (Optional: `SMTP_LASER_SERVER_NAME`, default `smtp-laser`)
    pub server_name: String,
    /// (Optional: `SMTP_LASER_MAILDIR`, default `./maildir`)
    pub maildir: PathBuf,
    /// (Optional: `SMTP_LASER_MAX_MESSAGE_SIZE`, default `10485760`, 0 = unlimited)
    pub max_message_size: usize,
    /// (Optional: `SMTP_LASER_MAX_RETRY_COUNT`, default `5`)
    pub max_retry_count: u32,
    /// (Optional: `SMTP_LASER_TLS_CERT`, `SMTP_LASER_TLS_KEY` — both required to enable TLS)
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    /// (Optional: `SMTP_LASER_IMPLICIT_TLS`, default `false`; STARTTLS offered otherwise)
    pub implicit_tls: bool,
    /// (Optional: `SMTP_LASER_ALLOW_UNSECURE_AUTH`, default `false`)
    pub allow_unsecure_authentication: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();

        let allowed_recipients_str = std::env::var("SMTP_LASER_ALLOWED_RECIPIENTS")
            .context("SMTP_LASER_ALLOWED_RECIPIENTS environment variable must be set")?;
        let allowed_recipients: Vec<String> = allowed_recipients_str
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if allowed_recipients.is_empty() {
            return Err(anyhow!("SMTP_LASER_ALLOWED_RECIPIENTS must contain at least one address"));
        }
        info!(count = allowed_recipients.len(), "configured allowed recipients");

        let bind_address: IpAddr = std::env::var("SMTP_LASER_BIND_ADDRESS")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
            .parse()
            .context("SMTP_LASER_BIND_ADDRESS must be a valid IP address")?;

        let port: u16 = std::env::var("SMTP_LASER_PORT")
            .unwrap_or_else(|_| "2525".to_string())
            .parse()
            .context("SMTP_LASER_PORT must be a valid port number")?;

        let server_name = std::env::var("SMTP_LASER_SERVER_NAME").unwrap_or_else(|_| "smtp-laser".to_string());

        let maildir = PathBuf::from(std::env::var("SMTP_LASER_MAILDIR").unwrap_or_else(|_| "./maildir".to_string()));

        let max_message_size: usize = std::env::var("SMTP_LASER_MAX_MESSAGE_SIZE")
            .unwrap_or_else(|_| "10485760".to_string())
            .parse()
            .context("SMTP_LASER_MAX_MESSAGE_SIZE must be a valid size in bytes")?;

        let max_retry_count: u32 = std::env::var("SMTP_LASER_MAX_RETRY_COUNT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("SMTP_LASER_MAX_RETRY_COUNT must be a valid integer")?;

        let tls_cert_path = std::env::var("SMTP_LASER_TLS_CERT").ok().map(PathBuf::from);
        let tls_key_path = std::env::var("SMTP_LASER_TLS_KEY").ok().map(PathBuf::from);

        let implicit_tls: bool = std::env::var("SMTP_LASER_IMPLICIT_TLS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .context("SMTP_LASER_IMPLICIT_TLS must be true or false")?;

        let allow_unsecure_authentication: bool = std::env::var("SMTP_LASER_ALLOW_UNSECURE_AUTH")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .context("SMTP_LASER_ALLOW_UNSECURE_AUTH must be true or false")?;

        info!(%bind_address, port, %server_name, max_message_size, max_retry_count, "resolved configuration");

        Ok(Config {
            allowed_recipients,
            bind_address,
            port,
            server_name,
            maildir,
            max_message_size,
            max_retry_count,
            tls_cert_path,
            tls_key_path,
            implicit_tls,
            allow_unsecure_authentication,
        })
    }
}
