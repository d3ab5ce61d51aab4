//! Crate-level error type for the library surface.
//!
//! The sample binary (`main.rs`) and the env-var config loader use `anyhow`
//! for top-level error reporting; library code that callers may want to
//! match on (store/filter/authenticator adapters, the session runtime)
//! returns this typed error instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("command wait timed out")]
    Timeout,

    #[error("endpoint read timed out")]
    ReadTimeout,

    #[error("session cancelled")]
    Cancelled,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("message store error: {0}")]
    Store(String),

    #[error("malformed PROXY header: {0}")]
    Proxy(String),
}
