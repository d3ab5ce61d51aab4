//! Line/buffer I/O: CRLF-terminated command reads, dot-stuffed DATA body
//! reads with a size cap, and the in-place TLS upgrade of the transport.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SmtpError;

/// Bound satisfied by any stream this crate can read/write SMTP over: a
/// plain `TcpStream` or a `tokio_rustls::server::TlsStream` wrapping one.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// RFC 5321 §4.5.3.1.6 caps a command line at 1000 octets including CRLF.
pub const MAX_LINE_LEN: usize = 1000;

pub enum ReadLineOutcome {
    Line(String),
    TooLong,
    Eof,
}

/// Wraps the current transport stream for a session, tracking whether it
/// has been upgraded to TLS. `is_secure` only ever flips false -> true.
pub struct NetworkClient {
    stream: Box<dyn Transport>,
    pub is_secure: bool,
    pub read_timeout: Duration,
}

impl NetworkClient {
    pub fn new(stream: Box<dyn Transport>, is_secure: bool, read_timeout: Duration) -> Self {
        Self { stream, is_secure, read_timeout }
    }

    /// Replaces the underlying stream in place, e.g. after a TLS handshake.
    /// Panics if called to *downgrade* security, since `IsSecure` is a
    /// monotonic invariant (§3).
    pub fn replace_stream(&mut self, stream: Box<dyn Transport>, now_secure: bool) {
        assert!(now_secure || self.is_secure, "IsSecure must never transition from true to false");
        self.stream = stream;
        self.is_secure = now_secure;
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, SmtpError> {
        let mut byte = [0u8; 1];
        let timeout = tokio::time::timeout(self.read_timeout, self.stream.read(&mut byte));
        match timeout.await {
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(_)) => Ok(Some(byte[0])),
            Ok(Err(e)) => Err(SmtpError::Io(e)),
            Err(_) => Err(SmtpError::ReadTimeout),
        }
    }

    /// Reads one CRLF-terminated line, capped at [`MAX_LINE_LEN`] octets.
    /// On overflow, drains up to the next CRLF and reports `TooLong` rather
    /// than unbounded growth.
    pub async fn read_line(&mut self) -> Result<ReadLineOutcome, SmtpError> {
        let mut buf = Vec::new();
        loop {
            let Some(b) = self.read_byte().await? else {
                return Ok(if buf.is_empty() { ReadLineOutcome::Eof } else { ReadLineOutcome::Eof });
            };
            buf.push(b);
            if buf.len() >= 2 && buf[buf.len() - 2..] == *b"\r\n" {
                buf.truncate(buf.len() - 2);
                return Ok(ReadLineOutcome::Line(String::from_utf8_lossy(&buf).into_owned()));
            }
            if buf.len() > MAX_LINE_LEN {
                self.drain_to_crlf().await?;
                return Ok(ReadLineOutcome::TooLong);
            }
        }
    }

    async fn drain_to_crlf(&mut self) -> Result<(), SmtpError> {
        let mut prev = 0u8;
        loop {
            let Some(b) = self.read_byte().await? else { return Ok(()) };
            if prev == b'\r' && b == b'\n' {
                return Ok(());
            }
            prev = b;
        }
    }

    /// Reads a dot-stuffed DATA body until a line containing only `.`.
    /// Un-stuffs leading dots on content lines. Continues reading past
    /// `max_size` to fully drain the body, but reports `size_exceeded` so
    /// the caller can respond `552` instead of accepting.
    pub async fn read_data_body(&mut self, max_size: usize) -> Result<DataBody, SmtpError> {
        let mut bytes = Vec::new();
        let mut exceeded = false;
        loop {
            match self.read_line().await? {
                ReadLineOutcome::Eof => return Err(SmtpError::Protocol("connection closed mid-DATA".into())),
                ReadLineOutcome::TooLong => {
                    // A body line longer than the command-line cap is still
                    // valid DATA content; keep reading rather than bailing.
                    continue;
                }
                ReadLineOutcome::Line(line) => {
                    if line == "." {
                        return Ok(DataBody { bytes, size_exceeded: exceeded });
                    }
                    let unstuffed = if let Some(rest) = line.strip_prefix('.') { rest } else { &line };
                    if !exceeded {
                        let projected = bytes.len() + unstuffed.len() + 2;
                        if projected > max_size {
                            exceeded = true;
                        } else {
                            bytes.extend_from_slice(unstuffed.as_bytes());
                            bytes.extend_from_slice(b"\r\n");
                        }
                    }
                }
            }
        }
    }

    pub async fn write_response(&mut self, wire: &str) -> Result<(), SmtpError> {
        self.stream.write_all(wire.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> Box<dyn Transport> {
        self.stream
    }

    pub fn stream_mut(&mut self) -> &mut Box<dyn Transport> {
        &mut self.stream
    }

    /// Takes ownership of the current stream, leaving a closed placeholder
    /// behind. Used by [`crate::tls::upgrade`] to hand the raw TCP stream
    /// to the TLS acceptor and then install the wrapped stream in its
    /// place via [`NetworkClient::replace_stream`].
    pub fn take_stream(&mut self) -> Box<dyn Transport> {
        std::mem::replace(&mut self.stream, Box::new(ClosedTransport))
    }
}

/// Placeholder installed momentarily while a stream is being upgraded.
/// Any I/O against it is a bug in the caller, so it reports EOF/errors
/// rather than blocking or panicking.
struct ClosedTransport;

impl AsyncRead for ClosedTransport {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ClosedTransport {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::task::Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "stream is mid-upgrade")))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

pub struct DataBody {
    pub bytes: Vec<u8>,
    pub size_exceeded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn client(data: &'static [u8]) -> NetworkClient {
        let (client_side, mut server_side) = duplex(4096);
        tokio::spawn(async move {
            let _ = server_side.write_all(data).await;
            let _ = server_side.shutdown().await;
        });
        NetworkClient::new(Box::new(client_side), false, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn reads_simple_line() {
        let mut c = client(b"EHLO there\r\n");
        match c.read_line().await.unwrap() {
            ReadLineOutcome::Line(l) => assert_eq!(l, "EHLO there"),
            _ => panic!("expected a line"),
        }
    }

    #[tokio::test]
    async fn overlong_line_is_capped_and_drained() {
        let mut long_line = "A".repeat(MAX_LINE_LEN + 5);
        long_line.push_str("\r\nNOOP\r\n");
        let mut c = client(Box::leak(long_line.into_boxed_str()).as_bytes());
        match c.read_line().await.unwrap() {
            ReadLineOutcome::TooLong => {}
            _ => panic!("expected TooLong"),
        }
        match c.read_line().await.unwrap() {
            ReadLineOutcome::Line(l) => assert_eq!(l, "NOOP"),
            _ => panic!("expected the following line to still be readable"),
        }
    }

    #[tokio::test]
    async fn data_body_unstuffs_leading_dots() {
        let mut c = client(b"..leading dot\r\nplain\r\n.\r\n");
        let body = c.read_data_body(1_000_000).await.unwrap();
        assert_eq!(body.bytes, b".leading dot\r\nplain\r\n");
        assert!(!body.size_exceeded);
    }

    #[tokio::test]
    async fn data_body_exact_cap_accepted_one_over_exceeds() {
        let mut c = client(b"AAAA\r\n.\r\n");
        let body = c.read_data_body(6).await.unwrap();
        assert!(!body.size_exceeded);

        let mut c2 = client(b"AAAA\r\n.\r\n");
        let body2 = c2.read_data_body(5).await.unwrap();
        assert!(body2.size_exceeded);
    }
}
