//! STARTTLS and implicit-TLS stream upgrade.
//!
//! Built on the same rustls/tokio-rustls stack this crate already pulls
//! in, doing a server-side accept instead of a client-side connect.

use std::sync::Arc;

use tokio_rustls::TlsAcceptor;

use crate::error::SmtpError;
use crate::session::io::NetworkClient;

/// Performs the TLS handshake over `client`'s current stream and installs
/// the resulting encrypted stream in its place. Leaves `client` untouched
/// on failure other than having taken its stream (the caller must close
/// the connection on error, since the plaintext stream cannot safely be
/// put back into service after a failed handshake attempt).
pub async fn upgrade(client: &mut NetworkClient, config: Arc<rustls::ServerConfig>) -> Result<(), SmtpError> {
    let acceptor = TlsAcceptor::from(config);
    let plain = client.take_stream();
    let tls_stream = acceptor
        .accept(plain)
        .await
        .map_err(|e| SmtpError::Tls(e.to_string()))?;
    client.replace_stream(Box::new(tls_stream), true);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::generate_simple_self_signed;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn test_config() -> Arc<rustls::ServerConfig> {
        let cert = generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert_der = rustls::pki_types::CertificateDer::from(cert.cert.der().to_vec());
        let key_der = rustls::pki_types::PrivateKeyDer::try_from(cert.signing_key.serialize_der()).unwrap();
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)
            .unwrap();
        Arc::new(config)
    }

    /// Garbage in place of a TLS ClientHello must fail the handshake
    /// rather than being accepted as plaintext or hanging.
    #[tokio::test]
    async fn non_tls_bytes_fail_the_handshake() {
        let config = test_config();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut client = NetworkClient::new(Box::new(stream), false, Duration::from_secs(5));
            upgrade(&mut client, config).await
        });

        let mut tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
        tcp.write_all(b"EHLO not.a.tls.client\r\n").await.unwrap();
        drop(tcp);

        let result = tokio::time::timeout(Duration::from_secs(2), server_task).await.unwrap().unwrap();
        assert!(result.is_err());
    }
}
