//! End-to-end session tests that drive a real `TcpListener`-bound server
//! over a plain TCP socket, exercising the full command sequence a real
//! SMTP client would send.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use smtp_laser::options::{EndpointDefinition, ServerOptionsBuilder};
use smtp_laser::response::SmtpResponse;
use smtp_laser::sample_store::AllowListFilterFactory;
use smtp_laser::server::Server;
use smtp_laser::store::{MessageStore, MessageStoreFactory};
use smtp_laser::transaction::MessageTransaction;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Records every transaction a session hands off, so tests can assert on
/// what actually reached the store without a real backing filesystem.
#[derive(Default)]
struct RecordingStore {
    saved: Arc<Mutex<Vec<MessageTransaction>>>,
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn save(&mut self, transaction: &MessageTransaction) -> Result<Option<SmtpResponse>, String> {
        self.saved.lock().unwrap().push(transaction.clone());
        Ok(None)
    }
}

struct RecordingStoreFactory {
    saved: Arc<Mutex<Vec<MessageTransaction>>>,
}

impl MessageStoreFactory for RecordingStoreFactory {
    fn create(&self) -> Box<dyn MessageStore> {
        Box::new(RecordingStore { saved: self.saved.clone() })
    }
}

struct TestServer {
    addr: std::net::SocketAddr,
    saved: Arc<Mutex<Vec<smtp_laser::transaction::MessageTransaction>>>,
    _handle: tokio::task::JoinHandle<()>,
    cancellation: tokio_util::sync::CancellationToken,
}

async fn spawn_server(allowed_recipients: Vec<&str>) -> TestServer {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let saved = Arc::new(Mutex::new(Vec::new()));
    let store_factory = Arc::new(RecordingStoreFactory { saved: saved.clone() });
    let filter_factory = Arc::new(AllowListFilterFactory::new(
        allowed_recipients.into_iter().map(str::to_lowercase).collect(),
    ));

    let endpoint = EndpointDefinition::new(addr.ip(), addr.port());
    let options = ServerOptionsBuilder::new("test.invalid")
        .endpoint(endpoint)
        .message_store_factory(store_factory)
        .mailbox_filter_factory(filter_factory)
        .max_retry_count(5)
        .build()
        .unwrap();

    let server = Server::new(options);
    let cancellation = server.cancellation_token();
    let handle = tokio::spawn(async move {
        let _ = server.start().await;
    });

    // Give the accept loop a moment to bind before the first connect.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { addr, saved, _handle: handle, cancellation }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn connect(server: &TestServer) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    (BufReader::new(read_half), write_half)
}

async fn read_reply(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut full = String::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let continues = line.as_bytes().get(3) == Some(&b'-');
        full.push_str(&line);
        if !continues {
            break;
        }
    }
    full
}

async fn send(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) {
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\r\n").await.unwrap();
}

#[tokio::test]
async fn simple_send_is_accepted_and_stored() {
    let server = spawn_server(vec!["c@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;

    assert!(read_reply(&mut reader).await.starts_with("220"));

    send(&mut writer, "EHLO x").await;
    assert!(read_reply(&mut reader).await.starts_with("250"));

    send(&mut writer, "MAIL FROM:<a@b.com>").await;
    assert!(read_reply(&mut reader).await.starts_with("250"));

    send(&mut writer, "RCPT TO:<c@d.com>").await;
    assert!(read_reply(&mut reader).await.starts_with("250"));

    send(&mut writer, "DATA").await;
    assert!(read_reply(&mut reader).await.starts_with("354"));

    writer.write_all(b"Subject: Hi\r\n\r\nHello\r\n.\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("250"));

    send(&mut writer, "QUIT").await;
    assert!(read_reply(&mut reader).await.starts_with("221"));

    let saved = server.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].from.as_ref().unwrap().to_string(), "a@b.com");
    assert_eq!(saved[0].to[0].to_string(), "c@d.com");
}

#[tokio::test]
async fn null_reverse_path_has_no_from() {
    let server = spawn_server(vec!["c@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "EHLO x").await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "MAIL FROM:<>").await;
    assert!(read_reply(&mut reader).await.starts_with("250"));

    send(&mut writer, "RCPT TO:<c@d.com>").await;
    let _ = read_reply(&mut reader).await;
    send(&mut writer, "DATA").await;
    let _ = read_reply(&mut reader).await;
    writer.write_all(b".\r\n").await.unwrap();
    let _ = read_reply(&mut reader).await;

    let saved = server.saved.lock().unwrap();
    assert!(saved[0].from.is_none());
}

#[tokio::test]
async fn rcpt_before_mail_is_bad_sequence() {
    let server = spawn_server(vec!["c@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "EHLO x").await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "RCPT TO:<x@y.com>").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("503"), "expected 503, got {reply}");
}

#[tokio::test]
async fn filter_refusal_keeps_session_usable() {
    let server = spawn_server(vec!["only-this@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "EHLO x").await;
    let _ = read_reply(&mut reader).await;
    send(&mut writer, "MAIL FROM:<a@b.com>").await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "RCPT TO:<nobody@d.com>").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("550"), "expected 550, got {reply}");

    // The session is still usable: a correct recipient now succeeds.
    send(&mut writer, "RCPT TO:<only-this@d.com>").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("250"), "expected 250, got {reply}");
}

#[tokio::test]
async fn starttls_reset_requires_reehlo() {
    // No TLS is configured on this endpoint, so the scenario under test
    // — a protocol reset to `Initialized` requiring a fresh EHLO before
    // MAIL is legal again — is exercised directly on the pre-EHLO state,
    // which STARTTLS resets the session into.
    let server = spawn_server(vec!["c@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "MAIL FROM:<a@b.com>").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("503"), "MAIL before EHLO must be rejected, got {reply}");

    send(&mut writer, "EHLO x").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("250"));

    send(&mut writer, "MAIL FROM:<a@b.com>").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("250"), "MAIL after EHLO must succeed, got {reply}");
}

#[tokio::test]
async fn six_bad_commands_trip_the_retry_limit() {
    let server = spawn_server(vec!["c@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;
    let _ = read_reply(&mut reader).await;

    for _ in 0..5 {
        send(&mut writer, "BOGUS").await;
        let reply = read_reply(&mut reader).await;
        assert!(reply.starts_with("500"));
    }

    // The 6th bad command gets its own 500 plus the closing 421 — the
    // session reports what was wrong with the command it just rejected,
    // then says goodbye.
    send(&mut writer, "BOGUS").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("500"));
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("421"), "expected 421 after exceeding retry limit, got {reply}");
}

#[tokio::test]
async fn ehlo_advertises_pipelining_and_8bitmime() {
    let server = spawn_server(vec!["c@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "EHLO x").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.contains("PIPELINING"));
    assert!(reply.contains("8BITMIME"));
}

#[tokio::test]
async fn noop_always_succeeds_regardless_of_state() {
    let server = spawn_server(vec!["c@d.com"]).await;
    let (mut reader, mut writer) = connect(&server).await;
    let _ = read_reply(&mut reader).await;

    send(&mut writer, "NOOP").await;
    let reply = read_reply(&mut reader).await;
    assert!(reply.starts_with("250"), "NOOP must succeed even before HELO, got {reply}");
}
