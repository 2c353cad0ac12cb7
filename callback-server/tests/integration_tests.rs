//! Integration tests for the callback server.
//!
//! These tests start a real listener, write raw requests over TCP and verify
//! what reaches the channel and what the peer reads back.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use callback_server::{CallbackServer, NotificationPayload, ServerConfig, OK_RESPONSE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn start_server(
    config: ServerConfig,
) -> (CallbackServer, mpsc::UnboundedReceiver<NotificationPayload>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = CallbackServer::start(
        config.with_advertised_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        tx,
    )
    .await
    .expect("Failed to create callback server");
    (server, rx)
}

/// Send `request` and return everything the server wrote before closing.
async fn exchange(port: u16, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("server did not close the connection")
        .unwrap_or_default();
    reply
}

#[tokio::test]
async fn test_chunked_notify_end_to_end() {
    let (server, mut rx) = start_server(ServerConfig::default()).await;
    assert!(server.base_url().starts_with("http://127.0.0.1:"));

    let body = "<a>abcdefghijklmnopqrs</a>";
    let request = format!(
        "NOTIFY /dev HTTP/1.1\r\nHOST: 127.0.0.1\r\nCONTENT-TYPE: text/xml\r\nTRANSFER-ENCODING: chunked\r\nNT: upnp:event\r\nNTS: upnp:propchange\r\nSID: uuid:sub-1\r\nSEQ: 0\r\n\r\n1a\r\n{body}\r\n0\r\n\r\n"
    );

    let reply = exchange(server.port(), request.as_bytes()).await;
    assert_eq!(reply, OK_RESPONSE);

    let notification = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("No notification received");
    assert_eq!(notification.subscription_id, "uuid:sub-1");
    assert_eq!(notification.event_xml.len(), 0x1a);
    assert_eq!(notification.event_xml, body);

    // exactly once
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_content_length_notify() {
    let (server, mut rx) = start_server(ServerConfig::default()).await;

    let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><Volume>50</Volume></e:property></e:propertyset>"#;
    let request = format!(
        "NOTIFY / HTTP/1.1\r\nContent-Type: text/xml; charset=\"utf-8\"\r\nSID: uuid:sub-2\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );

    assert_eq!(exchange(server.port(), request.as_bytes()).await, OK_RESPONSE);
    let notification = rx.recv().await.unwrap();
    assert_eq!(notification.event_xml, body);
    assert_eq!(notification.seq, None);

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_requests_are_aborted() {
    let (server, mut rx) = start_server(ServerConfig::default()).await;

    // missing SID
    let reply = exchange(
        server.port(),
        b"NOTIFY / HTTP/1.1\r\nContent-Type: text/xml\r\nContent-Length: 0\r\n\r\n",
    )
    .await;
    assert!(reply.is_empty());

    // chunk larger than allowed
    let reply = exchange(
        server.port(),
        b"NOTIFY / HTTP/1.1\r\nContent-Type: text/xml\r\nSID: uuid:x\r\nTransfer-Encoding: chunked\r\n\r\nFFFFF\r\n",
    )
    .await;
    assert!(reply.is_empty());

    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let config = ServerConfig::default().with_inactivity_timeout(Duration::from_millis(200));
    let (server, mut rx) = start_server(config).await;

    let mut stream = TcpStream::connect(("127.0.0.1", server.port())).await.unwrap();
    stream
        .write_all(b"NOTIFY / HTTP/1.1\r\nContent-Type: text/xml\r\n")
        .await
        .unwrap();

    let mut reply = Vec::new();
    let read = timeout(Duration::from_secs(2), stream.read_to_end(&mut reply)).await;
    assert!(read.is_ok(), "server should close an idle connection");
    assert!(reply.is_empty());
    assert!(rx.try_recv().is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_remembered_port_reused_when_free() {
    let (first, _rx) = start_server(ServerConfig::default()).await;
    let port = first.port();
    first.shutdown().await;

    let (second, _rx2) = start_server(ServerConfig::default().with_preferred_port(Some(port))).await;
    assert_eq!(second.port(), port);

    // Taken port falls back to an ephemeral one
    let (third, _rx3) = start_server(ServerConfig::default().with_preferred_port(Some(port))).await;
    assert_ne!(third.port(), port);

    second.shutdown().await;
    third.shutdown().await;
}
