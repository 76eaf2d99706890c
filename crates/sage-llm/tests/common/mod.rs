#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "test-api-key";

/// Returns the value of `name` on the only request the server received.
pub async fn received_header(server: &MockServer, name: &str) -> Option<String> {
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1, "expected exactly one request");
    requests[0]
        .headers
        .get(name)
        .map(|v| v.to_str().unwrap().to_string())
}

/// Returns the JSON body of the only request the server received.
pub async fn received_body(server: &MockServer) -> serde_json::Value {
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1, "expected exactly one request");
    requests[0].body_json().unwrap()
}

/// Starts a raw HTTP server that answers one request with `200 OK`, the given
/// content type, a `content-length` larger than what it sends, and `partial`
/// as the only body bytes. The connection then stays open without further data.
///
/// Returns the base URL to point a provider at.
pub async fn stalled_body_server(content_type: &str, partial: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let head = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\n\r\n",
        partial.len() + 4096
    );
    let partial = partial.to_string();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 16 * 1024];
        let _ = socket.read(&mut buf).await;
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(partial.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(socket);
    });

    format!("http://{addr}")
}
