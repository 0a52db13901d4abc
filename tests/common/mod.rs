//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a programmable mock upstream on an ephemeral port.
///
/// The handler receives the raw request head (request line + headers, plus
/// any body bytes that arrived with it) and returns (status, headers, body).
/// Content-Length and Connection: close are appended automatically.
pub async fn start_mock_upstream<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, Vec<(String, String)>, Vec<u8>)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 16 * 1024];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let request = String::from_utf8_lossy(&buf[..n]).to_string();

                        let (status, headers, body) = handler(request).await;
                        let reason = match status {
                            200 => "OK",
                            302 => "Found",
                            404 => "Not Found",
                            500 => "Internal Server Error",
                            _ => "OK",
                        };

                        let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
                        for (name, value) in &headers {
                            head.push_str(&format!("{name}: {value}\r\n"));
                        }
                        head.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        ));

                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&body).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock upstream that always returns the same response.
#[allow(dead_code)]
pub async fn start_fixed_upstream(
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
) -> SocketAddr {
    start_mock_upstream(move |_request| {
        let headers = headers.clone();
        let body = body.clone();
        async move { (status, headers, body) }
    })
    .await
}
