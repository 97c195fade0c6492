//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use guess_mime::{HttpServer, ServerConfig, Shutdown, WorkerContext};

/// PNG signature followed by the start of an IHDR chunk.
#[allow(dead_code)]
pub const PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, b'I', b'H', b'D', b'R',
];

/// Start a mock upstream that answers every request with `chunks` as a
/// chunked body, without a Content-Type header.
#[allow(dead_code)]
pub async fn start_chunked_upstream(chunks: Vec<&'static [u8]>) -> SocketAddr {
    start_upstream(None, chunks).await
}

/// Start a mock upstream answering with `chunks` as a chunked body and the
/// given Content-Type, if any.
#[allow(dead_code)]
pub async fn start_upstream(
    content_type: Option<&'static str>,
    chunks: Vec<&'static [u8]>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let chunks = chunks.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let content_type = content_type
                    .map(|ct| format!("Content-Type: {ct}\r\n"))
                    .unwrap_or_default();
                let head = format!(
                    "HTTP/1.1 200 OK\r\n{content_type}Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in chunks {
                    let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
                    frame.extend_from_slice(chunk);
                    frame.extend_from_slice(b"\r\n");
                    if socket.write_all(&frame).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                let _ = socket.write_all(b"0\r\n\r\n").await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// A server running on an ephemeral port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub config_updates: mpsc::UnboundedSender<ServerConfig>,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the full server with `config` on 127.0.0.1:0.
#[allow(dead_code)]
pub async fn start_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let worker = WorkerContext::start(&config);
    let server = HttpServer::new(config, &worker).unwrap();

    let (config_updates, config_rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let shutdown_rx: broadcast::Receiver<()> = shutdown.subscribe();

    tokio::spawn(async move {
        let _worker = worker;
        server.run(listener, config_rx, shutdown_rx).await.unwrap();
    });

    TestServer {
        addr,
        config_updates,
        shutdown,
    }
}
