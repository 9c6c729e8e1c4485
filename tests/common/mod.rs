//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use quote_gateway::config::GatewayConfig;
use quote_gateway::lifecycle::Shutdown;
use quote_gateway::ticker::SubscriptionRegistry;
use quote_gateway::GatewayServer;

/// Request targets seen by a mock backend, in arrival order.
pub type SeenRequests = Arc<Mutex<Vec<String>>>;

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the request target (path and query) and returns status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, SeenRequests)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenRequests = Arc::default();
    let f = Arc::new(f);

    let log = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let target = head
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("")
                    .to_string();
                log.lock().unwrap().push(target.clone());

                let (status, body) = f(target).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}

/// Mock quote provider answering every query with `body`.
pub async fn start_quote_backend(body: &'static str) -> (SocketAddr, SeenRequests) {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// Read an HTTP head (through the blank line).
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// A gateway running on an ephemeral port. Dropping it stops the server.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub registry: Arc<SubscriptionRegistry>,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config rooted at `root` with the broadcaster off and a fast cadence.
pub fn test_config(root: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.static_files.root = root.display().to_string();
    config.broadcaster.enabled = false;
    config.broadcaster.interval_ms = 100;
    config.broadcaster.fetch_timeout_secs = 2;
    config
}

/// Start the gateway on an ephemeral port.
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = GatewayServer::new(config).unwrap();
    let registry = server.registry();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    tokio::spawn(async move {
        if let Err(e) = server.run(listener, receiver).await {
            eprintln!("gateway exited: {e}");
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    TestGateway {
        addr,
        registry,
        shutdown,
    }
}

/// Static root with an index page, a script and a file of unknown type.
pub fn webapp() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>ticker</html>").unwrap();
    std::fs::create_dir(dir.path().join("js")).unwrap();
    std::fs::write(dir.path().join("js/ticker.js"), "var ws;").unwrap();
    std::fs::write(dir.path().join("data.unknownext"), "raw").unwrap();
    dir
}

/// Send raw bytes and read until the server closes the connection.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response)).await;
    String::from_utf8_lossy(&response).into_owned()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
