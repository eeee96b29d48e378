//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use proxyd::engine::{EngineError, EngineResult, ProxyEngine};
use proxyd::http::{ServeError, ServingSubsystem};
use proxyd::lifecycle::readiness::Resolver;

/// A mock HTTP backend answering fixed bodies by request path.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Paths requested so far, in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

/// Start a mock backend on an ephemeral port. Unknown paths get 404.
pub async fn start_mock_backend(routes: Vec<(&str, u16, Vec<u8>)>) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes: Arc<HashMap<String, (u16, Vec<u8>)>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, status, body)| (path.to_string(), (status, body)))
            .collect(),
    );
    let hits = Arc::new(Mutex::new(Vec::new()));

    let recorded = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let routes = Arc::clone(&routes);
                    let recorded = Arc::clone(&recorded);
                    tokio::spawn(async move {
                        let path = read_request_path(&mut socket).await;
                        recorded.lock().unwrap().push(path.clone());
                        let (status, body) = routes
                            .get(&path)
                            .cloned()
                            .unwrap_or((404, b"not found".to_vec()));
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let head = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            status_text,
                            body.len()
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&body).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, hits }
}

async fn read_request_path(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string()
}

/// Resolver that always succeeds.
pub struct OnlineResolver;

#[async_trait]
impl Resolver for OnlineResolver {
    async fn resolves(&self, _host: &str) -> std::io::Result<bool> {
        Ok(true)
    }
}

/// Engine that records the calls it receives.
#[derive(Default)]
pub struct RecordingEngine {
    pub calls: Mutex<Vec<&'static str>>,
    pub fail_apply: bool,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProxyEngine for RecordingEngine {
    async fn apply_config(&self) -> EngineResult<()> {
        self.calls.lock().unwrap().push("apply_config");
        if self.fail_apply {
            return Err(EngineError::Script {
                script: "apply".into(),
                reason: "exit status: 1".into(),
            });
        }
        Ok(())
    }

    async fn stop_transparent_proxy(&self) -> EngineResult<()> {
        self.calls.lock().unwrap().push("stop_transparent_proxy");
        Ok(())
    }

    async fn stop_process_manager(&self) -> EngineResult<()> {
        self.calls.lock().unwrap().push("stop_process_manager");
        Ok(())
    }
}

/// Serving subsystem that runs until shutdown, or fails right away.
pub struct MockService {
    pub fail_with: Option<&'static str>,
}

#[async_trait]
impl ServingSubsystem for MockService {
    async fn run(self: Box<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServeError> {
        if let Some(reason) = self.fail_with {
            return Err(ServeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                reason,
            )));
        }
        let _ = shutdown.recv().await;
        Ok(())
    }
}
