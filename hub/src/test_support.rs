//! Minimal HTTP/1.1 server for exercising release lookups and downloads

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub send_length: bool,
}

impl MockResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "application/octet-stream",
            send_length: true,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            content_type: "application/json",
            ..Self::ok(value.to_string())
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Vec::new())
        }
    }

    pub fn without_length(mut self) -> Self {
        self.send_length = false;
        self
    }
}

type Routes = Arc<Mutex<HashMap<String, MockResponse>>>;

pub struct MockServer {
    addr: SocketAddr,
    routes: Routes,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Serve fixed responses by path; unknown paths get 404
    pub async fn start(routes: Vec<(&str, MockResponse)>) -> Self {
        let routes: Routes = Arc::new(Mutex::new(
            routes
                .into_iter()
                .map(|(path, response)| (path.to_string(), response))
                .collect(),
        ));
        let served = Arc::clone(&routes);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = Arc::clone(&served);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let response = routes
                        .lock()
                        .unwrap()
                        .get(&path)
                        .cloned()
                        .unwrap_or_else(|| MockResponse::status(404));

                    let mut head = format!(
                        "HTTP/1.1 {} MOCK\r\nContent-Type: {}\r\nConnection: close\r\n",
                        response.status, response.content_type
                    );
                    if response.send_length {
                        head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
                    }
                    head.push_str("\r\n");
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&response.body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            addr,
            routes,
            handle,
        }
    }

    /// Add or replace a route after start, when a body needs the server URL
    pub fn route(&self, path: &str, response: MockResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Client that never routes loopback traffic through an environment proxy
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
