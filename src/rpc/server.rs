//! Minimal JSON-RPC server over raw TCP.
//!
//! Accepts one HTTP POST per connection, hands the JSON body to the
//! [`RpcHandler`] and writes the response back with `Connection: close`.

use super::handler::{RpcHandler, PARSE_ERROR};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on a request (headers plus body).
const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// How long a client gets to deliver its whole request.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

pub struct RpcServer {
    listener: TcpListener,
    handler: Arc<RpcHandler>,
    read_timeout: Duration,
}

impl RpcServer {
    pub async fn bind(addr: &str, handler: Arc<RpcHandler>) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        tracing::info!("✅ RPC server listening on {}", self.listener.local_addr()?);

        loop {
            let (socket, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("🛑 RPC server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted?,
            };
            let handler = self.handler.clone();
            let read_timeout = self.read_timeout;

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(socket, handler, read_timeout).await {
                    tracing::warn!("RPC error from {}: {}", peer_addr, e);
                }
            });
        }
    }

    async fn handle_connection(
        mut socket: TcpStream,
        handler: Arc<RpcHandler>,
        read_timeout: Duration,
    ) -> Result<(), std::io::Error> {
        let body = match tokio::time::timeout(read_timeout, read_request_body(&mut socket)).await
        {
            Ok(read) => match read? {
                Some(body) => body,
                None => return Ok(()),
            },
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("request not received within {:?}", read_timeout),
                ))
            }
        };

        let response = if body.trim().is_empty() {
            RpcResponse::failure(
                Value::Null,
                RpcError {
                    code: PARSE_ERROR,
                    message: "No request body".to_string(),
                },
            )
        } else {
            match serde_json::from_str::<RpcRequest>(body.trim_end_matches('\0')) {
                Ok(request) => {
                    tracing::debug!(method = %request.method, "RPC request");
                    handler.handle_request(request).await
                }
                Err(e) => RpcResponse::failure(
                    Value::Null,
                    RpcError {
                        code: PARSE_ERROR,
                        message: format!("Parse error: {}", e),
                    },
                ),
            }
        };

        let response_json = serde_json::to_string(&response)?;
        let http_response = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            response_json.len(),
            response_json
        );

        socket.write_all(http_response.as_bytes()).await?;
        socket.flush().await?;
        Ok(())
    }
}

/// Read an HTTP request and return its body. `None` if the peer closed
/// the connection without sending anything.
async fn read_request_body(socket: &mut TcpStream) -> Result<Option<String>, std::io::Error> {
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > MAX_REQUEST_SIZE {
            return Err(too_large());
        }
        if request_complete(&buffer)? {
            break;
        }
    }

    if buffer.is_empty() {
        return Ok(None);
    }

    let text = String::from_utf8_lossy(&buffer);
    let body = match text.find("\r\n\r\n") {
        Some(start) => &text[start + 4..],
        None => match text.find("\n\n") {
            Some(start) => &text[start + 2..],
            None => "",
        },
    };
    Ok(Some(body.to_string()))
}

fn too_large() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "request too large")
}

/// Whether `buffer` holds the full head and the declared body. A declared
/// length that cannot fit in [`MAX_REQUEST_SIZE`] is rejected up front.
fn request_complete(buffer: &[u8]) -> Result<bool, std::io::Error> {
    let Some((header_end, content_length)) = parse_head(buffer) else {
        return Ok(false);
    };
    if content_length > MAX_REQUEST_SIZE {
        return Err(too_large());
    }
    Ok(buffer.len() >= header_end.saturating_add(content_length))
}

/// Offset of the body and the declared Content-Length (0 if absent).
fn parse_head(buffer: &[u8]) -> Option<(usize, usize)> {
    let header_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let head = String::from_utf8_lossy(&buffer[..header_end]);
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0);
    Some((header_end, content_length))
}
