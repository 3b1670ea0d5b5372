//! Local stand-ins for the matchmaking server, chain node and rate service.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};

/// A request seen by [`serve_http`]
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Path including the query string
    pub target: String,
    pub body: Value,
}

/// Serve HTTP/1.1 on a random local port, one request per connection.
///
/// Returns the base URL and the accept task.
pub async fn serve_http<F>(respond: F) -> (String, JoinHandle<()>)
where
    F: Fn(&HttpRequest) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let respond = Arc::new(respond);

    let task = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let respond = respond.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(stream).await {
                    let (mut stream, request) = request;
                    let (status, body) = respond(&request);
                    let response = format!(
                        "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });
        }
    });

    (url, task)
}

async fn read_request(stream: TcpStream) -> Option<(TcpStream, HttpRequest)> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await.ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok()?;
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.ok()?;
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

    Some((
        reader.into_inner(),
        HttpRequest {
            method,
            target,
            body,
        },
    ))
}

/// JSON-RPC success body answering `request`
pub fn rpc_result(request: &HttpRequest, result: Value) -> (u16, String) {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": request.body["id"],
        "result": result,
    });
    (200, body.to_string())
}

/// JSON-RPC error body answering `request`
pub fn rpc_error(request: &HttpRequest, code: i64, message: &str) -> (u16, String) {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": request.body["id"],
        "error": { "code": code, "message": message },
    });
    (200, body.to_string())
}

/// Websocket server accepting a single client.
pub struct WsServer {
    pub url: String,
    /// Text frames received from the client
    pub received: mpsc::UnboundedReceiver<String>,
    /// Frames to push to the client
    pub outbound: mpsc::UnboundedSender<String>,
}

impl WsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            pump(ws, received_tx, outbound_rx).await;
        });

        Self {
            url,
            received,
            outbound,
        }
    }

    pub fn push(&self, frame: impl Into<String>) {
        self.outbound.send(frame.into()).unwrap();
    }

    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("server stopped")
    }
}

async fn pump(
    ws: WebSocketStream<TcpStream>,
    received: mpsc::UnboundedSender<String>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = received.send(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if write.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}
