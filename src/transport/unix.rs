//! Unix domain socket transport: newline-delimited JSON-RPC, one request
//! per line, ordered replies per connection.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hub_core::error::Result;
use hub_core::jsonrpc::{Dispatcher, Request, Response, RpcError};

/// Lines beyond this are rejected with a parse error.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

pub struct UnixTransport {
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl UnixTransport {
    pub fn new(path: PathBuf, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Self {
        UnixTransport {
            path,
            dispatcher,
            shutdown,
        }
    }

    /// Accept loop. The stale socket file is replaced on start and
    /// removed again on shutdown.
    pub async fn run(&self) -> Result<()> {
        let _ = std::fs::remove_file(&self.path);
        let listener = UnixListener::bind(&self.path)?;
        info!(path = %self.path.display(), "unix transport listening");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let dispatcher = self.dispatcher.clone();
                            let shutdown = self.shutdown.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, dispatcher, shutdown).await;
                            });
                        }
                        Err(err) => {
                            warn!(error = %err, "unix accept failed");
                        }
                    }
                }
            }
        }

        let _ = std::fs::remove_file(&self.path);
        info!("unix transport stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_line(&mut line) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                let response = handle_line(&dispatcher, &line).await;
                let Some(response) = response else { continue };
                if write_response(&mut write_half, &response).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                debug!(error = %err, "unix connection read failed");
                break;
            }
        }
    }
}

async fn handle_line(dispatcher: &Dispatcher, line: &str) -> Option<Response> {
    if line.len() > MAX_LINE_BYTES {
        return Some(Response::error(RpcError::parse_error(), None));
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Request>(trimmed) {
        Ok(request) => Some(dispatcher.handle(request).await),
        Err(_) => Some(Response::error(RpcError::parse_error(), None)),
    }
}

async fn write_response(write_half: &mut OwnedWriteHalf, response: &Response) -> std::io::Result<()> {
    let mut data = serde_json::to_vec(response).unwrap_or_else(|_| {
        b"{\"jsonrpc\":\"2.0\",\"error\":{\"code\":-32603,\"message\":\"encoding failure\"}}"
            .to_vec()
    });
    data.push(b'\n');
    write_half.write_all(&data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn dispatcher() -> Arc<Dispatcher> {
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.register("echo", |params| async move { Ok(params) });
        dispatcher
    }

    async fn roundtrip(path: &std::path::Path, line: &str) -> Response {
        let stream = UnixStream::connect(path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(line.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();
        let mut reader = BufReader::new(read_half);
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn serves_ndjson_requests() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hub.sock");
        let shutdown = CancellationToken::new();
        let transport = UnixTransport::new(path.clone(), dispatcher(), shutdown.clone());
        let server = tokio::spawn(async move { transport.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let response = roundtrip(
            &path,
            &json!({"jsonrpc": "2.0", "method": "echo", "params": {"n": 1}, "id": 1}).to_string(),
        )
        .await;
        assert_eq!(response.result.unwrap()["n"], 1);

        shutdown.cancel();
        server.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn invalid_json_yields_parse_error_and_connection_survives() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hub.sock");
        let shutdown = CancellationToken::new();
        let transport = UnixTransport::new(path.clone(), dispatcher(), shutdown.clone());
        let server = tokio::spawn(async move { transport.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let stream = UnixStream::connect(&path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"{garbage\n").await.unwrap();
        write_half
            .write_all(
                format!(
                    "{}\n",
                    json!({"jsonrpc": "2.0", "method": "echo", "params": 7, "id": 2})
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let mut reader = BufReader::new(read_half);
        let mut first = String::new();
        reader.read_line(&mut first).await.unwrap();
        let first: Response = serde_json::from_str(&first).unwrap();
        assert_eq!(
            first.error.unwrap().code,
            hub_core::jsonrpc::codes::PARSE_ERROR
        );

        let mut second = String::new();
        reader.read_line(&mut second).await.unwrap();
        let second: Response = serde_json::from_str(&second).unwrap();
        assert_eq!(second.result.unwrap(), 7);

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hub.sock");
        let shutdown = CancellationToken::new();
        let transport = UnixTransport::new(path.clone(), dispatcher(), shutdown.clone());
        let server = tokio::spawn(async move { transport.run().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let huge = format!(
            "{{\"jsonrpc\":\"2.0\",\"method\":\"echo\",\"params\":\"{}\",\"id\":1}}",
            "x".repeat(MAX_LINE_BYTES + 16)
        );
        let response = roundtrip(&path, &huge).await;
        assert_eq!(
            response.error.unwrap().code,
            hub_core::jsonrpc::codes::PARSE_ERROR
        );

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
