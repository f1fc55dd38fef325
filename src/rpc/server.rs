// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Local RPC control plane (section 6): line-delimited JSON-RPC 2.0 over
//! a Unix domain socket. Every connection is its own request/response
//! loop; the wire framing is one JSON object per line in both
//! directions, the same shape a co-located CLI or supervisor would speak.

use crate::rpc::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use crate::rpc::service::{RpcService, ServiceError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// RPC server errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The socket path could not be bound.
    #[error("failed to bind control-plane socket")]
    Bind,
}

fn error_response(id: serde_json::Value, code: i32, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::failure(id, JsonRpcError::new(code, message))
}

async fn handle_line(service: &RpcService, line: &str) -> JsonRpcResponse {
    let parsed: Result<JsonRpcRequest, _> = serde_json::from_str(line);
    let request = match parsed {
        Ok(req) => req,
        Err(_) => return error_response(serde_json::Value::Null, PARSE_ERROR, "malformed JSON"),
    };

    if request.jsonrpc != "2.0" || request.method.is_empty() {
        return error_response(request.id, INVALID_REQUEST, "not a well-formed JSON-RPC 2.0 request");
    }

    match service.dispatch(&request.method, request.params).await {
        None => error_response(request.id, METHOD_NOT_FOUND, format!("unknown method `{}`", request.method)),
        Some(Ok(result)) => JsonRpcResponse::success(request.id, result),
        Some(Err(ServiceError::InvalidParams(msg))) => error_response(request.id, INVALID_PARAMS, msg),
        Some(Err(ServiceError::Rejected(msg))) => error_response(request.id, INVALID_PARAMS, msg),
        Some(Err(ServiceError::Internal(msg))) => error_response(request.id, INTERNAL_ERROR, msg),
    }
}

async fn serve_connection(stream: tokio::net::UnixStream, service: Arc<RpcService>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "control-plane connection read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&service, &line).await;
        let Ok(mut encoded) = serde_json::to_vec(&response) else {
            continue;
        };
        encoded.push(b'\n');
        if write_half.write_all(&encoded).await.is_err() {
            break;
        }
    }
}

/// Remove a stale socket file (e.g. left behind by an unclean shutdown)
/// before binding. Any other kind of path collision is left for
/// `UnixListener::bind` to report.
fn clear_stale_socket(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}

/// Bind the control-plane socket at `socket_path` and serve connections
/// until `shutdown` is signalled.
pub async fn serve(socket_path: String, service: Arc<RpcService>, mut shutdown: watch::Receiver<bool>) -> Result<(), RpcError> {
    let path = Path::new(&socket_path);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    clear_stale_socket(path);

    let listener = UnixListener::bind(path).map_err(|_| RpcError::Bind)?;
    info!(socket = %socket_path, "control-plane RPC listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((stream, _addr)) = accepted else {
                    debug!("control-plane accept failed");
                    continue;
                };
                let service = service.clone();
                tokio::spawn(async move {
                    serve_connection(stream, service).await;
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("control-plane RPC shutting down");
    let _ = std::fs::remove_file(path);
    Ok(())
}
