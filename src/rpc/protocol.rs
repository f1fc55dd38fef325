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

//! JSON-RPC 2.0 request/response envelopes carried over the control-plane
//! socket, one object per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `-32700`: the line could not be parsed as JSON.
pub const PARSE_ERROR: i32 = -32700;
/// `-32600`: parsed, but not a well-formed JSON-RPC request.
pub const INVALID_REQUEST: i32 = -32600;
/// `-32601`: `method` is not one this node services.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// `-32602`: `params` did not match what `method` expects.
pub const INVALID_PARAMS: i32 = -32602;
/// `-32603`: the method handler failed for a reason not attributable to
/// the caller's request.
pub const INTERNAL_ERROR: i32 = -32603;

/// An inbound JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed back on the response; callers choose this.
    pub id: Value,
    /// Method name, e.g. `"marketplace.browse"`.
    pub method: String,
    /// Method parameters. Absent is treated as `Value::Null`.
    #[serde(default)]
    pub params: Value,
}

/// An outbound JSON-RPC response: exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// The request id this responds to, or `Value::Null` if it could not
    /// be recovered (e.g. on a parse error).
    pub id: Value,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// One of the standard codes above, or an application code.
    pub code: i32,
    /// Human-readable summary.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Construct an error with no `data`.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

impl JsonRpcResponse {
    /// A successful response carrying `result`.
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    /// A failed response carrying `error`.
    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"status","params":{}}"#;
        let req: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.method, "status");
        assert_eq!(req.id, serde_json::json!(1));
    }

    #[test]
    fn missing_params_defaults_to_null() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"shutdown"}"#;
        let req: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert!(req.params.is_null());
    }

    #[test]
    fn success_response_omits_error_field() {
        let resp = JsonRpcResponse::success(serde_json::json!(1), serde_json::json!({"ok": true}));
        let encoded = serde_json::to_string(&resp).unwrap();
        assert!(!encoded.contains("\"error\""));
    }

    #[test]
    fn failure_response_omits_result_field() {
        let resp = JsonRpcResponse::failure(serde_json::json!(1), JsonRpcError::new(METHOD_NOT_FOUND, "unknown method"));
        let encoded = serde_json::to_string(&resp).unwrap();
        assert!(!encoded.contains("\"result\""));
        assert!(encoded.contains("-32601"));
    }
}
