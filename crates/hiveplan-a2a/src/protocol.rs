/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! JSON-RPC 2.0 envelope types and the fixed error taxonomy.

use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 request.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC 2.0 success response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub result: serde_json::Value,
}

/// JSON-RPC 2.0 error response.
#[derive(Debug, Serialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub error: JsonRpcError,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// Fixed error taxonomy. Standard JSON-RPC codes plus the task-not-found
// extension code.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const TASK_NOT_FOUND: i32 = -32001;

/// Handler-level error: taxonomy code plus a human-readable message.
pub type RpcError = (i32, String);

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result,
        }
    }
}

impl JsonRpcErrorResponse {
    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            error: JsonRpcError {
                code,
                message: message.into(),
                data: None,
            },
        }
    }
}

/// Build the single response envelope for a call: result or error.
#[must_use]
pub fn envelope(
    id: Option<serde_json::Value>,
    outcome: Result<serde_json::Value, RpcError>,
) -> serde_json::Value {
    match outcome {
        Ok(result) => serde_json::to_value(JsonRpcResponse::success(id, result))
            .unwrap_or_else(|_| fallback_envelope()),
        Err((code, message)) => serde_json::to_value(JsonRpcErrorResponse::error(id, code, message))
            .unwrap_or_else(|_| fallback_envelope()),
    }
}

fn fallback_envelope() -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": INTERNAL_ERROR, "message": "serialization failed" },
    })
}
