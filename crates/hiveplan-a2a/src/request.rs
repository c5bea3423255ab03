/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Typed request variants, validated at the dispatcher boundary.
//!
//! Loose `params` JSON is checked into a per-method struct here; handlers
//! never see raw JSON. Unknown methods fall through to `METHOD_NOT_FOUND`.

use serde::Deserialize;
use uuid::Uuid;

use crate::protocol::{self, RpcError};

/// The closed set of supported A2A methods.
#[derive(Debug)]
pub enum A2aRequest {
    SendMessage(SendMessageParams),
    GetTask(GetTaskParams),
    CancelTask(CancelTaskParams),
    ListTasks(ListTasksParams),
}

/// One part of an A2A message. Parts are loosely typed on the wire; only
/// text parts are required for negotiation.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type", default)]
    pub part_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct A2aMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRaw {
    message: Option<A2aMessage>,
    #[serde(default)]
    session_id: Option<Uuid>,
    #[serde(default)]
    accept_quote: bool,
}

/// Validated SendMessage parameters. `text` is the first non-empty text
/// part of the message, which becomes the task description on commit.
#[derive(Debug)]
pub struct SendMessageParams {
    pub text: String,
    pub session_id: Option<Uuid>,
    pub accept_quote: bool,
}

#[derive(Debug, Deserialize)]
struct GetTaskRaw {
    id: Option<Uuid>,
}

#[derive(Debug)]
pub struct GetTaskParams {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CancelTaskRaw {
    id: Option<Uuid>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug)]
pub struct CancelTaskParams {
    pub id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksRaw {
    session_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct ListTasksParams {
    pub session_id: Uuid,
}

fn invalid_params(msg: &str) -> RpcError {
    (protocol::INVALID_PARAMS, msg.to_string())
}

impl A2aRequest {
    /// Validate `params` against the schema for `method`.
    ///
    /// # Errors
    ///
    /// `METHOD_NOT_FOUND` for an unrecognized method, `INVALID_PARAMS` for a
    /// body that fails the per-method schema. No side effect occurs on a
    /// validation failure.
    pub fn parse(method: &str, params: &serde_json::Value) -> Result<Self, RpcError> {
        match method {
            "a2a.SendMessage" => {
                let raw: SendMessageRaw = serde_json::from_value(params.clone())
                    .map_err(|e| invalid_params(&format!("malformed params: {e}")))?;
                let message = raw
                    .message
                    .ok_or_else(|| invalid_params("message is required"))?;
                let text = message
                    .parts
                    .iter()
                    .find_map(|p| p.text.as_deref().filter(|t| !t.is_empty()))
                    .ok_or_else(|| invalid_params("message must include a text part"))?
                    .to_string();
                Ok(Self::SendMessage(SendMessageParams {
                    text,
                    session_id: raw.session_id,
                    accept_quote: raw.accept_quote,
                }))
            }
            "a2a.GetTask" => {
                let raw: GetTaskRaw = serde_json::from_value(params.clone())
                    .map_err(|e| invalid_params(&format!("malformed params: {e}")))?;
                let id = raw.id.ok_or_else(|| invalid_params("id is required"))?;
                Ok(Self::GetTask(GetTaskParams { id }))
            }
            "a2a.CancelTask" => {
                let raw: CancelTaskRaw = serde_json::from_value(params.clone())
                    .map_err(|e| invalid_params(&format!("malformed params: {e}")))?;
                let id = raw.id.ok_or_else(|| invalid_params("id is required"))?;
                Ok(Self::CancelTask(CancelTaskParams {
                    id,
                    reason: raw.reason,
                }))
            }
            "a2a.ListTasks" => {
                let raw: ListTasksRaw = serde_json::from_value(params.clone())
                    .map_err(|e| invalid_params(&format!("malformed params: {e}")))?;
                let session_id = raw
                    .session_id
                    .ok_or_else(|| invalid_params("sessionId is required"))?;
                Ok(Self::ListTasks(ListTasksParams { session_id }))
            }
            other => Err((
                protocol::METHOD_NOT_FOUND,
                format!("unknown method: {other}"),
            )),
        }
    }
}
