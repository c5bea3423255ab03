/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Internal task status → protocol-visible state mapping, and the
//! protocol task representation returned by every method.

use serde::Serialize;
use uuid::Uuid;

use hiveplan_store::TaskRow;

/// Protocol-visible task states.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum A2aTaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
}

/// Total mapping from stored status to protocol state. Any unlisted value
/// maps to `Submitted`; this function never fails.
#[must_use]
pub fn map_status(internal: &str) -> A2aTaskState {
    match internal {
        "in_progress" => A2aTaskState::Working,
        "negotiating" => A2aTaskState::InputRequired,
        "done" => A2aTaskState::Completed,
        "cancelled" => A2aTaskState::Canceled,
        "failed" => A2aTaskState::Failed,
        _ => A2aTaskState::Submitted,
    }
}

#[derive(Serialize, Debug)]
pub struct A2aStatusInfo {
    pub state: A2aTaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
}

/// The task representation on the wire. `messages` is reconstructed on
/// every read, never stored.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct A2aTask {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub status: A2aStatusInfo,
    pub messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A synthetic user message with a single text part.
#[must_use]
pub fn user_message(text: &str) -> serde_json::Value {
    serde_json::json!({
        "role": "user",
        "parts": [{ "type": "text", "text": text }],
    })
}

/// Map a persisted task row to its protocol representation. The messages
/// array carries at most one synthetic user message with the full
/// description.
#[must_use]
pub fn task_from_row(row: &TaskRow) -> A2aTask {
    let messages = if row.description.is_empty() {
        Vec::new()
    } else {
        vec![user_message(&row.description)]
    };
    A2aTask {
        id: row.id.to_string(),
        session_id: row.project_id,
        status: A2aStatusInfo {
            state: map_status(&row.status),
            message: None,
        },
        messages,
        metadata: None,
    }
}
