/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Negotiation state machine and task lifecycle handlers.
//!
//! SendMessage is two-phase: the quote phase is read-only and idempotent,
//! and nothing is persisted until the caller resends with `acceptQuote=true`.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use hiveplan_store::{task_status, AgentRegistry, NewTask, StoreError, TaskStore, SOURCE_PROTOCOL_A2A};

use crate::protocol::{self, RpcError};
use crate::quote::build_quote;
use crate::request::{CancelTaskParams, GetTaskParams, ListTasksParams, SendMessageParams};
use crate::status::{map_status, task_from_row, user_message, A2aStatusInfo, A2aTask, A2aTaskState};

/// Task titles are capped; the full description is always retained.
const TITLE_MAX_CHARS: usize = 200;

/// Handlers are stateless per call; all state lives behind the repositories.
pub struct A2aGateway {
    tasks: Arc<dyn TaskStore>,
    agents: Arc<dyn AgentRegistry>,
}

fn internal(e: &StoreError) -> RpcError {
    warn!(error = %e, "storage failure behind gateway");
    (protocol::INTERNAL_ERROR, "internal error".to_string())
}

fn to_result(task: &A2aTask) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(task)
        .map_err(|e| (protocol::INTERNAL_ERROR, format!("serialization failed: {e}")))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl A2aGateway {
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskStore>, agents: Arc<dyn AgentRegistry>) -> Self {
        Self { tasks, agents }
    }

    /// `a2a.SendMessage` — quote phase (no `acceptQuote`) or commit phase.
    ///
    /// # Errors
    ///
    /// `INTERNAL_ERROR` on storage failure. Param validation happens at the
    /// dispatcher boundary.
    pub async fn send_message(
        &self,
        workspace_id: Uuid,
        p: SendMessageParams,
    ) -> Result<serde_json::Value, RpcError> {
        let session_id = p.session_id.unwrap_or_else(Uuid::new_v4);

        if !p.accept_quote {
            // Quote phase: read-only, nothing is persisted.
            let quote = build_quote(self.agents.as_ref(), workspace_id)
                .await
                .map_err(|e| internal(&e))?;
            let quote_json =
                serde_json::to_value(&quote).map_err(|e| (protocol::INTERNAL_ERROR, e.to_string()))?;

            let status_message = serde_json::json!({
                "role": "agent",
                "parts": [
                    { "type": "data", "data": { "quote": quote_json } },
                    { "type": "text", "text": quote.summary() },
                ],
            });

            let task = A2aTask {
                id: Uuid::new_v4().to_string(),
                session_id: Some(session_id),
                status: A2aStatusInfo {
                    state: A2aTaskState::InputRequired,
                    message: Some(status_message),
                },
                messages: vec![user_message(&p.text)],
                metadata: Some(serde_json::json!({ "quote": quote_json })),
            };
            info!(
                workspace_id = %workspace_id,
                price_cents = quote.price_cents,
                "A2A quote issued"
            );
            return to_result(&task);
        }

        // Commit phase: the only mutation in the handshake.
        let row = self
            .tasks
            .insert(NewTask {
                workspace_id,
                project_id: p.session_id,
                status: task_status::TODO.to_string(),
                title: truncate_chars(&p.text, TITLE_MAX_CHARS),
                description: p.text,
                source_protocol: Some(SOURCE_PROTOCOL_A2A.to_string()),
            })
            .await
            .map_err(|e| internal(&e))?;

        info!(task_id = %row.id, workspace_id = %workspace_id, "A2A task committed");

        let mut task = task_from_row(&row);
        task.session_id = Some(session_id);
        to_result(&task)
    }

    /// `a2a.GetTask`
    ///
    /// # Errors
    ///
    /// `TASK_NOT_FOUND` for a missing or soft-deleted task.
    pub async fn get_task(&self, p: GetTaskParams) -> Result<serde_json::Value, RpcError> {
        let row = self
            .tasks
            .get(p.id)
            .await
            .map_err(|e| internal(&e))?
            .ok_or_else(|| (protocol::TASK_NOT_FOUND, "task not found".to_string()))?;
        to_result(&task_from_row(&row))
    }

    /// `a2a.CancelTask` — rejects cancellation of completed work; cancelling
    /// an already-cancelled task is an idempotent success.
    ///
    /// # Errors
    ///
    /// `TASK_NOT_FOUND` for a missing task, `INVALID_REQUEST` when the task
    /// is `done`.
    pub async fn cancel_task(&self, p: CancelTaskParams) -> Result<serde_json::Value, RpcError> {
        let row = self
            .tasks
            .get(p.id)
            .await
            .map_err(|e| internal(&e))?
            .ok_or_else(|| (protocol::TASK_NOT_FOUND, "task not found".to_string()))?;

        if row.status == task_status::DONE {
            return Err((
                protocol::INVALID_REQUEST,
                "cannot cancel a completed task".to_string(),
            ));
        }

        self.tasks
            .update_status(row.id, task_status::CANCELLED)
            .await
            .map_err(|e| internal(&e))?;

        info!(task_id = %row.id, "A2A task cancelled");

        let mut task = task_from_row(&row);
        task.status.state = map_status(task_status::CANCELLED);
        // The reason travels in the response only; nothing is persisted.
        if let Some(reason) = p.reason.as_deref() {
            task.messages.push(user_message(reason));
        }
        to_result(&task)
    }

    /// `a2a.ListTasks` — tasks owned by the session's project, plus every
    /// protocol-originated task in the workspace, deduplicated by id.
    ///
    /// # Errors
    ///
    /// `INTERNAL_ERROR` on storage failure.
    pub async fn list_tasks(
        &self,
        workspace_id: Uuid,
        p: ListTasksParams,
    ) -> Result<serde_json::Value, RpcError> {
        let mut rows = self
            .tasks
            .list_by_project(p.session_id)
            .await
            .map_err(|e| internal(&e))?;
        let tagged = self
            .tasks
            .list_by_source_protocol(workspace_id, SOURCE_PROTOCOL_A2A)
            .await
            .map_err(|e| internal(&e))?;

        for row in tagged {
            if !rows.iter().any(|r| r.id == row.id) {
                rows.push(row);
            }
        }

        let tasks: Vec<serde_json::Value> = rows
            .iter()
            .map(task_from_row)
            .map(|t| to_result(&t))
            .collect::<Result<_, _>>()?;
        Ok(serde_json::json!({ "tasks": tasks }))
    }
}
