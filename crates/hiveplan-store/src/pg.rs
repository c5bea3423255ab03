/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Postgres-backed storage adapter.
//!
//! JSON-encoded columns (`channels.config`, `channels.events`) are parsed
//! into structured values here, at the store boundary, so handler bodies
//! never touch raw JSON blobs.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::{
    Agent, AgentRegistry, AgentSkill, Channel, ChannelConfig, ChannelRegistry, ChannelType,
    DeliveryLog, EmailSink, NewChannelDelivery, NewTask, NotificationSink, Severity, StoreError,
    TaskRow, TaskStore,
};

/// All six repository traits backed by one `PgPool`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type TaskTuple = (
    Uuid,
    Uuid,
    Option<Uuid>,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
);

fn task_from_tuple(t: TaskTuple) -> TaskRow {
    TaskRow {
        id: t.0,
        workspace_id: t.1,
        project_id: t.2,
        status: t.3,
        title: t.4,
        description: t.5,
        source_protocol: t.6,
        created_at: t.7,
    }
}

const TASK_COLUMNS: &str =
    "id, workspace_id, project_id, status, title, description, source_protocol, created_at";

#[async_trait::async_trait]
impl TaskStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<TaskRow>, StoreError> {
        let row: Option<TaskTuple> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND deleted_at IS NULL",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(task_from_tuple))
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<TaskRow>, StoreError> {
        let rows: Vec<TaskTuple> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE project_id = $1 AND deleted_at IS NULL
             ORDER BY created_at ASC",
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(task_from_tuple).collect())
    }

    async fn list_by_source_protocol(
        &self,
        workspace_id: Uuid,
        protocol: &str,
    ) -> Result<Vec<TaskRow>, StoreError> {
        let rows: Vec<TaskTuple> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE workspace_id = $1 AND source_protocol = $2 AND deleted_at IS NULL
             ORDER BY created_at ASC",
        ))
        .bind(workspace_id)
        .bind(protocol)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(task_from_tuple).collect())
    }

    async fn insert(&self, task: NewTask) -> Result<TaskRow, StoreError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO tasks
                 (id, workspace_id, project_id, status, title, description,
                  source_protocol, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(task.workspace_id)
        .bind(task.project_id)
        .bind(&task.status)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.source_protocol)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(TaskRow {
            id,
            workspace_id: task.workspace_id,
            project_id: task.project_id,
            status: task.status,
            title: task.title,
            description: task.description,
            source_protocol: task.source_protocol,
            created_at,
        })
    }

    async fn update_status(&self, id: Uuid, status: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks SET status = $2, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AgentRegistry for PgStore {
    async fn list_active_agents(&self, workspace_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        let rows: Vec<(Uuid, Uuid, String)> = sqlx::query_as(
            "SELECT id, workspace_id, name FROM agents
             WHERE workspace_id = $1 AND active AND deleted_at IS NULL
             ORDER BY created_at ASC",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, workspace_id, name)| Agent {
                id,
                workspace_id,
                name,
            })
            .collect())
    }

    async fn list_skills(&self, agent_id: Uuid) -> Result<Vec<AgentSkill>, StoreError> {
        let rows: Vec<(Uuid, String, i64)> = sqlx::query_as(
            "SELECT agent_id, name, price_cents FROM agent_skills
             WHERE agent_id = $1
             ORDER BY created_at ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(agent_id, name, price_cents)| AgentSkill {
                agent_id,
                name,
                price_cents,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ChannelRegistry for PgStore {
    async fn list_active_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>, StoreError> {
        let rows: Vec<(
            Uuid,
            Uuid,
            String,
            String,
            serde_json::Value,
            serde_json::Value,
            String,
            bool,
        )> = sqlx::query_as(
            "SELECT id, workspace_id, channel_type, name, config, events, min_severity, active
             FROM channels
             WHERE workspace_id = $1 AND active AND deleted_at IS NULL
             ORDER BY created_at ASC",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        let mut channels = Vec::with_capacity(rows.len());
        for (id, workspace_id, channel_type, name, config, events, min_severity, active) in rows {
            let config: ChannelConfig = serde_json::from_value(config)?;
            let events: Vec<String> = serde_json::from_value(events)?;
            channels.push(Channel {
                id,
                workspace_id,
                channel_type: ChannelType::parse(&channel_type),
                name,
                config,
                events,
                min_severity: Severity::parse_or_info(&min_severity),
                active,
            });
        }
        Ok(channels)
    }
}

#[async_trait::async_trait]
impl DeliveryLog for PgStore {
    async fn record(&self, d: NewChannelDelivery) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO channel_deliveries
                 (id, channel_id, event, payload, status, attempts,
                  last_attempt_at, response_status, error_message, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(d.channel_id)
        .bind(&d.event)
        .bind(&d.payload)
        .bind(d.status.as_str())
        .bind(d.attempts)
        .bind(d.last_attempt_at)
        .bind(d.response_status)
        .bind(&d.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationSink for PgStore {
    async fn insert_notification(
        &self,
        user_id: Uuid,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, body, created_at)
             VALUES ($1, $2, $3, $4, $5, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind)
        .bind(title)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EmailSink for PgStore {
    async fn enqueue_email(&self, user_id: Uuid, subject: &str, body: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO email_queue (id, user_id, subject, body, status, created_at)
             VALUES ($1, $2, $3, $4, 'pending', NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(subject)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
