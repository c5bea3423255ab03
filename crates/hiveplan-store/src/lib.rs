/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Repository traits and row types consumed by the A2A gateway and the
//! event delivery engine.
//!
//! Handlers receive these traits explicitly; there is no module-level
//! connection singleton. Two backends exist: [`pg::PgStore`] (production)
//! and [`mem::MemStore`] (tests and local development).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

pub mod mem;
pub mod pg;

/// Errors from storage adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("malformed stored value: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Task rows
// ---------------------------------------------------------------------------

/// Internal task statuses as stored. The protocol-visible state is always
/// derived from these, never stored.
pub mod task_status {
    pub const TODO: &str = "todo";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const NEGOTIATING: &str = "negotiating";
    pub const DONE: &str = "done";
    pub const CANCELLED: &str = "cancelled";
    pub const FAILED: &str = "failed";
}

/// Protocol tag for tasks created through the A2A gateway.
pub const SOURCE_PROTOCOL_A2A: &str = "a2a";

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// Owning project; A2A calls treat this as the session id.
    pub project_id: Option<Uuid>,
    pub status: String,
    pub title: String,
    pub description: String,
    pub source_protocol: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub workspace_id: Uuid,
    pub project_id: Option<Uuid>,
    pub status: String,
    pub title: String,
    pub description: String,
    pub source_protocol: Option<String>,
}

// ---------------------------------------------------------------------------
// Agents and skills
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AgentSkill {
    pub agent_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Event severity, totally ordered: info < warning < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Parse a stored/wire severity, defaulting to `Info` for anything
    /// unrecognized. Producers that omit severity get `info`.
    #[must_use]
    pub fn parse_or_info(s: &str) -> Self {
        match s {
            "warning" => Self::Warning,
            "critical" => Self::Critical,
            _ => Self::Info,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Channel destination type. Stored as text; unrecognized values are kept
/// verbatim so the delivery executor can record a descriptive failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelType {
    SlackWebhook,
    DiscordWebhook,
    Webhook,
    InApp,
    Email,
    Other(String),
}

impl ChannelType {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "slack_webhook" => Self::SlackWebhook,
            "discord_webhook" => Self::DiscordWebhook,
            "webhook" => Self::Webhook,
            "in_app" => Self::InApp,
            "email" => Self::Email,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SlackWebhook => "slack_webhook",
            Self::DiscordWebhook => "discord_webhook",
            Self::Webhook => "webhook",
            Self::InApp => "in_app",
            Self::Email => "email",
            Self::Other(s) => s,
        }
    }

    /// True for the channel types delivered over HTTP (the only ones that
    /// retry).
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self, Self::SlackWebhook | Self::DiscordWebhook | Self::Webhook)
    }
}

/// Type-specific channel settings, parsed from the stored JSON blob at the
/// store boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub channel_type: ChannelType,
    pub name: String,
    pub config: ChannelConfig,
    /// Glob patterns over dot-separated event names.
    pub events: Vec<String>,
    pub min_severity: Severity,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Delivery audit records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

/// Append-only audit record, written exactly once per dispatch-to-channel
/// cycle after all attempts conclude.
#[derive(Debug, Clone)]
pub struct NewChannelDelivery {
    pub channel_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub last_attempt_at: DateTime<Utc>,
    pub response_status: Option<i32>,
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Repository traits
// ---------------------------------------------------------------------------

/// Task persistence. All reads exclude soft-deleted rows.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<TaskRow>, StoreError>;
    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<TaskRow>, StoreError>;
    async fn list_by_source_protocol(
        &self,
        workspace_id: Uuid,
        protocol: &str,
    ) -> Result<Vec<TaskRow>, StoreError>;
    async fn insert(&self, task: NewTask) -> Result<TaskRow, StoreError>;
    async fn update_status(&self, id: Uuid, status: &str) -> Result<(), StoreError>;
}

/// Read-only view of the workspace's active agents and their skills.
#[async_trait::async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn list_active_agents(&self, workspace_id: Uuid) -> Result<Vec<Agent>, StoreError>;
    async fn list_skills(&self, agent_id: Uuid) -> Result<Vec<AgentSkill>, StoreError>;
}

/// Active channel configurations for a workspace, in registry order.
#[async_trait::async_trait]
pub trait ChannelRegistry: Send + Sync {
    async fn list_active_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>, StoreError>;
}

/// Append-only delivery audit log.
#[async_trait::async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn record(&self, delivery: NewChannelDelivery) -> Result<(), StoreError>;
}

/// In-app notification sink.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn insert_notification(
        &self,
        user_id: Uuid,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<(), StoreError>;
}

/// Outbound email queue.
#[async_trait::async_trait]
pub trait EmailSink: Send + Sync {
    async fn enqueue_email(
        &self,
        user_id: Uuid,
        subject: &str,
        body: &str,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert!(Severity::Info < Severity::Critical);
    }

    #[test]
    fn test_severity_parse_defaults_to_info() {
        assert_eq!(Severity::parse_or_info("warning"), Severity::Warning);
        assert_eq!(Severity::parse_or_info("critical"), Severity::Critical);
        assert_eq!(Severity::parse_or_info("info"), Severity::Info);
        assert_eq!(Severity::parse_or_info(""), Severity::Info);
        assert_eq!(Severity::parse_or_info("debug"), Severity::Info);
    }

    #[test]
    fn test_channel_type_round_trip() {
        for s in ["slack_webhook", "discord_webhook", "webhook", "in_app", "email"] {
            assert_eq!(ChannelType::parse(s).as_str(), s);
        }
        let other = ChannelType::parse("pager");
        assert_eq!(other, ChannelType::Other("pager".to_string()));
        assert_eq!(other.as_str(), "pager");
    }

    #[test]
    fn test_channel_type_http_split() {
        assert!(ChannelType::SlackWebhook.is_http());
        assert!(ChannelType::DiscordWebhook.is_http());
        assert!(ChannelType::Webhook.is_http());
        assert!(!ChannelType::InApp.is_http());
        assert!(!ChannelType::Email.is_http());
        assert!(!ChannelType::Other("pager".to_string()).is_http());
    }

    #[test]
    fn test_channel_config_parses_partial_json() {
        let cfg: ChannelConfig =
            serde_json::from_value(serde_json::json!({ "url": "https://hooks.example/x" }))
                .unwrap();
        assert_eq!(cfg.url.as_deref(), Some("https://hooks.example/x"));
        assert!(cfg.secret.is_none());
        assert!(cfg.user_id.is_none());
    }

    #[test]
    fn test_delivery_status_strings() {
        assert_eq!(DeliveryStatus::Delivered.as_str(), "delivered");
        assert_eq!(DeliveryStatus::Failed.as_str(), "failed");
    }
}
