/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! In-memory storage adapter for tests and local development.
//!
//! Behaves like [`crate::pg::PgStore`] over `Vec`s behind mutexes. Locks are
//! never held across an await point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    Agent, AgentRegistry, AgentSkill, Channel, ChannelRegistry, DeliveryLog, EmailSink,
    NewChannelDelivery, NewTask, NotificationSink, StoreError, TaskRow, TaskStore,
};

/// A recorded in-app notification.
#[derive(Debug, Clone)]
pub struct StoredNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
}

/// A recorded outbound email.
#[derive(Debug, Clone)]
pub struct StoredEmail {
    pub user_id: Uuid,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct MemStore {
    tasks: Mutex<Vec<TaskRow>>,
    agents: Mutex<Vec<Agent>>,
    skills: Mutex<Vec<AgentSkill>>,
    channels: Mutex<Vec<Channel>>,
    deliveries: Mutex<Vec<NewChannelDelivery>>,
    notifications: Mutex<Vec<StoredNotification>>,
    emails: Mutex<Vec<StoredEmail>>,
    /// When set, sink writes fail, for exercising delivery failure paths.
    fail_sinks: AtomicBool,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&self, agent: Agent) {
        self.agents.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(agent);
    }

    pub fn add_skill(&self, skill: AgentSkill) {
        self.skills.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(skill);
    }

    pub fn add_channel(&self, channel: Channel) {
        self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(channel);
    }

    pub fn add_task(&self, task: TaskRow) {
        self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(task);
    }

    pub fn set_fail_sinks(&self, fail: bool) {
        self.fail_sinks.store(fail, Ordering::Relaxed);
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn deliveries(&self) -> Vec<NewChannelDelivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<StoredNotification> {
        self.notifications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn emails(&self) -> Vec<StoredEmail> {
        self.emails
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn sink_guard(&self) -> Result<(), StoreError> {
        if self.fail_sinks.load(Ordering::Relaxed) {
            return Err(StoreError::Db(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskStore for MemStore {
    async fn get(&self, id: Uuid) -> Result<Option<TaskRow>, StoreError> {
        let tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<TaskRow>, StoreError> {
        let tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tasks
            .iter()
            .filter(|t| t.project_id == Some(project_id))
            .cloned()
            .collect())
    }

    async fn list_by_source_protocol(
        &self,
        workspace_id: Uuid,
        protocol: &str,
    ) -> Result<Vec<TaskRow>, StoreError> {
        let tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tasks
            .iter()
            .filter(|t| {
                t.workspace_id == workspace_id && t.source_protocol.as_deref() == Some(protocol)
            })
            .cloned()
            .collect())
    }

    async fn insert(&self, task: NewTask) -> Result<TaskRow, StoreError> {
        let row = TaskRow {
            id: Uuid::new_v4(),
            workspace_id: task.workspace_id,
            project_id: task.project_id,
            status: task.status,
            title: task.title,
            description: task.description,
            source_protocol: task.source_protocol,
            created_at: Utc::now(),
        };
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(row.clone());
        Ok(row)
    }

    async fn update_status(&self, id: Uuid, status: &str) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = status.to_string();
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AgentRegistry for MemStore {
    async fn list_active_agents(&self, workspace_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        let agents = self.agents.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(agents
            .iter()
            .filter(|a| a.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn list_skills(&self, agent_id: Uuid) -> Result<Vec<AgentSkill>, StoreError> {
        let skills = self.skills.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(skills
            .iter()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ChannelRegistry for MemStore {
    async fn list_active_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>, StoreError> {
        let channels = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(channels
            .iter()
            .filter(|c| c.workspace_id == workspace_id && c.active)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl DeliveryLog for MemStore {
    async fn record(&self, delivery: NewChannelDelivery) -> Result<(), StoreError> {
        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(delivery);
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationSink for MemStore {
    async fn insert_notification(
        &self,
        user_id: Uuid,
        kind: &str,
        title: &str,
        body: &str,
    ) -> Result<(), StoreError> {
        self.sink_guard()?;
        self.notifications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(StoredNotification {
                user_id,
                kind: kind.to_string(),
                title: title.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

#[async_trait::async_trait]
impl EmailSink for MemStore {
    async fn enqueue_email(&self, user_id: Uuid, subject: &str, body: &str) -> Result<(), StoreError> {
        self.sink_guard()?;
        self.emails
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(StoredEmail {
                user_id,
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::task_status;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemStore::new();
        let row = store
            .insert(NewTask {
                workspace_id: Uuid::new_v4(),
                project_id: None,
                status: task_status::TODO.to_string(),
                title: "t".to_string(),
                description: "d".to_string(),
                source_protocol: Some(crate::SOURCE_PROTOCOL_A2A.to_string()),
            })
            .await
            .unwrap();

        let fetched = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, "todo");
        assert_eq!(fetched.source_protocol.as_deref(), Some("a2a"));
    }

    #[tokio::test]
    async fn test_update_status() {
        let store = MemStore::new();
        let row = store
            .insert(NewTask {
                workspace_id: Uuid::new_v4(),
                project_id: None,
                status: task_status::TODO.to_string(),
                title: "t".to_string(),
                description: "d".to_string(),
                source_protocol: None,
            })
            .await
            .unwrap();

        store.update_status(row.id, task_status::CANCELLED).await.unwrap();
        let fetched = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, "cancelled");
    }

    #[tokio::test]
    async fn test_sink_failure_flag() {
        let store = MemStore::new();
        store.set_fail_sinks(true);
        let err = store
            .insert_notification(Uuid::new_v4(), "event", "t", "b")
            .await;
        assert!(err.is_err());
        assert!(store.notifications().is_empty());
    }
}
