/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Per-channel delivery with bounded retry.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use tracing::warn;

use hiveplan_store::{Channel, ChannelType, DeliveryStatus};

use crate::format::{discord_payload, sign_webhook_body, slack_payload, webhook_body};
use crate::{DeliveryEngine, EventMessage};

const MAX_ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the HMAC of the generic webhook body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Final state of one dispatch-to-channel cycle.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub response_status: Option<i32>,
    pub error_message: Option<String>,
}

impl DeliveryOutcome {
    fn delivered(attempts: i32, response_status: Option<i32>) -> Self {
        Self {
            status: DeliveryStatus::Delivered,
            attempts,
            response_status,
            error_message: None,
        }
    }

    fn failed(attempts: i32, response_status: Option<i32>, error: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            attempts,
            response_status,
            error_message: Some(error.into()),
        }
    }
}

/// Sleep inserted before the given attempt number (1-based).
fn backoff_before_ms(attempt: u32) -> u64 {
    match attempt {
        2 => 1_000,
        _ => 4_000,
    }
}

impl DeliveryEngine {
    /// Deliver one event to one channel, returning the outcome and the
    /// payload snapshot for the audit record. Never errors; every failure
    /// mode folds into the outcome.
    pub(crate) async fn deliver(
        &self,
        channel: &Channel,
        msg: &EventMessage,
    ) -> (DeliveryOutcome, serde_json::Value) {
        match &channel.channel_type {
            ChannelType::SlackWebhook => {
                let payload = slack_payload(msg);
                let outcome = self.post_channel(channel, payload.to_string(), None).await;
                (outcome, payload)
            }
            ChannelType::DiscordWebhook => {
                let payload = discord_payload(msg, Utc::now());
                let outcome = self.post_channel(channel, payload.to_string(), None).await;
                (outcome, payload)
            }
            ChannelType::Webhook => {
                // The signature covers the exact bytes that go on the wire,
                // so the body is serialized once and posted verbatim.
                let body = webhook_body(msg, Utc::now());
                let signature = channel
                    .config
                    .secret
                    .as_deref()
                    .map(|secret| sign_webhook_body(secret, &body));
                let payload =
                    serde_json::from_str(&body).unwrap_or_else(|_| json!({ "body": body.clone() }));
                let outcome = self.post_channel(channel, body, signature).await;
                (outcome, payload)
            }
            ChannelType::InApp => {
                let payload = json!({ "title": msg.title, "body": msg.body });
                let Some(user_id) = channel.config.user_id else {
                    // Channel without a recipient is a configured no-op.
                    return (DeliveryOutcome::delivered(1, None), payload);
                };
                let outcome = match self
                    .notifications
                    .insert_notification(user_id, &msg.event, &msg.title, &msg.body)
                    .await
                {
                    Ok(()) => DeliveryOutcome::delivered(1, None),
                    Err(e) => DeliveryOutcome::failed(1, None, e.to_string()),
                };
                (outcome, payload)
            }
            ChannelType::Email => {
                let payload = json!({ "subject": msg.title, "body": msg.body });
                let Some(user_id) = channel.config.user_id else {
                    return (DeliveryOutcome::delivered(1, None), payload);
                };
                let outcome = match self
                    .emails
                    .enqueue_email(user_id, &msg.title, &msg.body)
                    .await
                {
                    Ok(()) => DeliveryOutcome::delivered(1, None),
                    Err(e) => DeliveryOutcome::failed(1, None, e.to_string()),
                };
                (outcome, payload)
            }
            ChannelType::Other(t) => (
                DeliveryOutcome::failed(1, None, format!("unsupported channel type: {t}")),
                json!({}),
            ),
        }
    }

    async fn post_channel(
        &self,
        channel: &Channel,
        body: String,
        signature: Option<String>,
    ) -> DeliveryOutcome {
        let Some(url) = channel.config.url.as_deref() else {
            return DeliveryOutcome::failed(1, None, "channel config missing url");
        };
        self.post_with_retry(url, body, signature).await
    }

    /// POST with a fixed retry schedule. A 2xx on the first attempt records
    /// one attempt; any later success or exhaustion records the full budget.
    async fn post_with_retry(
        &self,
        url: &str,
        body: String,
        signature: Option<String>,
    ) -> DeliveryOutcome {
        let mut last_status: Option<i32> = None;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(backoff_before_ms(attempt))).await;
            }

            let mut req = self
                .http
                .post(url)
                .timeout(ATTEMPT_TIMEOUT)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
            if let Some(sig) = &signature {
                req = req.header(SIGNATURE_HEADER, sig);
            }

            match req.send().await {
                Ok(resp) => {
                    let code = i32::from(resp.status().as_u16());
                    last_status = Some(code);
                    if resp.status().is_success() {
                        let attempts = if attempt == 1 { 1 } else { MAX_ATTEMPTS as i32 };
                        return DeliveryOutcome::delivered(attempts, Some(code));
                    }
                    last_error = format!("endpoint returned status {code}");
                }
                Err(e) => {
                    last_status = None;
                    last_error = format!("request failed: {e}");
                }
            }
            warn!(url, attempt, error = %last_error, "delivery attempt failed");
        }

        DeliveryOutcome::failed(MAX_ATTEMPTS as i32, last_status, last_error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;
    use uuid::Uuid;

    use hiveplan_store::mem::MemStore;
    use hiveplan_store::{Channel, ChannelConfig, ChannelType, DeliveryStatus, Severity};

    use super::*;
    use crate::DeliveryEngine;

    struct Hit {
        count: AtomicUsize,
        status: StatusCode,
        last_body: std::sync::Mutex<Option<String>>,
        last_signature: std::sync::Mutex<Option<String>>,
    }

    async fn handler(
        State(hit): State<Arc<Hit>>,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        hit.count.fetch_add(1, Ordering::SeqCst);
        *hit.last_body.lock().unwrap() = Some(body);
        *hit.last_signature.lock().unwrap() = headers
            .get(SIGNATURE_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        hit.status
    }

    async fn spawn_server(status: StatusCode) -> (SocketAddr, Arc<Hit>) {
        let hit = Arc::new(Hit {
            count: AtomicUsize::new(0),
            status,
            last_body: std::sync::Mutex::new(None),
            last_signature: std::sync::Mutex::new(None),
        });
        let app = Router::new()
            .route("/hook", post(handler))
            .with_state(hit.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, hit)
    }

    fn engine(store: &Arc<MemStore>) -> DeliveryEngine {
        DeliveryEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            reqwest::Client::new(),
        )
    }

    fn channel(
        workspace_id: Uuid,
        channel_type: ChannelType,
        config: ChannelConfig,
        events: Vec<&str>,
        min_severity: Severity,
    ) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            workspace_id,
            channel_type,
            name: "test channel".to_string(),
            config,
            events: events.into_iter().map(String::from).collect(),
            min_severity,
            active: true,
        }
    }

    fn event(name: &str, severity: Severity) -> EventMessage {
        EventMessage {
            event: name.to_string(),
            severity,
            title: "Bot run failed".to_string(),
            body: "exit status 1".to_string(),
            metadata: json!({ "bot": "planner" }),
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt_records_one() {
        let (addr, hit) = spawn_server(StatusCode::OK).await;
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::SlackWebhook,
            ChannelConfig {
                url: Some(format!("http://{addr}/hook")),
                ..ChannelConfig::default()
            },
            vec!["bot.*"],
            Severity::Info,
        ));

        let started = std::time::Instant::now();
        let summary = engine(&store)
            .dispatch_event(ws, &event("bot.failed", Severity::Critical))
            .await;

        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(hit.count.load(Ordering::SeqCst), 1);
        // no backoff sleeps on a first-attempt success
        assert!(started.elapsed().as_millis() < 900);

        let deliveries = store.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Delivered);
        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(deliveries[0].response_status, Some(200));
        assert!(deliveries[0].error_message.is_none());
    }

    #[tokio::test]
    async fn test_persistent_500_exhausts_retry_budget() {
        let (addr, hit) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR).await;
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::Webhook,
            ChannelConfig {
                url: Some(format!("http://{addr}/hook")),
                ..ChannelConfig::default()
            },
            vec!["task.**"],
            Severity::Info,
        ));

        let summary = engine(&store)
            .dispatch_event(ws, &event("task.created", Severity::Info))
            .await;

        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(hit.count.load(Ordering::SeqCst), 3);

        let deliveries = store.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
        assert_eq!(deliveries[0].attempts, 3);
        assert_eq!(deliveries[0].response_status, Some(500));
        assert_eq!(
            deliveries[0].error_message.as_deref(),
            Some("endpoint returned status 500")
        );
    }

    #[tokio::test]
    async fn test_webhook_signature_covers_posted_bytes() {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let (addr, hit) = spawn_server(StatusCode::OK).await;
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::Webhook,
            ChannelConfig {
                url: Some(format!("http://{addr}/hook")),
                secret: Some("s3cret".to_string()),
                user_id: None,
            },
            vec!["**"],
            Severity::Info,
        ));

        engine(&store)
            .dispatch_event(ws, &event("task.created", Severity::Warning))
            .await;

        let body = hit.last_body.lock().unwrap().clone().unwrap();
        let signature = hit.last_signature.lock().unwrap().clone().unwrap();
        let hexed = signature.strip_prefix("sha256=").unwrap();

        let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cret").unwrap();
        mac.update(body.as_bytes());
        mac.verify_slice(&hex::decode(hexed).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_routing_selects_matching_channels_only() {
        // Channel A: bot.* at warning. Channel B: task.* at info.
        // A critical bot.failed event must reach only A.
        let (addr, hit) = spawn_server(StatusCode::OK).await;
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        let a = channel(
            ws,
            ChannelType::SlackWebhook,
            ChannelConfig {
                url: Some(format!("http://{addr}/hook")),
                ..ChannelConfig::default()
            },
            vec!["bot.*"],
            Severity::Warning,
        );
        let a_id = a.id;
        store.add_channel(a);
        store.add_channel(channel(
            ws,
            ChannelType::Webhook,
            ChannelConfig {
                url: Some(format!("http://{addr}/hook")),
                ..ChannelConfig::default()
            },
            vec!["task.*"],
            Severity::Info,
        ));

        let summary = engine(&store)
            .dispatch_event(ws, &event("bot.failed", Severity::Critical))
            .await;

        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(hit.count.load(Ordering::SeqCst), 1);
        let deliveries = store.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].channel_id, a_id);
    }

    #[tokio::test]
    async fn test_severity_below_minimum_is_skipped() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::SlackWebhook,
            ChannelConfig {
                url: Some("http://127.0.0.1:1/hook".to_string()),
                ..ChannelConfig::default()
            },
            vec!["**"],
            Severity::Warning,
        ));

        let summary = engine(&store)
            .dispatch_event(ws, &event("task.created", Severity::Info))
            .await;

        assert_eq!(summary, crate::DispatchSummary::default());
        assert!(store.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_in_app_channel_writes_notification() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        let user = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::InApp,
            ChannelConfig {
                url: None,
                secret: None,
                user_id: Some(user),
            },
            vec!["**"],
            Severity::Info,
        ));

        let summary = engine(&store)
            .dispatch_event(ws, &event("bot.failed", Severity::Critical))
            .await;

        assert_eq!(summary.succeeded, 1);
        let notifications = store.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, user);
        assert_eq!(notifications[0].kind, "bot.failed");
        let deliveries = store.deliveries();
        assert_eq!(deliveries[0].status, DeliveryStatus::Delivered);
        assert_eq!(deliveries[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_in_app_without_recipient_is_noop_delivered() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::InApp,
            ChannelConfig::default(),
            vec!["**"],
            Severity::Info,
        ));

        let summary = engine(&store)
            .dispatch_event(ws, &event("task.created", Severity::Info))
            .await;

        assert_eq!(summary.succeeded, 1);
        assert!(store.notifications().is_empty());
        assert_eq!(store.deliveries()[0].status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_email_channel_enqueues_message() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        let user = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::Email,
            ChannelConfig {
                url: None,
                secret: None,
                user_id: Some(user),
            },
            vec!["bot.**"],
            Severity::Warning,
        ));

        let summary = engine(&store)
            .dispatch_event(ws, &event("bot.failed", Severity::Critical))
            .await;

        assert_eq!(summary.succeeded, 1);
        let emails = store.emails();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].user_id, user);
        assert_eq!(emails[0].subject, "Bot run failed");
    }

    #[tokio::test]
    async fn test_sink_failure_is_recorded_not_raised() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::InApp,
            ChannelConfig {
                url: None,
                secret: None,
                user_id: Some(Uuid::new_v4()),
            },
            vec!["**"],
            Severity::Info,
        ));
        store.set_fail_sinks(true);

        let summary = engine(&store)
            .dispatch_event(ws, &event("task.created", Severity::Info))
            .await;

        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.failed, 1);
        let deliveries = store.deliveries();
        assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
        assert!(deliveries[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_unknown_channel_type_fails_without_http() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::Other("pager".to_string()),
            ChannelConfig::default(),
            vec!["**"],
            Severity::Info,
        ));

        let summary = engine(&store)
            .dispatch_event(ws, &event("task.created", Severity::Info))
            .await;

        assert_eq!(summary.failed, 1);
        let deliveries = store.deliveries();
        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(
            deliveries[0].error_message.as_deref(),
            Some("unsupported channel type: pager")
        );
    }

    #[tokio::test]
    async fn test_missing_url_fails_immediately() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        store.add_channel(channel(
            ws,
            ChannelType::SlackWebhook,
            ChannelConfig::default(),
            vec!["**"],
            Severity::Info,
        ));

        engine(&store)
            .dispatch_event(ws, &event("task.created", Severity::Info))
            .await;

        let deliveries = store.deliveries();
        assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(
            deliveries[0].error_message.as_deref(),
            Some("channel config missing url")
        );
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_before_ms(2), 1_000);
        assert_eq!(backoff_before_ms(3), 4_000);
    }
}
