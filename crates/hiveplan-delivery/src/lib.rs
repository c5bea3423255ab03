/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Reliable event delivery engine.
//!
//! Fans one workspace event out to every configured channel that passes
//! glob routing and the severity gate, renders the channel-specific payload,
//! delivers with bounded retry/backoff, and writes one append-only audit
//! record per channel. Delivery failures never propagate to the producer.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use hiveplan_store::{
    ChannelRegistry, DeliveryLog, DeliveryStatus, EmailSink, NewChannelDelivery, NotificationSink,
    Severity,
};

pub mod executor;
pub mod format;
pub mod matcher;

use chrono::Utc;
use matcher::channel_matches;

/// One workspace event as produced internally.
#[derive(Debug, Clone)]
pub struct EventMessage {
    /// Dot-separated event name, e.g. `task.created`.
    pub event: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
}

/// Result of one dispatch-to-workspace call, counted only over channels
/// that passed both the event matcher and the severity filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub dispatched: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Stateless delivery engine over the channel registry, audit log, and
/// notification/email sinks.
pub struct DeliveryEngine {
    channels: Arc<dyn ChannelRegistry>,
    log: Arc<dyn DeliveryLog>,
    notifications: Arc<dyn NotificationSink>,
    emails: Arc<dyn EmailSink>,
    http: reqwest::Client,
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(
        channels: Arc<dyn ChannelRegistry>,
        log: Arc<dyn DeliveryLog>,
        notifications: Arc<dyn NotificationSink>,
        emails: Arc<dyn EmailSink>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            channels,
            log,
            notifications,
            emails,
            http,
        }
    }

    /// Dispatch one event to every matching channel of a workspace.
    ///
    /// Channels are processed sequentially in registry order, so delivery
    /// order is deterministic and total wall-clock time includes backoff
    /// sleeps. Failures are recorded and swallowed.
    pub async fn dispatch_event(
        &self,
        workspace_id: Uuid,
        msg: &EventMessage,
    ) -> DispatchSummary {
        let channels = match self.channels.list_active_channels(workspace_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, workspace_id = %workspace_id, "channel registry read failed");
                return DispatchSummary::default();
            }
        };

        let mut summary = DispatchSummary::default();
        for channel in channels {
            if msg.severity < channel.min_severity || !channel_matches(&channel, &msg.event) {
                continue;
            }
            summary.dispatched += 1;

            let (outcome, payload) = self.deliver(&channel, msg).await;
            match outcome.status {
                DeliveryStatus::Delivered => summary.succeeded += 1,
                DeliveryStatus::Failed => summary.failed += 1,
            }

            let record = NewChannelDelivery {
                channel_id: channel.id,
                event: msg.event.clone(),
                payload,
                status: outcome.status,
                attempts: outcome.attempts,
                last_attempt_at: Utc::now(),
                response_status: outcome.response_status,
                error_message: outcome.error_message,
            };
            if let Err(e) = self.log.record(record).await {
                warn!(
                    error = %e,
                    channel_id = %channel.id,
                    "failed to write delivery audit record"
                );
            }
        }

        info!(
            workspace_id = %workspace_id,
            event = %msg.event,
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "event dispatched"
        );
        summary
    }
}
