/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Event relay — consumes workspace events from NATS and drives channel
//! delivery.
//!
//! Subscribes to `{prefix}.{env}.events.emit`; each message names a
//! workspace and an event, and the relay fans it out to that workspace's
//! configured channels with retry and per-channel audit records.

use std::process;
use std::sync::Arc;

use futures::StreamExt;
use sqlx::postgres::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use hiveplan_config::Config;
use hiveplan_delivery::{DeliveryEngine, EventMessage};
use hiveplan_store::pg::PgStore;
use hiveplan_store::{ChannelRegistry, DeliveryLog, EmailSink, NotificationSink, Severity};

const SERVICE_NAME: &str = "event-relay";

/// Wire shape of one emitted event.
#[derive(serde::Deserialize, Debug)]
struct EmitEnvelope {
    workspace_id: Uuid,
    event: String,
    /// Omitted or unrecognized severity defaults to `info`.
    #[serde(default)]
    severity: Option<String>,
    title: String,
    body: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl EmitEnvelope {
    fn into_message(self) -> (Uuid, EventMessage) {
        let severity = self
            .severity
            .as_deref()
            .map_or(Severity::Info, Severity::parse_or_info);
        (
            self.workspace_id,
            EventMessage {
                event: self.event,
                severity,
                title: self.title,
                body: self.body,
                metadata: self.metadata.unwrap_or(serde_json::Value::Null),
            },
        )
    }
}

fn main() {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main());
}

async fn async_main() {
    let config = match Config::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("fatal: failed to load config: {e}");
            process::exit(1);
        }
    };

    let _telemetry_guard = hiveplan_telemetry::init_telemetry(SERVICE_NAME, &config.telemetry)
        .unwrap_or_else(|e| {
            eprintln!("fatal: telemetry init failed: {e}");
            process::exit(1);
        });

    info!(service = SERVICE_NAME, "starting");

    if !config.relay.enabled {
        info!("event relay disabled in config — exiting");
        return;
    }

    let pg = match PgPool::connect(&config.postgres.url()).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to connect to Postgres");
            process::exit(1);
        }
    };

    let nats = match hiveplan_runtime::connect_nats(&config.nats).await {
        Ok(nc) => nc,
        Err(e) => {
            error!(error = %e, "failed to connect to NATS");
            process::exit(1);
        }
    };

    let subject =
        hiveplan_runtime::events_subject(&config.nats.subject_prefix, &config.hiveplan.env);
    let mut sub = match nats.subscribe(subject.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, subject = %subject, "failed to subscribe");
            process::exit(1);
        }
    };
    info!(subject = %subject, "subscribed for workspace events");

    let store = Arc::new(PgStore::new(pg));
    let engine = DeliveryEngine::new(
        Arc::clone(&store) as Arc<dyn ChannelRegistry>,
        Arc::clone(&store) as Arc<dyn DeliveryLog>,
        Arc::clone(&store) as Arc<dyn NotificationSink>,
        store as Arc<dyn EmailSink>,
        reqwest::Client::new(),
    );

    loop {
        tokio::select! {
            maybe_msg = sub.next() => {
                let Some(msg) = maybe_msg else {
                    warn!("NATS subscription closed — exiting");
                    break;
                };
                handle_message(&engine, &msg.payload).await;
            }
            () = hiveplan_runtime::shutdown_signal() => {
                info!("shutting down");
                break;
            }
        }
    }
}

async fn handle_message(engine: &DeliveryEngine, payload: &[u8]) {
    let envelope: EmitEnvelope = match serde_json::from_slice(payload) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "malformed event payload — dropping");
            return;
        }
    };

    let (workspace_id, msg) = envelope.into_message();
    // dispatch_event records and logs per-channel outcomes itself
    let _summary = engine.dispatch_event(workspace_id, &msg).await;
}
