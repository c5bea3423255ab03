/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Channel-type-specific payload rendering.
//!
//! Every function here is a pure function of the event message (plus the
//! channel secret for signed webhooks); no I/O.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use hiveplan_store::Severity;

use crate::EventMessage;

/// Discord embed colors keyed by severity.
fn discord_color(severity: Severity) -> u32 {
    match severity {
        Severity::Info => 0x3498db,     // blue
        Severity::Warning => 0xe67e22,  // orange
        Severity::Critical => 0xe74c3c, // red
    }
}

/// Slack Block Kit message: header, section, context.
#[must_use]
pub fn slack_payload(msg: &EventMessage) -> serde_json::Value {
    serde_json::json!({
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": msg.title },
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": msg.body },
            },
            {
                "type": "context",
                "elements": [{
                    "type": "mrkdwn",
                    "text": format!("{} | {}", msg.event, msg.severity.as_str()),
                }],
            },
        ],
    })
}

/// Discord message with a single embed.
#[must_use]
pub fn discord_payload(msg: &EventMessage, now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "embeds": [{
            "title": msg.title,
            "description": msg.body,
            "color": discord_color(msg.severity),
            "footer": {
                "text": format!("{} | {}", msg.event, now.to_rfc3339()),
            },
        }],
    })
}

/// Generic webhook body. Serialized once; the same bytes are signed and
/// transmitted.
#[must_use]
pub fn webhook_body(msg: &EventMessage, now: DateTime<Utc>) -> String {
    serde_json::json!({
        "event": msg.event,
        "severity": msg.severity.as_str(),
        "title": msg.title,
        "body": msg.body,
        "metadata": msg.metadata,
        "timestamp": now.to_rfc3339(),
    })
    .to_string()
}

/// HMAC-SHA256 signature header value over the exact body bytes:
/// `sha256=<hex>`.
#[must_use]
pub fn sign_webhook_body(secret: &str, body: &str) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        // HMAC accepts keys of any length; unreachable in practice.
        Err(_) => return "sha256=".to_string(),
    };
    mac.update(body.as_bytes());
    let digest = mac.finalize().into_bytes();
    format!("sha256={}", hex::encode(digest))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn msg(severity: Severity) -> EventMessage {
        EventMessage {
            event: "bot.failed".to_string(),
            severity,
            title: "Bot run failed".to_string(),
            body: "The research bot hit a rate limit.".to_string(),
            metadata: serde_json::json!({ "bot_id": "b-1" }),
        }
    }

    #[test]
    fn test_slack_blocks_shape() {
        let v = slack_payload(&msg(Severity::Warning));
        let blocks = v["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[0]["text"]["text"], "Bot run failed");
        assert_eq!(blocks[1]["type"], "section");
        assert_eq!(blocks[1]["text"]["type"], "mrkdwn");
        let context = blocks[2]["elements"][0]["text"].as_str().unwrap();
        assert!(context.contains("bot.failed"));
        assert!(context.contains("warning"));
    }

    #[test]
    fn test_discord_embed_colors() {
        let now = Utc::now();
        assert_eq!(discord_payload(&msg(Severity::Info), now)["embeds"][0]["color"], 0x3498db);
        assert_eq!(
            discord_payload(&msg(Severity::Warning), now)["embeds"][0]["color"],
            0xe67e22
        );
        assert_eq!(
            discord_payload(&msg(Severity::Critical), now)["embeds"][0]["color"],
            0xe74c3c
        );
    }

    #[test]
    fn test_discord_footer_has_event_and_timestamp() {
        let now = Utc::now();
        let v = discord_payload(&msg(Severity::Info), now);
        let footer = v["embeds"][0]["footer"]["text"].as_str().unwrap();
        assert!(footer.contains("bot.failed"));
        assert!(footer.contains(&now.to_rfc3339()));
    }

    #[test]
    fn test_webhook_body_fields() {
        let now = Utc::now();
        let body = webhook_body(&msg(Severity::Critical), now);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["event"], "bot.failed");
        assert_eq!(v["severity"], "critical");
        assert_eq!(v["title"], "Bot run failed");
        assert_eq!(v["metadata"]["bot_id"], "b-1");
        assert_eq!(v["timestamp"], now.to_rfc3339());
    }

    #[test]
    fn test_signature_verifies_over_exact_bytes() {
        let body = webhook_body(&msg(Severity::Info), Utc::now());
        let header = sign_webhook_body("channel-secret", &body);
        let hex_sig = header.strip_prefix("sha256=").unwrap();

        let mut mac = Hmac::<Sha256>::new_from_slice(b"channel-secret").unwrap();
        mac.update(body.as_bytes());
        mac.verify_slice(&hex::decode(hex_sig).unwrap()).unwrap();
    }

    #[test]
    fn test_signature_depends_on_secret_and_body() {
        let body = webhook_body(&msg(Severity::Info), Utc::now());
        let a = sign_webhook_body("secret-a", &body);
        let b = sign_webhook_body("secret-b", &body);
        assert_ne!(a, b);

        let c = sign_webhook_body("secret-a", &format!("{body} "));
        assert_ne!(a, c);
    }
}
