/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Ephemeral price/duration quotes.
//!
//! A quote is recomputed fresh on every quote-phase call and carries no
//! persisted identity. Nothing binds a quote to its later acceptance;
//! re-quoting may return a different price if skills changed in between.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use hiveplan_store::{AgentRegistry, StoreError};

/// How long a quote is presented as valid.
const QUOTE_TTL_MINUTES: i64 = 15;

/// Fixed duration estimate until per-skill estimates exist.
const ESTIMATED_DURATION_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub price_cents: i64,
    pub currency: &'static str,
    pub estimated_duration_ms: u64,
    pub expires_at: DateTime<Utc>,
}

impl Quote {
    /// Human-readable summary for the text part of the status message.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Quoted {}.{:02} USD, estimated duration {}s. Resend with acceptQuote=true to start.",
            self.price_cents / 100,
            self.price_cents % 100,
            self.estimated_duration_ms / 1000,
        )
    }
}

/// Compute a quote for a workspace from the first matching agent skill.
///
/// Agents are scanned in registry iteration order; the first agent with any
/// skill supplies the price. A workspace with no skilled agents quotes 0.
///
/// # Errors
///
/// Returns `StoreError` if the registry read fails.
pub async fn build_quote(
    agents: &dyn AgentRegistry,
    workspace_id: Uuid,
) -> Result<Quote, StoreError> {
    let mut price_cents = 0;
    for agent in agents.list_active_agents(workspace_id).await? {
        let skills = agents.list_skills(agent.id).await?;
        if let Some(skill) = skills.first() {
            price_cents = skill.price_cents;
            break;
        }
    }

    Ok(Quote {
        price_cents,
        currency: "USD",
        estimated_duration_ms: ESTIMATED_DURATION_MS,
        expires_at: Utc::now() + Duration::minutes(QUOTE_TTL_MINUTES),
    })
}
