/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! Glob routing of event names against channel subscriptions.
//!
//! Patterns work over dot-separated segments: `*` matches exactly one
//! segment, and a pattern of `*` or `**` matches any event unconditionally.

use regex::Regex;

use hiveplan_store::Channel;

// Stand-in for `**` while single-segment stars are substituted.
const GLOBSTAR_PLACEHOLDER: char = '\u{0}';

/// Does `event` match the glob `pattern`?
#[must_use]
pub fn match_event_glob(event: &str, pattern: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }
    match compile(pattern) {
        Ok(re) => re.is_match(event),
        // A pattern that fails to compile matches nothing.
        Err(_) => false,
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = pattern.replace('.', r"\.");
    let held = escaped.replace("**", &GLOBSTAR_PLACEHOLDER.to_string());
    let single = held.replace('*', "[^.]+");
    let full = single.replace(GLOBSTAR_PLACEHOLDER, ".*");
    Regex::new(&format!("^{full}$"))
}

/// A channel matches when any of its subscribed patterns match (logical OR).
#[must_use]
pub fn channel_matches(channel: &Channel, event: &str) -> bool {
    channel.events.iter().any(|p| match_event_glob(event, p))
}
