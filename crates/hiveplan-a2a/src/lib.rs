/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! A2A (Agent-to-Agent) task negotiation gateway.
//!
//! Implements the JSON-RPC 2.0 protocol that lets an external autonomous
//! agent submit work, receive a price/duration quote, accept it, and manage
//! the resulting task's lifecycle:
//!
//! - `a2a.SendMessage` — two-phase quote/commit handshake
//! - `a2a.GetTask`     — query a task mapped to protocol state
//! - `a2a.CancelTask`  — cancel a non-completed task
//! - `a2a.ListTasks`   — tasks for a session plus all protocol-originated ones
//!
//! Protocol failures become JSON-RPC error envelopes; nothing panics across
//! the gateway boundary.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod dispatch;
pub mod gateway;
pub mod protocol;
pub mod quote;
pub mod request;
pub mod status;

pub use dispatch::dispatch_rpc;
pub use gateway::A2aGateway;
