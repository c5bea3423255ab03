/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! JSON-RPC dispatch: envelope validation, method routing, response wrapping.

use tracing::debug;
use uuid::Uuid;

use crate::gateway::A2aGateway;
use crate::protocol::{self, envelope, JsonRpcRequest};
use crate::request::A2aRequest;

/// Dispatch one raw JSON-RPC request body and produce exactly one response
/// envelope. All failures — parse, envelope, params, handler — come back as
/// structured error envelopes; this function never fails.
pub async fn dispatch_rpc(
    gateway: &A2aGateway,
    workspace_id: Uuid,
    body: &str,
) -> serde_json::Value {
    let rpc: JsonRpcRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            return envelope(None, Err((protocol::PARSE_ERROR, format!("parse error: {e}"))))
        }
    };

    if rpc.jsonrpc != "2.0" {
        return envelope(
            rpc.id,
            Err((protocol::INVALID_REQUEST, "jsonrpc must be 2.0".to_string())),
        );
    }

    debug!(method = %rpc.method, workspace_id = %workspace_id, "A2A dispatch");

    let request = match A2aRequest::parse(&rpc.method, &rpc.params) {
        Ok(r) => r,
        Err(e) => return envelope(rpc.id, Err(e)),
    };

    let outcome = match request {
        A2aRequest::SendMessage(p) => gateway.send_message(workspace_id, p).await,
        A2aRequest::GetTask(p) => gateway.get_task(p).await,
        A2aRequest::CancelTask(p) => gateway.cancel_task(p).await,
        A2aRequest::ListTasks(p) => gateway.list_tasks(workspace_id, p).await,
    };

    envelope(rpc.id, outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hiveplan_store::mem::MemStore;
    use hiveplan_store::{AgentRegistry, TaskStore};
    use std::sync::Arc;

    fn gateway(store: &Arc<MemStore>) -> A2aGateway {
        A2aGateway::new(
            Arc::clone(store) as Arc<dyn TaskStore>,
            Arc::clone(store) as Arc<dyn AgentRegistry>,
        )
    }

    #[tokio::test]
    async fn test_malformed_json_yields_parse_error() {
        let store = Arc::new(MemStore::new());
        let gw = gateway(&store);
        let resp = dispatch_rpc(&gw, Uuid::new_v4(), "{not json").await;
        assert_eq!(resp["error"]["code"], protocol::PARSE_ERROR);
        assert!(resp["id"].is_null());
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let store = Arc::new(MemStore::new());
        let gw = gateway(&store);
        let body = r#"{"jsonrpc":"1.0","id":3,"method":"a2a.GetTask","params":{}}"#;
        let resp = dispatch_rpc(&gw, Uuid::new_v4(), body).await;
        assert_eq!(resp["error"]["code"], protocol::INVALID_REQUEST);
        assert_eq!(resp["id"], 3);
    }

    #[tokio::test]
    async fn test_unknown_method_yields_method_not_found() {
        let store = Arc::new(MemStore::new());
        let gw = gateway(&store);
        let body = r#"{"jsonrpc":"2.0","id":"r1","method":"a2a.Reboot","params":{}}"#;
        let resp = dispatch_rpc(&gw, Uuid::new_v4(), body).await;
        assert_eq!(resp["error"]["code"], protocol::METHOD_NOT_FOUND);
        assert_eq!(resp["id"], "r1");
    }

    #[tokio::test]
    async fn test_validation_failure_has_no_side_effect() {
        let store = Arc::new(MemStore::new());
        let gw = gateway(&store);
        // acceptQuote=true but no text part: must fail before any insert.
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"a2a.SendMessage",
                       "params":{"acceptQuote":true,"message":{"parts":[]}}}"#;
        let resp = dispatch_rpc(&gw, Uuid::new_v4(), body).await;
        assert_eq!(resp["error"]["code"], protocol::INVALID_PARAMS);
        assert_eq!(store.task_count(), 0);
    }

    #[tokio::test]
    async fn test_full_round_trip_send_and_get() {
        let store = Arc::new(MemStore::new());
        let ws = Uuid::new_v4();
        let gw = gateway(&store);

        let commit = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "a2a.SendMessage",
            "params": {
                "acceptQuote": true,
                "message": { "parts": [{ "type": "text", "text": "Draft the roadmap" }] },
            },
        });
        let resp = dispatch_rpc(&gw, ws, &commit.to_string()).await;
        assert_eq!(resp["jsonrpc"], "2.0");
        assert_eq!(resp["result"]["status"]["state"], "submitted");
        let task_id = resp["result"]["id"].as_str().unwrap().to_string();

        let get = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "a2a.GetTask",
            "params": { "id": task_id },
        });
        let resp = dispatch_rpc(&gw, ws, &get.to_string()).await;
        assert_eq!(resp["result"]["id"], task_id);
        assert_eq!(resp["result"]["status"]["state"], "submitted");
    }

    #[tokio::test]
    async fn test_exactly_one_of_result_or_error() {
        let store = Arc::new(MemStore::new());
        let gw = gateway(&store);
        for body in [
            r#"{"jsonrpc":"2.0","id":1,"method":"a2a.ListTasks","params":{}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"nope","params":{}}"#,
        ] {
            let resp = dispatch_rpc(&gw, Uuid::new_v4(), body).await;
            let has_result = resp.get("result").is_some();
            let has_error = resp.get("error").is_some();
            assert!(has_result ^ has_error, "exactly one of result/error: {resp}");
        }
    }
}
