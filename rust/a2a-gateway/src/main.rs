/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 * SPDX-License-Identifier: AGPL-3.0-or-later
 */

//! A2A (Agent-to-Agent) Gateway — JSON-RPC task negotiation endpoint.
//!
//! Exposes:
//! - `POST /a2a/{workspace_id}`      — JSON-RPC 2.0 (SendMessage / GetTask /
//!   CancelTask / ListTasks)
//! - `GET  /.well-known/agent.json`  — dynamic AgentCard from the agent registry
//! - `GET  /health`                  — health check

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use sqlx::postgres::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use hiveplan_a2a::{dispatch_rpc, A2aGateway};
use hiveplan_config::Config;
use hiveplan_store::pg::PgStore;
use hiveplan_store::{AgentRegistry, TaskStore};

const SERVICE_NAME: &str = "a2a-gateway";

struct AppState {
    gateway: A2aGateway,
    agents: Arc<dyn AgentRegistry>,
    pg: PgPool,
    api_key: Option<String>,
    config: Arc<Config>,
}

fn load_dotenv() {
    match std::fs::read_to_string(".env") {
        Ok(contents) => {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, val)) = line.split_once('=') {
                    std::env::set_var(key.trim(), val.trim());
                    eprintln!(".env: loaded {}", key.trim());
                }
            }
        }
        Err(e) => {
            eprintln!(".env: not loaded ({e})");
        }
    }
}

fn main() {
    // Load .env in single-threaded context before spawning the tokio runtime
    load_dotenv();

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

    if !config.gateway.enabled {
        info!("A2A gateway disabled in config — exiting");
        return;
    }

    let pg = match PgPool::connect(&config.postgres.url()).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to connect to Postgres");
            process::exit(1);
        }
    };

    // API key comes from the environment variable named in config
    let api_key = std::env::var(&config.gateway.api_key_name).ok();
    if api_key.is_none() {
        warn!(
            key_name = %config.gateway.api_key_name,
            "A2A API key not set — auth disabled"
        );
    }

    let store = Arc::new(PgStore::new(pg.clone()));
    let state = Arc::new(AppState {
        gateway: A2aGateway::new(
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::clone(&store) as Arc<dyn AgentRegistry>,
        ),
        agents: store,
        pg,
        api_key,
        config: Arc::clone(&config),
    });

    let cors = if config.gateway.cors_origins.is_empty() {
        if config.hiveplan.env != "dev" && config.hiveplan.env != "local" {
            error!("gateway.cors_origins is empty in non-dev environment — refusing to start");
            process::exit(1);
        }
        warn!("gateway.cors_origins is empty — allowing all origins (dev/local mode)");
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let parsed: Vec<header::HeaderValue> = config
            .gateway
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let app = Router::new()
        .route("/.well-known/agent.json", get(agent_card_handler))
        .route("/a2a/{workspace_id}", post(rpc_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(1_048_576)) // 1 MiB
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .with_state(state);

    let port = config.gateway.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    if config.profile.tls_interservice {
        let tls = &config.tls;
        let cert_path = tls.cert_path.as_deref().unwrap_or("certs/server.crt");
        let key_path = tls.key_path.as_deref().unwrap_or("certs/server.key");

        info!(addr = %addr, cert = cert_path, "A2A Gateway listening with TLS");

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to load TLS certs");
                process::exit(1);
            });

        if let Err(e) = axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
        {
            error!(error = %e, "TLS server error");
        }
    } else {
        if config.hiveplan.env != "dev" && config.hiveplan.env != "local" {
            warn!("TLS is disabled in non-dev environment — traffic is unencrypted");
        }
        info!(addr = %addr, "A2A Gateway listening (plaintext)");

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to bind");
                process::exit(1);
            }
        };

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "server error");
        }
    }
}

// ---------------------------------------------------------------------------
// Auth helpers
// ---------------------------------------------------------------------------

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Result<(), StatusCode> {
    let Some(expected) = api_key else {
        return Ok(()); // auth disabled
    };

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(t) if constant_time_eq(t.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

// ---------------------------------------------------------------------------
// Security headers middleware (OWASP A05)
// ---------------------------------------------------------------------------

async fn security_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(
        "X-Content-Type-Options",
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Cache-Control",
        header::HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert("Pragma", header::HeaderValue::from_static("no-cache"));
    headers.insert(
        "Permissions-Policy",
        header::HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert(
        "Strict-Transport-Security",
        header::HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    resp
}

// ---------------------------------------------------------------------------
// POST /a2a/{workspace_id} — JSON-RPC endpoint
// ---------------------------------------------------------------------------

async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(status) = check_auth(&headers, &state.api_key) {
        return status.into_response();
    }

    let envelope = dispatch_rpc(&state.gateway, workspace_id, &body).await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(&envelope).unwrap_or_default(),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /.well-known/agent.json — AgentCard
// ---------------------------------------------------------------------------

/// Skill list for the AgentCard, flattened across the workspace's active
/// agents. Registry failures degrade to an empty list.
async fn agent_card_skills(
    agents: &dyn AgentRegistry,
    workspace_id: Uuid,
) -> Vec<serde_json::Value> {
    let active = match agents.list_active_agents(workspace_id).await {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "failed to list agents for AgentCard");
            return vec![];
        }
    };

    let mut skills = Vec::new();
    for agent in active {
        match agents.list_skills(agent.id).await {
            Ok(agent_skills) => {
                for skill in agent_skills {
                    skills.push(serde_json::json!({
                        "id": format!("{}/{}", agent.name, skill.name),
                        "name": skill.name,
                        "description": format!("{} skill offered by {}", skill.name, agent.name),
                    }));
                }
            }
            Err(e) => {
                warn!(error = %e, agent_id = %agent.id, "failed to list skills for AgentCard");
            }
        }
    }
    skills
}

async fn agent_card_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let skills = match state.config.gateway.default_workspace {
        Some(ws) => agent_card_skills(state.agents.as_ref(), ws).await,
        None => vec![],
    };

    let env = &state.config.hiveplan.env;
    let version = &state.config.hiveplan.version;

    axum::Json(serde_json::json!({
        "name": "Hiveplan",
        "description": format!("Hiveplan project-planning workspace ({env})"),
        "url": format!("http://localhost:{}", state.config.gateway.port),
        "version": version,
        "capabilities": {
            "streaming": false,
            "pushNotifications": false,
            "stateTransitionHistory": false,
        },
        "skills": skills,
        "defaultInputModes": ["text/plain"],
        "defaultOutputModes": ["text/plain"],
    }))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1").execute(&state.pg).await.is_ok();

    let status = if db_ok { "ok" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        axum::Json(serde_json::json!({
            "status": status,
            "service": SERVICE_NAME,
            "db": db_ok,
        })),
    )
}
