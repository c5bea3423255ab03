/*
 * Hiveplan - AI-assisted project planning with delegated bots
 * Copyright (C) 2025–2026 Hiveplan contributors <dev@hiveplan.app>
 *
 * This program is free software: you can redistribute it
 * and/or modify it under the terms of the GNU Affero
 * General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your
 * option) any later version.
 *
 * This program is distributed in the hope that it will be
 * useful, but WITHOUT ANY WARRANTY; without even the
 * implied warranty of MERCHANTABILITY or FITNESS FOR A
 * PARTICULAR PURPOSE. See the GNU Affero General Public
 * License for more details.
 *
 * You should have received a copy of the GNU Affero General
 * Public License along with this program. If not, see
 * <https://www.gnu.org/licenses/>.
 */

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub hiveplan: HiveplanConfig,
    pub profile: ProfileConfig,
    pub postgres: PostgresConfig,
    pub nats: NatsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct HiveplanConfig {
    pub env: String,
    pub version: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub tls_interservice: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_pg_min")]
    pub min_connections: u32,
    #[serde(default = "default_pg_max")]
    pub max_connections: u32,
}

fn default_pg_min() -> u32 {
    2
}
fn default_pg_max() -> u32 {
    10
}

impl PostgresConfig {
    /// Connection URL for `sqlx::PgPool`.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database,
        )
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct NatsConfig {
    pub url: String,
    pub subject_prefix: String,
    #[serde(default)]
    pub cluster_urls: Vec<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: default_otlp_endpoint(),
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

/// A2A gateway service settings.
#[derive(Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Name of the environment variable holding the bearer API key.
    #[serde(default = "default_gateway_api_key_name")]
    pub api_key_name: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Workspace used for the public AgentCard when no workspace is implied
    /// by the request path.
    #[serde(default)]
    pub default_workspace: Option<uuid::Uuid>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            port: default_gateway_port(),
            api_key_name: default_gateway_api_key_name(),
            cors_origins: Vec::new(),
            default_workspace: None,
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_port() -> u16 {
    4410
}

fn default_gateway_api_key_name() -> String {
    "HIVEPLAN_A2A_API_KEY".to_string()
}

/// Event relay service settings.
#[derive(Deserialize, Clone, Debug)]
pub struct RelayConfig {
    #[serde(default = "default_relay_enabled")]
    pub enabled: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: default_relay_enabled(),
        }
    }
}

fn default_relay_enabled() -> bool {
    true
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

impl Config {
    /// Load configuration from the file named by the `HIVEPLAN_CONFIG` env
    /// var (default `config.toml`), with `HIVEPLAN_*` env overrides.
    ///
    /// # Errors
    ///
    /// Returns `config::ConfigError` if the file is missing, malformed, or
    /// required fields are absent.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("HIVEPLAN_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&config_path))
            .add_source(
                config::Environment::with_prefix("HIVEPLAN")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
