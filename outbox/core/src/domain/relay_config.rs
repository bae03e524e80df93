// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Relay Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) for the outbox
// relay process:
// - Outbox publisher tuning (topic, batch size, fixed delay, retry limit, send timeout)
// - Database connection
// - Broker selection
// - Logging and metrics settings
//
// The manifest is loaded once at startup; `OutboxSettings` is then injected by
// value into the publisher and scheduler and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "forum.outbox/v1";
pub const KIND: &str = "RelayConfig";
pub const CONFIG_PATH_ENV: &str = "FORUM_OUTBOX_CONFIG_PATH";

/// Top-level relay configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfigManifest {
    /// API version (must be "forum.outbox/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RelayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: RelayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfigSpec {
    #[serde(default)]
    pub outbox: OutboxSettings,

    /// PostgreSQL connection. When absent the relay runs against an in-memory
    /// store, which is only useful for local experiments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Publisher tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxSettings {
    /// Broker topic for every forum domain event
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Maximum records fetched per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between the end of one drain cycle and the start of the next
    #[serde(default = "default_fixed_delay", with = "humantime_serde")]
    pub fixed_delay: Duration,

    /// Failed attempts after which a record is quarantined
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Upper bound on waiting for one broker acknowledgment
    #[serde(default = "default_send_timeout", with = "humantime_serde")]
    pub send_timeout: Duration,

    /// Payload fields consulted for the broker partition key
    #[serde(default)]
    pub partition_key: PartitionKeyFields,
}

/// Field names tried in order: every identifier field, then every tenant
/// field. Each name is looked up at the top level of the payload and then
/// inside `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyFields {
    #[serde(default = "default_identifier_fields")]
    pub identifiers: Vec<String>,

    #[serde(default = "default_tenant_fields")]
    pub tenants: Vec<String>,
}

fn default_identifier_fields() -> Vec<String> {
    ["partition_key", "aggregate_id", "aggregateId", "event_id", "eventId"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_tenant_fields() -> Vec<String> {
    vec!["tenant_id".to_string(), "tenantId".to_string()]
}

impl Default for PartitionKeyFields {
    fn default() -> Self {
        Self {
            identifiers: default_identifier_fields(),
            tenants: default_tenant_fields(),
        }
    }
}

fn default_topic() -> String {
    "forum.domain-events".to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_fixed_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_retry_limit() -> u32 {
    3
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            batch_size: default_batch_size(),
            fixed_delay: default_fixed_delay(),
            retry_limit: default_retry_limit(),
            send_timeout: default_send_timeout(),
            partition_key: PartitionKeyFields::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BrokerConfig {
    /// Keeps deliveries in process memory
    #[default]
    InMemory,
    /// Confluent-compatible Kafka REST proxy (v2 JSON API)
    KafkaRest { endpoint: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus scrape endpoint, e.g. "0.0.0.0:9464"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_listen: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_listen: None,
        }
    }
}

impl Default for RelayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "forum-outbox-relay".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: RelayConfigSpec::default(),
        }
    }
}

impl RelayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Locations checked by [`discover_config`](Self::discover_config), in order.
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./forum-outbox.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".forum-outbox").join("config.yaml"));
        }
        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/forum-outbox/config.yaml"));
        #[cfg(windows)]
        paths.push(PathBuf::from("C:\\ProgramData\\ForumOutbox\\config.yaml"));
        paths
    }

    /// Discover configuration file using precedence order
    /// 1. FORUM_OUTBOX_CONFIG_PATH environment variable
    /// 2. ./forum-outbox.yaml (working directory)
    /// 3. ~/.forum-outbox/config.yaml (user home)
    /// 4. /etc/forum-outbox/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        Self::candidate_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (container deployments)
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// explicit variable source.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let outbox = &mut self.spec.outbox;

        if let Some(val) = lookup("FORUM_OUTBOX_TOPIC") {
            tracing::info!("Environment override: FORUM_OUTBOX_TOPIC={}", val);
            outbox.topic = val;
        }

        if let Some(val) = lookup("FORUM_OUTBOX_BATCH_SIZE") {
            match val.parse::<usize>() {
                Ok(n) => {
                    tracing::info!("Environment override: FORUM_OUTBOX_BATCH_SIZE={}", n);
                    outbox.batch_size = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for FORUM_OUTBOX_BATCH_SIZE: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("FORUM_OUTBOX_RETRY_LIMIT") {
            match val.parse::<u32>() {
                Ok(n) => {
                    tracing::info!("Environment override: FORUM_OUTBOX_RETRY_LIMIT={}", n);
                    outbox.retry_limit = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for FORUM_OUTBOX_RETRY_LIMIT: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("FORUM_OUTBOX_FIXED_DELAY") {
            match humantime::parse_duration(&val) {
                Ok(d) => {
                    tracing::info!("Environment override: FORUM_OUTBOX_FIXED_DELAY={:?}", d);
                    outbox.fixed_delay = d;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for FORUM_OUTBOX_FIXED_DELAY: '{}'. Expected a duration like '5s'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("FORUM_OUTBOX_SEND_TIMEOUT") {
            match humantime::parse_duration(&val) {
                Ok(d) => {
                    tracing::info!("Environment override: FORUM_OUTBOX_SEND_TIMEOUT={:?}", d);
                    outbox.send_timeout = d;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for FORUM_OUTBOX_SEND_TIMEOUT: '{}'. Expected a duration like '10s'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(url) = lookup("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL (value hidden)");
            match self.spec.database.as_mut() {
                Some(db) => db.url = url,
                None => {
                    self.spec.database = Some(DatabaseConfig {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let outbox = &self.spec.outbox;
        if outbox.topic.trim().is_empty() {
            anyhow::bail!("spec.outbox.topic cannot be empty");
        }
        if outbox.batch_size == 0 {
            anyhow::bail!("spec.outbox.batch_size must be at least 1");
        }
        if outbox.retry_limit == 0 {
            anyhow::bail!("spec.outbox.retry_limit must be at least 1");
        }
        if outbox.fixed_delay.is_zero() {
            anyhow::bail!("spec.outbox.fixed_delay must be greater than zero");
        }
        if outbox.send_timeout.is_zero() {
            anyhow::bail!("spec.outbox.send_timeout must be greater than zero");
        }
        let keys = &outbox.partition_key;
        if keys.identifiers.iter().chain(&keys.tenants).any(|f| f.trim().is_empty()) {
            anyhow::bail!("spec.outbox.partition_key field names cannot be empty");
        }

        if let Some(db) = &self.spec.database {
            if db.url.is_empty() {
                anyhow::bail!("spec.database.url cannot be empty");
            }
            if db.max_connections == 0 {
                anyhow::bail!("spec.database.max_connections must be at least 1");
            }
        }

        if let BrokerConfig::KafkaRest { endpoint } = &self.spec.broker {
            if endpoint.is_empty() {
                anyhow::bail!("spec.broker.endpoint cannot be empty for kafka-rest");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_manifest() {
        let manifest = RelayConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.outbox.batch_size, 200);
        assert_eq!(manifest.spec.outbox.retry_limit, 3);
        assert_eq!(manifest.spec.broker, BrokerConfig::InMemory);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
apiVersion: forum.outbox/v1
kind: RelayConfig
metadata:
  name: relay-eu-1
spec:
  outbox:
    topic: forum.events
    batch_size: 50
    fixed_delay: 250ms
    retry_limit: 5
    send_timeout: 2s
  database:
    url: postgres://forum@localhost/forum
  broker:
    type: kafka-rest
    endpoint: http://rest-proxy:8082
  observability:
    log_level: debug
    log_format: json
    metrics_listen: 0.0.0.0:9464
"#;
        let manifest = RelayConfigManifest::from_yaml_str(yaml).unwrap();
        let outbox = &manifest.spec.outbox;

        assert_eq!(outbox.topic, "forum.events");
        assert_eq!(outbox.batch_size, 50);
        assert_eq!(outbox.fixed_delay, Duration::from_millis(250));
        assert_eq!(outbox.send_timeout, Duration::from_secs(2));
        assert_eq!(manifest.spec.database.as_ref().unwrap().max_connections, 5);
        assert_eq!(
            manifest.spec.broker,
            BrokerConfig::KafkaRest {
                endpoint: "http://rest-proxy:8082".to_string()
            }
        );
        assert_eq!(manifest.spec.observability.log_format, LogFormat::Json);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let yaml = "apiVersion: forum.outbox/v1\nkind: RelayConfig\nmetadata:\n  name: r\nspec: {}\n";
        let manifest = RelayConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.outbox, OutboxSettings::default());
        assert!(manifest.spec.database.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut manifest = RelayConfigManifest::default();
        manifest.spec.outbox.batch_size = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = RelayConfigManifest::default();
        manifest.spec.outbox.retry_limit = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = RelayConfigManifest::default();
        manifest.spec.broker = BrokerConfig::KafkaRest { endpoint: String::new() };
        assert!(manifest.validate().is_err());

        let mut manifest = RelayConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = RelayConfigManifest::default();
        manifest.spec.outbox.partition_key.tenants.push(" ".to_string());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_partition_key_fields_are_configurable() {
        let yaml = r#"
apiVersion: forum.outbox/v1
kind: RelayConfig
metadata:
  name: r
spec:
  outbox:
    partition_key:
      identifiers: [thread_id]
"#;
        let manifest = RelayConfigManifest::from_yaml_str(yaml).unwrap();
        let keys = &manifest.spec.outbox.partition_key;
        assert_eq!(keys.identifiers, vec!["thread_id"]);
        assert_eq!(keys.tenants, vec!["tenant_id", "tenantId"]);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_overrides_apply_valid_values_and_skip_invalid_ones() {
        let vars = HashMap::from([
            ("FORUM_OUTBOX_BATCH_SIZE", "25"),
            ("FORUM_OUTBOX_RETRY_LIMIT", "many"),
            ("FORUM_OUTBOX_FIXED_DELAY", "1m"),
            ("DATABASE_URL", "postgres://override"),
        ]);
        let mut manifest = RelayConfigManifest::default();
        manifest.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(manifest.spec.outbox.batch_size, 25);
        assert_eq!(manifest.spec.outbox.retry_limit, 3);
        assert_eq!(manifest.spec.outbox.fixed_delay, Duration::from_secs(60));
        assert_eq!(
            manifest.spec.database.as_ref().map(|d| d.url.as_str()),
            Some("postgres://override")
        );
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.yaml");

        let mut manifest = RelayConfigManifest::default();
        manifest.spec.outbox.fixed_delay = Duration::from_millis(1500);
        manifest.to_yaml_file(&path).unwrap();

        let loaded = RelayConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.outbox.fixed_delay, Duration::from_millis(1500));
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RelayConfigManifest::load_or_default(Some(dir.path().join("nope.yaml"))).is_err());
    }
}
