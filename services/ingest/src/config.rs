//! Ingest configuration loading (§6): TOML file plus environment variable
//! overrides for secrets. Follows the forwarder's raw-then-validated-struct
//! pattern (`forwarder/src/config.rs`): a `Raw*` tree with every field
//! `Option`, validated and defaulted into the public config types.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use pnw_protocol::EntityKind;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pnw-ingest/config.toml";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub upstream: UpstreamConfig,
    pub database: DatabaseConfig,
    pub subscriptions: SubscriptionsConfig,
    pub reconciler: ReconcilerConfig,
    pub rest: RestConfig,
    pub logging: LoggingConfig,
    pub status_http: StatusHttpConfig,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub bot_key: Option<String>,
    pub graphql_base_url: String,
    pub subscriptions_base_url: String,
    pub websocket_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Mapping of kind -> allowed event kinds. Default: all events for the five
/// live-subscribable kinds, account limited to `update` (§4.5).
#[derive(Debug, Clone)]
pub struct SubscriptionsConfig {
    pub models: HashMap<EntityKind, Vec<pnw_protocol::EventKind>>,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        use pnw_protocol::EventKind::{Create, Delete, Update};
        let mut models = HashMap::new();
        models.insert(EntityKind::Nation, vec![Create, Update, Delete]);
        models.insert(EntityKind::Alliance, vec![Create, Update, Delete]);
        models.insert(EntityKind::AlliancePosition, vec![Create, Update, Delete]);
        models.insert(EntityKind::City, vec![Create, Update, Delete]);
        models.insert(EntityKind::Account, vec![Update]);
        Self { models }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub cities_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { cities_delay: Duration::from_secs(60) }
    }
}

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub rate_limit_quota: u64,
    pub rate_limit_window: Duration,
    pub page_size: u32,
    pub batch_size: u32,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            rate_limit_quota: 60,
            rate_limit_window: Duration::from_secs(60),
            page_size: 500,
            batch_size: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned() }
    }
}

#[derive(Debug, Clone)]
pub struct StatusHttpConfig {
    pub bind: String,
}

impl Default for StatusHttpConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8090".to_owned() }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    upstream: Option<RawUpstream>,
    database: Option<RawDatabase>,
    reconciler: Option<RawReconciler>,
    rest: Option<RawRest>,
    logging: Option<RawLogging>,
    status_http: Option<RawStatusHttp>,
}

#[derive(Debug, Deserialize)]
struct RawUpstream {
    api_key: Option<String>,
    bot_key: Option<String>,
    graphql_base_url: Option<String>,
    subscriptions_base_url: Option<String>,
    websocket_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReconciler {
    cities_delay_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRest {
    rate_limit_quota: Option<u64>,
    rate_limit_window_seconds: Option<u64>,
    page_size: Option<u32>,
    batch_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawLogging {
    level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStatusHttp {
    bind: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Loads config from `PNW_INGEST_CONFIG` (default `/etc/pnw-ingest/config.toml`).
/// `upstream.api_key` and `database.password` may be overridden by
/// `PNW_INGEST__UPSTREAM__API_KEY` / `PNW_INGEST__DATABASE__PASSWORD`.
pub fn load_config() -> Result<IngestConfig, ConfigError> {
    let path = std::env::var("PNW_INGEST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    load_config_from_path(Path::new(&path))
}

pub fn load_config_from_path(path: &Path) -> Result<IngestConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<IngestConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let raw_upstream = raw.upstream.ok_or_else(|| ConfigError::MissingField("upstream".to_owned()))?;
    let api_key = env_override("PNW_INGEST__UPSTREAM__API_KEY")
        .or(raw_upstream.api_key)
        .ok_or_else(|| ConfigError::MissingField("upstream.api_key".to_owned()))?;
    let bot_key = env_override("PNW_INGEST__UPSTREAM__BOT_KEY").or(raw_upstream.bot_key);

    let upstream = UpstreamConfig {
        api_key,
        bot_key,
        graphql_base_url: raw_upstream
            .graphql_base_url
            .unwrap_or_else(|| "https://api.politicsandwar.com/graphql".to_owned()),
        subscriptions_base_url: raw_upstream
            .subscriptions_base_url
            .unwrap_or_else(|| "https://api.politicsandwar.com/subscriptions/v1".to_owned()),
        websocket_url: raw_upstream
            .websocket_url
            .unwrap_or_else(|| "wss://socket.politicsandwar.com".to_owned()),
    };

    let raw_db = raw.database.ok_or_else(|| ConfigError::MissingField("database".to_owned()))?;
    let database = DatabaseConfig {
        host: raw_db.host.ok_or_else(|| ConfigError::MissingField("database.host".to_owned()))?,
        port: raw_db.port.unwrap_or(5432),
        database: raw_db
            .database
            .ok_or_else(|| ConfigError::MissingField("database.database".to_owned()))?,
        user: raw_db.user.ok_or_else(|| ConfigError::MissingField("database.user".to_owned()))?,
        password: env_override("PNW_INGEST__DATABASE__PASSWORD")
            .or(raw_db.password)
            .ok_or_else(|| ConfigError::MissingField("database.password".to_owned()))?,
    };

    let reconciler = match raw.reconciler {
        Some(r) => ReconcilerConfig {
            cities_delay: Duration::from_secs(r.cities_delay_seconds.unwrap_or(60)),
        },
        None => ReconcilerConfig::default(),
    };

    let rest = match raw.rest {
        Some(r) => RestConfig {
            rate_limit_quota: r.rate_limit_quota.unwrap_or(60),
            rate_limit_window: Duration::from_secs(r.rate_limit_window_seconds.unwrap_or(60)),
            page_size: r.page_size.unwrap_or(500).min(500),
            batch_size: r.batch_size.unwrap_or(5).min(10),
        },
        None => RestConfig::default(),
    };

    let logging = match raw.logging {
        Some(l) => LoggingConfig { level: l.level.unwrap_or_else(|| "info".to_owned()) },
        None => LoggingConfig::default(),
    };

    let status_http = match raw.status_http {
        Some(s) => StatusHttpConfig { bind: s.bind.unwrap_or_else(|| "127.0.0.1:8090".to_owned()) },
        None => StatusHttpConfig::default(),
    };

    Ok(IngestConfig {
        upstream,
        database,
        subscriptions: SubscriptionsConfig::default(),
        reconciler,
        rest,
        logging,
        status_http,
    })
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_upstream_section_is_an_error() {
        let err = load_config_from_str("[database]\nhost=\"db\"\ndatabase=\"pnw\"\nuser=\"pnw\"\npassword=\"x\"\n");
        assert!(matches!(err, Err(ConfigError::MissingField(f)) if f == "upstream"));
    }

    #[test]
    fn defaults_apply_when_sections_are_absent() {
        let toml = r#"
            [upstream]
            api_key = "key"
            [database]
            host = "db"
            database = "pnw"
            user = "pnw"
            password = "secret"
        "#;
        let cfg = load_config_from_str(toml).unwrap();
        assert_eq!(cfg.reconciler.cities_delay, Duration::from_secs(60));
        assert_eq!(cfg.rest.rate_limit_quota, 60);
        assert_eq!(cfg.database.port, 5432);
    }

    #[test]
    fn env_override_wins_over_toml_value() {
        let toml = r#"
            [upstream]
            api_key = "from-toml"
            [database]
            host = "db"
            database = "pnw"
            user = "pnw"
            password = "from-toml-pw"
        "#;
        // SAFETY: test-local env var, not read elsewhere concurrently in this process.
        unsafe { std::env::set_var("PNW_INGEST__UPSTREAM__API_KEY", "from-env") };
        let cfg = load_config_from_str(toml).unwrap();
        unsafe { std::env::remove_var("PNW_INGEST__UPSTREAM__API_KEY") };
        assert_eq!(cfg.upstream.api_key, "from-env");
    }
}
