use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Profiled key lookup: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
///
/// Empty values count as unset.
struct Source<'a> {
    profile: &'a str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Source<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = (self.lookup)(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Like [`or`](Self::or) but an explicitly empty value is kept (used for key suffixes).
    fn raw_or(&self, key: &str, default: &str) -> String {
        if !self.profile.is_empty() {
            if let Some(v) = (self.lookup)(&format!("{}_{}", self.profile, key)) {
                return v;
            }
        }
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.opt(key) {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: v }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.opt(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value: v }),
            },
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Tenant whose entities this process evaluates.
    pub tenant_id: String,
    pub postgres: PostgresConfig,
    pub cache: CacheConfig,
    pub keys: KeyConfig,
    pub engine: EngineConfig,
    pub rules: RuleThresholds,
    pub log: LogConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    ///
    /// Profile is read from `CAREWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (tests, embedded hosts).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = lookup("CAREWATCH_PROFILE")
            .unwrap_or_default()
            .trim()
            .to_uppercase();
        let src = Source {
            profile: &profile,
            lookup: &lookup,
        };

        let tenant_id = src.opt("TENANT_ID").ok_or(ConfigError::Missing("TENANT_ID"))?;

        Ok(Self {
            profile: profile.clone(),
            tenant_id,
            postgres: PostgresConfig::from_source(&src)?,
            cache: CacheConfig::from_source(&src)?,
            keys: KeyConfig::from_source(&src),
            engine: EngineConfig::from_source(&src)?,
            rules: RuleThresholds::from_source(&src)?,
            log: LogConfig::from_source(&src),
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  tenant:      {}", self.tenant_id);
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!("  cache:       addr={}, db={}", self.cache.address, self.cache.db);
        tracing::info!(
            "  engine:      interval={}s, batch={}, mirror_ttl={}s, dedup={}m",
            self.engine.poll_interval_secs,
            self.engine.batch_size,
            self.engine.alarm_cache_ttl_secs,
            self.engine.dedup_window_minutes,
        );
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: src.or("PG_HOST", "localhost"),
            port: src.parse("PG_PORT", 5432)?,
            database: src.or("PG_DATABASE", "carewatch"),
            username: src.opt("PG_USERNAME"),
            password: src.opt("PG_PASSWORD"),
            ssl_mode: src.or("PG_SSL_MODE", "prefer"),
            max_connections: src.parse("PG_MAX_CONNECTIONS", 10)?,
        })
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

// ── Cache (Redis) ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// `host:port` of the cache server.
    pub address: String,
    pub password: Option<String>,
    pub db: u32,
}

impl CacheConfig {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            address: src.or("REDIS_ADDR", "127.0.0.1:6379"),
            password: src.opt("REDIS_PASSWORD"),
            db: src.parse("REDIS_DB", 0)?,
        })
    }

    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pass) => format!("redis://:{}@{}/{}", pass, self.address, self.db),
            None => format!("redis://{}/{}", self.address, self.db),
        }
    }
}

// ── Cache key layout ──────────────────────────────────────────

/// Prefixes and suffixes of the shared cache keys.
///
/// These must stay stable: the fusion process writes readings under the
/// realtime keys and UI consumers read the alarm mirror keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfig {
    pub realtime_prefix: String,
    pub realtime_suffix: String,
    pub alarm_prefix: String,
    pub alarm_suffix: String,
    pub state_prefix: String,
}

impl KeyConfig {
    fn from_source(src: &Source<'_>) -> Self {
        Self {
            realtime_prefix: src.raw_or("REALTIME_KEY_PREFIX", "realtime:"),
            realtime_suffix: src.raw_or("REALTIME_KEY_SUFFIX", ":fused"),
            alarm_prefix: src.raw_or("ALARM_KEY_PREFIX", "alarm:active:"),
            alarm_suffix: src.raw_or("ALARM_KEY_SUFFIX", ""),
            state_prefix: src.raw_or("STATE_KEY_PREFIX", "alarm:state:"),
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            realtime_prefix: "realtime:".to_string(),
            realtime_suffix: ":fused".to_string(),
            alarm_prefix: "alarm:active:".to_string(),
            alarm_suffix: String::new(),
            state_prefix: "alarm:state:".to_string(),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    pub batch_size: usize,
    pub alarm_cache_ttl_secs: u64,
    pub dedup_window_minutes: i64,
    /// Enumerate entities from cache keys when the catalog listing fails.
    pub catalog_fallback_scan: bool,
}

impl EngineConfig {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        let cfg = Self {
            poll_interval_secs: src.parse("POLL_INTERVAL_SECS", 5)?,
            batch_size: src.parse("EVAL_BATCH_SIZE", 10)?,
            alarm_cache_ttl_secs: src.parse("ALARM_CACHE_TTL_SECS", 30)?,
            dedup_window_minutes: src.parse("DEDUP_WINDOW_MINUTES", 10)?,
            catalog_fallback_scan: src.flag("CATALOG_FALLBACK_SCAN", false)?,
        };
        if cfg.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid { key: "POLL_INTERVAL_SECS", value: "0".into() });
        }
        if cfg.batch_size == 0 {
            return Err(ConfigError::Invalid { key: "EVAL_BATCH_SIZE", value: "0".into() });
        }
        Ok(cfg)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn alarm_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.alarm_cache_ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            batch_size: 10,
            alarm_cache_ttl_secs: 30,
            dedup_window_minutes: 10,
            catalog_fallback_scan: false,
        }
    }
}

// ── Rule thresholds ───────────────────────────────────────────

/// Dwell durations and spatial tolerances for every detection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// How long a bed must stay empty, with no vitals and no motion, before alarming.
    pub bed_exit_dwell_secs: u64,
    /// Displacement from the bed-exit baseline that counts as normal movement (metres).
    pub bed_exit_motion_tolerance_m: f64,
    /// How long vitals must go uncorroborated by the presence sensor.
    pub sensor_conflict_dwell_secs: u64,
    /// How long a lone subject may stand still in a bathroom.
    pub bathroom_standing_secs: u64,
    /// Displacement that resets the bathroom standing timer (metres).
    pub bathroom_position_tolerance_m: f64,
    /// Height loss that counts as a sharp drop (metres).
    pub disappearance_drop_m: f64,
    /// Look-back window for the height drop (seconds).
    pub disappearance_window_secs: u64,
}

impl RuleThresholds {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            bed_exit_dwell_secs: src.parse("BED_EXIT_DWELL_SECS", d.bed_exit_dwell_secs)?,
            bed_exit_motion_tolerance_m: src
                .parse("BED_EXIT_MOTION_TOLERANCE_M", d.bed_exit_motion_tolerance_m)?,
            sensor_conflict_dwell_secs: src
                .parse("SENSOR_CONFLICT_DWELL_SECS", d.sensor_conflict_dwell_secs)?,
            bathroom_standing_secs: src.parse("BATHROOM_STANDING_SECS", d.bathroom_standing_secs)?,
            bathroom_position_tolerance_m: src
                .parse("BATHROOM_POSITION_TOLERANCE_M", d.bathroom_position_tolerance_m)?,
            disappearance_drop_m: src.parse("DISAPPEARANCE_DROP_M", d.disappearance_drop_m)?,
            disappearance_window_secs: src
                .parse("DISAPPEARANCE_WINDOW_SECS", d.disappearance_window_secs)?,
        })
    }
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            bed_exit_dwell_secs: 60,
            bed_exit_motion_tolerance_m: 0.5,
            sensor_conflict_dwell_secs: 30,
            bathroom_standing_secs: 300,
            bathroom_position_tolerance_m: 0.3,
            disappearance_drop_m: 0.6,
            disappearance_window_secs: 5,
        }
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl LogConfig {
    fn from_source(src: &Source<'_>) -> Self {
        Self {
            level: src.or("LOG_LEVEL", "info"),
            format: src.or("LOG_FORMAT", "pretty").to_lowercase(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}
