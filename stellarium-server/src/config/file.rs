//! TOML file configuration structures.
//!
//! These structs directly map to the `stellarium.toml` file format.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use stellarium_core::config::PipelineConfig;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub horizon: HorizonConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineOverrides,
}

/// Telegram section.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// File holding the bot token; surrounding whitespace is ignored.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
        }
    }
}

fn default_token_file() -> PathBuf {
    PathBuf::from("./bot.key")
}

/// Horizon section.
#[derive(Debug, Clone, Deserialize)]
pub struct HorizonConfig {
    #[serde(default = "default_horizon_url")]
    pub url: Url,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            url: default_horizon_url(),
        }
    }
}

fn default_horizon_url() -> Url {
    "https://horizon.stellar.org/"
        .parse()
        .expect("valid default url")
}

/// Database section.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, created if missing.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./stellarium.db")
}

/// Diagnostics endpoint section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Address of the `/health` and `/stats` endpoint; disabled when absent.
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

/// Optional overrides of the pipeline tunables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineOverrides {
    /// Decimal string, e.g. `"0.001"`.
    pub spam_threshold: Option<Decimal>,
    pub debounce_ms: Option<u64>,
    pub flush_tick_ms: Option<u64>,
    pub max_fragments: Option<usize>,
    pub max_message_chars: Option<usize>,
    pub checkpoint_freshness_secs: Option<u64>,
    pub checkpoint_interval_secs: Option<u64>,
    pub sanity_interval_secs: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub stable_connection_secs: Option<u64>,
    pub max_quick_failures: Option<u32>,
    pub reconnect_cooldown_secs: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
}

impl PipelineOverrides {
    /// Apply the overrides on top of `base`.
    pub fn apply(&self, base: PipelineConfig) -> PipelineConfig {
        let ms = |v: Option<u64>, d: Duration| v.map(Duration::from_millis).unwrap_or(d);
        let secs = |v: Option<u64>, d: Duration| v.map(Duration::from_secs).unwrap_or(d);

        PipelineConfig {
            spam_threshold: self.spam_threshold.unwrap_or(base.spam_threshold),
            debounce: ms(self.debounce_ms, base.debounce),
            flush_tick: ms(self.flush_tick_ms, base.flush_tick),
            max_fragments: self.max_fragments.unwrap_or(base.max_fragments),
            max_message_chars: self.max_message_chars.unwrap_or(base.max_message_chars),
            checkpoint_freshness: secs(self.checkpoint_freshness_secs, base.checkpoint_freshness),
            checkpoint_interval: secs(self.checkpoint_interval_secs, base.checkpoint_interval),
            sanity_interval: secs(self.sanity_interval_secs, base.sanity_interval),
            queue_capacity: self.queue_capacity.unwrap_or(base.queue_capacity),
            stable_connection: secs(self.stable_connection_secs, base.stable_connection),
            max_quick_failures: self.max_quick_failures.unwrap_or(base.max_quick_failures),
            reconnect_cooldown: secs(self.reconnect_cooldown_secs, base.reconnect_cooldown),
            drain_timeout: secs(self.drain_timeout_secs, base.drain_timeout),
        }
    }
}
