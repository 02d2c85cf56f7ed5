use super::defaults;
use super::models::{AppConfig, LogLevel};
use serde::Deserialize;

/// On-disk layout of `conf/config.toml`: grouped tables that flatten into the
/// single `AppConfig` the rest of the crate consumes.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(super) struct ConfigTables {
    synthesis: SynthesisConfig,
    storage: StorageConfig,
    narration: NarrationConfig,
    logging: LoggingConfig,
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            synthesis_url: tables.synthesis.server_url,
            request_timeout_secs: tables.synthesis.request_timeout_secs,
            fallback_bitrate_kbps: tables.synthesis.fallback_bitrate_kbps,
            default_voice: tables.synthesis.default_voice,
            cache_dir: tables.storage.cache_dir,
            max_cached_clips_per_book: tables.storage.max_cached_clips_per_book,
            skip_seconds: tables.narration.skip_seconds,
            prefetch_threshold_percent: tables.narration.prefetch_threshold_percent,
            position_save_interval_secs: tables.narration.position_save_interval_secs,
            tick_interval_ms: tables.narration.tick_interval_ms,
            log_level: tables.logging.log_level,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct SynthesisConfig {
    server_url: String,
    request_timeout_secs: u64,
    fallback_bitrate_kbps: u32,
    default_voice: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            server_url: defaults::default_synthesis_url(),
            request_timeout_secs: defaults::default_request_timeout_secs(),
            fallback_bitrate_kbps: defaults::default_fallback_bitrate_kbps(),
            default_voice: defaults::default_voice(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct StorageConfig {
    cache_dir: String,
    max_cached_clips_per_book: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: defaults::default_cache_dir(),
            max_cached_clips_per_book: defaults::default_max_cached_clips_per_book(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct NarrationConfig {
    skip_seconds: f32,
    prefetch_threshold_percent: f32,
    position_save_interval_secs: f32,
    tick_interval_ms: u64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            skip_seconds: defaults::default_skip_seconds(),
            prefetch_threshold_percent: defaults::default_prefetch_threshold_percent(),
            position_save_interval_secs: defaults::default_position_save_interval_secs(),
            tick_interval_ms: defaults::default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct LoggingConfig {
    log_level: LogLevel,
}
