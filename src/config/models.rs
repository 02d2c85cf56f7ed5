use serde::Deserialize;

/// High-level app configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct AppConfig {
    pub synthesis_url: String,
    pub request_timeout_secs: u64,
    pub fallback_bitrate_kbps: u32,
    pub default_voice: String,
    pub cache_dir: String,
    pub max_cached_clips_per_book: usize,
    pub skip_seconds: f32,
    pub prefetch_threshold_percent: f32,
    pub position_save_interval_secs: f32,
    pub tick_interval_ms: u64,
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            synthesis_url: super::defaults::default_synthesis_url(),
            request_timeout_secs: super::defaults::default_request_timeout_secs(),
            fallback_bitrate_kbps: super::defaults::default_fallback_bitrate_kbps(),
            default_voice: super::defaults::default_voice(),
            cache_dir: super::defaults::default_cache_dir(),
            max_cached_clips_per_book: super::defaults::default_max_cached_clips_per_book(),
            skip_seconds: super::defaults::default_skip_seconds(),
            prefetch_threshold_percent: super::defaults::default_prefetch_threshold_percent(),
            position_save_interval_secs: super::defaults::default_position_save_interval_secs(),
            tick_interval_ms: super::defaults::default_tick_interval_ms(),
            log_level: super::defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    /// Clamp out-of-range values after load so a hand-edited config cannot
    /// wedge the narration loop.
    pub(super) fn clamp(&mut self) {
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 300);
        self.fallback_bitrate_kbps = self.fallback_bitrate_kbps.clamp(32, 320);
        self.max_cached_clips_per_book = self.max_cached_clips_per_book.max(1);
        self.skip_seconds = self.skip_seconds.clamp(1.0, 60.0);
        self.prefetch_threshold_percent = self.prefetch_threshold_percent.clamp(50.0, 95.0);
        self.position_save_interval_secs = self.position_save_interval_secs.clamp(1.0, 60.0);
        self.tick_interval_ms = self.tick_interval_ms.clamp(16, 1000);
        if self.cache_dir.trim().is_empty() {
            self.cache_dir = super::defaults::default_cache_dir();
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
