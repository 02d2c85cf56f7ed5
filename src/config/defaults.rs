pub(crate) fn default_synthesis_url() -> String {
    "http://localhost:3000".to_string()
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_fallback_bitrate_kbps() -> u32 {
    crate::synthesis::DEFAULT_FALLBACK_BITRATE_KBPS
}

pub(crate) fn default_voice() -> String {
    "narrator".to_string()
}

pub(crate) fn default_cache_dir() -> String {
    ".cache".to_string()
}

pub(crate) fn default_max_cached_clips_per_book() -> usize {
    crate::speech_cache::DEFAULT_MAX_ENTRIES_PER_BOOK
}

pub(crate) fn default_skip_seconds() -> f32 {
    10.0
}

pub(crate) fn default_prefetch_threshold_percent() -> f32 {
    75.0
}

pub(crate) fn default_position_save_interval_secs() -> f32 {
    5.0
}

pub(crate) fn default_tick_interval_ms() -> u64 {
    100
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}
