use super::models::AppConfig;
use super::tables::ConfigTables;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Load configuration from a TOML file, falling back to defaults when the
/// file is missing or invalid.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => {
            info!(path = %path.display(), "No config file; using defaults");
            let mut config = AppConfig::default();
            config.clamp();
            return config;
        }
    };

    match parse_config(&contents) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded configuration");
            config
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config; using defaults: {err:#}");
            let mut config = AppConfig::default();
            config.clamp();
            config
        }
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let tables: ConfigTables = toml::from_str(contents).context("parsing config TOML")?;
    let mut config = AppConfig::from(tables);
    config.clamp();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::parse_config;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.synthesis_url, "http://localhost:3000");
        assert_eq!(config.max_cached_clips_per_book, 50);
        assert_eq!(config.prefetch_threshold_percent, 75.0);
        assert_eq!(config.skip_seconds, 10.0);
    }

    #[test]
    fn tables_override_defaults() {
        let config = parse_config(
            r#"
            [synthesis]
            server_url = "http://tts.local:8080"
            default_voice = "reader"

            [storage]
            max_cached_clips_per_book = 10

            [narration]
            prefetch_threshold_percent = 80.0
            "#,
        )
        .unwrap();
        assert_eq!(config.synthesis_url, "http://tts.local:8080");
        assert_eq!(config.default_voice, "reader");
        assert_eq!(config.max_cached_clips_per_book, 10);
        assert_eq!(config.prefetch_threshold_percent, 80.0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = parse_config(
            r#"
            [storage]
            max_cached_clips_per_book = 0

            [narration]
            prefetch_threshold_percent = 5.0
            tick_interval_ms = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.max_cached_clips_per_book, 1);
        assert_eq!(config.prefetch_threshold_percent, 50.0);
        assert_eq!(config.tick_interval_ms, 16);
    }
}
