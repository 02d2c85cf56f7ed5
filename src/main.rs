//! Entry point for the lectern narrator.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load user configuration from `conf/config.toml` and book metadata from
//!   `conf/library.toml`.
//! - Load the book text and hand everything to the transport loop.

mod book;
mod config;
mod library;
mod narration;
mod paragraphs;
mod playback;
mod position;
mod speech_cache;
mod synthesis;
mod transport;

use crate::book::load_book_text;
use crate::config::load_config;
use crate::library::Library;
use crate::narration::{NarrationController, NarrationSettings};
use crate::paragraphs::split_paragraphs;
use crate::playback::RodioSurface;
use crate::position::PositionStore;
use crate::speech_cache::SpeechCache;
use crate::synthesis::HttpSynthesizer;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let book_path = parse_args()?;
    let config = load_config(Path::new("conf/config.toml"));
    set_log_level(reload_handle, config.log_level.as_filter_str());

    let library = Library::load_default();
    let book = library.resolve(&book_path);
    info!(
        id = %book.id,
        title = %book.title,
        backend = %config.synthesis_url,
        "Preparing narration"
    );

    let text = load_book_text(&book_path)?;
    let paragraphs = split_paragraphs(&text);
    if paragraphs.is_empty() {
        return Err(anyhow!("{} contains no narratable text", book_path.display()));
    }
    info!(paragraphs = paragraphs.len(), "Segmented book text");

    let cache_root = PathBuf::from(&config.cache_dir);
    let cache = SpeechCache::new(cache_root.join("speech"), config.max_cached_clips_per_book);
    let positions = PositionStore::new(&cache_root);
    let synthesizer = HttpSynthesizer::new(
        &config.synthesis_url,
        Duration::from_secs(config.request_timeout_secs),
        config.fallback_bitrate_kbps,
    )
    .context("Creating synthesis client")?;
    let voice = book.voice_selector(&config.default_voice);
    let settings = NarrationSettings {
        skip_seconds: config.skip_seconds,
        prefetch_threshold_percent: config.prefetch_threshold_percent,
        position_save_interval: Duration::from_secs_f32(config.position_save_interval_secs),
    };

    let controller = NarrationController::new(
        book.id.clone(),
        voice,
        text,
        cache,
        positions,
        synthesizer,
        RodioSurface::new(),
        settings,
    );

    println!("{} ({} paragraphs)", book.title, paragraphs.len());
    transport::run(
        controller,
        paragraphs,
        Duration::from_millis(config.tick_interval_ms),
    )
}

fn parse_args() -> Result<PathBuf> {
    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| anyhow!("Usage: lectern <path-to-book>"))?;

    let path = PathBuf::from(path);
    if !path.exists() {
        return Err(anyhow!("File not found: {}", path.as_path().display()));
    }
    Ok(path)
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    if env::var_os("RUST_LOG").is_some() {
        // RUST_LOG always wins over the config file.
        return;
    }
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    match handle.modify(move |filter| *filter = parsed) {
        Ok(()) => info!(%level, "Applied log level from config"),
        Err(err) => warn!(%level, "Failed to update log level from config: {err}"),
    }
}
