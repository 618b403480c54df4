//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PileupSettings::default()`]
//! 2. If `~/.pileup/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PILEUP_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::PileupSettings;

/// Resolve the path to the settings file (`~/.pileup/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pileup").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PileupSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid final value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<PileupSettings> {
    let mut settings = merge_file_over_defaults(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn merge_file_over_defaults(path: &Path) -> Result<PileupSettings> {
    let defaults = serde_json::to_value(PileupSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_env_overrides(settings: &mut PileupSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Split out from [`apply_env_overrides`] so tests can supply variables
/// without touching the process environment.
pub fn apply_overrides<F>(settings: &mut PileupSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("PILEUP_API_URL") {
        settings.server.api_base_url = v;
    }
    if let Some(v) = read("PILEUP_WS_URL") {
        settings.server.ws_url = Some(v);
    }
    if let Some(v) = parsed(&read, "PILEUP_REQUEST_TIMEOUT_MS", |s| {
        parse_u64_range(s, 100, 600_000)
    }) {
        settings.server.request_timeout_ms = v;
    }

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = parsed(&read, "PILEUP_RECONNECT_INTERVAL_MS", |s| {
        parse_u64_range(s, 10, 600_000)
    }) {
        settings.connection.reconnect_interval_ms = v;
    }
    if let Some(v) = parsed(&read, "PILEUP_MAX_RECONNECT_ATTEMPTS", |s| {
        parse_u32_range(s, 1, 10_000)
    }) {
        settings.connection.max_reconnect_attempts = v;
    }
    if let Some(v) = parsed(&read, "PILEUP_HEARTBEAT_INTERVAL_MS", |s| {
        parse_u64_range(s, 1_000, 600_000)
    }) {
        settings.connection.heartbeat_interval_ms = v;
    }

    // ── Sync ────────────────────────────────────────────────────────
    if let Some(v) = parsed(&read, "PILEUP_VALIDATE_CALLSIGNS", parse_bool) {
        settings.sync.validate_callsigns = v;
    }
    if let Some(v) = parsed(&read, "PILEUP_RESYNC_ON_RECONNECT", parse_bool) {
        settings.sync.resync_on_reconnect = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("PILEUP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed(&read, "PILEUP_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

fn parsed<T>(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
