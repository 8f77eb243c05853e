//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`IoThreadSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `IOTHREAD_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{FrameCodec, IoThreadSettings, MAX_CONNECTIONS_LIMIT};

/// Default settings file location (`~/.iothread/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".iothread").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<IoThreadSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<IoThreadSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Read and merge a settings file over defaults without env overrides.
pub fn read_settings_file(path: &Path) -> Result<IoThreadSettings> {
    let defaults = serde_json::to_value(IoThreadSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
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

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut IoThreadSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are logged and ignored, leaving the file/default value.
pub fn apply_overrides<F>(settings: &mut IoThreadSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Channels ────────────────────────────────────────────────────
    if let Some(v) = env.usize("IOTHREAD_INBOUND_CAPACITY", 1, 1 << 20) {
        settings.channels.inbound_capacity = v;
    }
    if let Some(v) = env.usize("IOTHREAD_OUTBOUND_CAPACITY", 1, 1 << 20) {
        settings.channels.outbound_capacity = v;
    }

    // ── Transport ───────────────────────────────────────────────────
    if let Some(v) = env.string("IOTHREAD_CODEC") {
        match parse_codec(&v) {
            Some(codec) => settings.transport.codec = codec,
            None => warn!(key = "IOTHREAD_CODEC", value = %v, "unknown codec, ignoring"),
        }
    }
    if let Some(v) = env.usize("IOTHREAD_MAX_FRAME_SIZE", 64, 1 << 30) {
        settings.transport.max_frame_size = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("IOTHREAD_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("IOTHREAD_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("IOTHREAD_MAX_CONNECTIONS", 1, MAX_CONNECTIONS_LIMIT) {
        settings.server.max_connections = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("IOTHREAD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("IOTHREAD_LOG_JSON") {
        settings.logging.json = v;
    }
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

/// Parse a codec name (`raw` or `length_delimited`).
pub fn parse_codec(val: &str) -> Option<FrameCodec> {
    match val.to_lowercase().as_str() {
        "raw" => Some(FrameCodec::Raw),
        "length_delimited" | "length-delimited" => Some(FrameCodec::LengthDelimited),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}
