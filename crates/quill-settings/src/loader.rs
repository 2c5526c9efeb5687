//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`QuillSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `QUILL_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::QuillSettings;

/// Resolve the default settings file path (`~/.quill/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".quill").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<QuillSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid final value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<QuillSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<QuillSettings> {
    let defaults = serde_json::to_value(QuillSettings::default())?;

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

/// Apply `QUILL_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut QuillSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_overrides<F>(settings: &mut QuillSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── Server ──
    if let Some(v) = read_string("QUILL_HOST") {
        settings.server.host = v;
    }
    if let Some(raw) = read_string("QUILL_PORT") {
        match parse_u16_range(&raw, 1, 65535) {
            Some(v) => settings.server.port = v,
            None => warn!(key = "QUILL_PORT", value = %raw, "invalid port env var, ignoring"),
        }
    }
    if let Some(raw) = read_string("QUILL_ALLOWED_ORIGINS") {
        let origins = parse_list(&raw);
        if origins.is_empty() {
            warn!(key = "QUILL_ALLOWED_ORIGINS", "empty origin list, ignoring");
        } else {
            settings.server.allowed_origins = origins;
        }
    }

    // ── Storage & roster ──
    if let Some(v) = read_string("QUILL_DATA_DIR") {
        settings.storage.data_dir = v;
    }
    if let Some(v) = read_string("QUILL_ROSTER_PATH") {
        settings.roster.path = v;
    }
    if let Some(raw) = read_string("QUILL_ROSTER_TTL_SECS") {
        match parse_u64_range(&raw, 0, 86_400) {
            Some(v) => settings.roster.cache_ttl_secs = v,
            None => {
                warn!(key = "QUILL_ROSTER_TTL_SECS", value = %raw, "invalid ttl env var, ignoring")
            }
        }
    }

    // ── Pairing ──
    if let Some(raw) = read_string("QUILL_PAIRING_ATTEMPTS") {
        match parse_u64_range(&raw, 1, 20) {
            Some(v) => settings.pairing.max_attempts = v as u32,
            None => warn!(
                key = "QUILL_PAIRING_ATTEMPTS",
                value = %raw,
                "invalid attempts env var, ignoring"
            ),
        }
    }

    // ── Logging ──
    if let Some(v) = read_string("QUILL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(raw) = read_string("QUILL_PERSIST_WARNINGS") {
        match parse_bool(&raw) {
            Some(v) => settings.logging.persist_warnings = v,
            None => warn!(
                key = "QUILL_PERSIST_WARNINGS",
                value = %raw,
                "invalid boolean env var, ignoring"
            ),
        }
    }
}

// ── Pure parsing functions ──

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── deep_merge ──

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── file loading ──

    #[test]
    fn missing_file_returns_defaults() {
        let settings = read_layered(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, QuillSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "roster": {"cacheTtlSecs": 5}}"#,
        )
        .unwrap();

        let settings = read_layered(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.roster.cache_ttl_secs, 5);
        assert_eq!(settings.roster.path, "roster.json");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = read_layered(&path);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn invalid_value_rejected_after_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"pairing": {"maxAttempts": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::InvalidValue(_))));
    }

    // ── overrides ──

    #[test]
    fn overrides_apply() {
        let env = vars(&[
            ("QUILL_PORT", "9001"),
            ("QUILL_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("QUILL_ROSTER_TTL_SECS", "0"),
            ("QUILL_PAIRING_ATTEMPTS", "5"),
            ("QUILL_PERSIST_WARNINGS", "off"),
        ]);
        let mut settings = QuillSettings::default();
        apply_overrides(&mut settings, |k| env.get(k).cloned());

        assert_eq!(settings.server.port, 9001);
        assert_eq!(
            settings.server.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(settings.roster.cache_ttl_secs, 0);
        assert_eq!(settings.pairing.max_attempts, 5);
        assert!(!settings.logging.persist_warnings);
    }

    #[test]
    fn invalid_overrides_ignored() {
        let env = vars(&[
            ("QUILL_PORT", "0"),
            ("QUILL_PAIRING_ATTEMPTS", "many"),
            ("QUILL_HOST", "   "),
        ]);
        let mut settings = QuillSettings::default();
        apply_overrides(&mut settings, |k| env.get(k).cloned());
        assert_eq!(settings, QuillSettings::default());
    }

    // ── parsers ──

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("21", 1, 20), None);
    }

    #[test]
    fn parse_list_drops_blanks() {
        assert_eq!(parse_list("a, ,b,"), vec!["a", "b"]);
        assert!(parse_list(" , ").is_empty());
    }
}
