//! Edge-only configuration loading (SPEC_FULL.md §4.9): an optional TOML
//! file overlaid with environment variables, producing a `KernelConfig`.
//! `kernel-core` never reads files or the environment itself.

use kernel_core::KernelConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    auto_global: Option<bool>,
    strict_versioning: Option<bool>,
    circular_dependencies: Option<bool>,
    initialization_timeout_ms: Option<u64>,
    extensions_enabled: Option<bool>,
    log_level: Option<String>,
}

/// Loads `path` (if given) as TOML, then applies `KERNEL_*` environment
/// overrides on top, falling back to `KernelConfig::default()` for
/// anything neither source sets.
pub fn load(path: Option<&Path>) -> Result<KernelConfig, String> {
    let mut file_config = FileConfig::default();
    if let Some(path) = path {
        let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        file_config = toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))?;
    }

    let defaults = KernelConfig::default();
    let mut config = KernelConfig {
        auto_global: file_config.auto_global.unwrap_or(defaults.auto_global),
        strict_versioning: file_config.strict_versioning.unwrap_or(defaults.strict_versioning),
        circular_dependencies: file_config.circular_dependencies.unwrap_or(defaults.circular_dependencies),
        initialization_timeout: file_config
            .initialization_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.initialization_timeout),
        extensions_enabled: file_config.extensions_enabled.unwrap_or(defaults.extensions_enabled),
        log_level: file_config.log_level.unwrap_or(defaults.log_level),
    };

    if let Ok(value) = std::env::var("KERNEL_STRICT_VERSIONING") {
        config.strict_versioning = parse_bool_env(&value, "KERNEL_STRICT_VERSIONING")?;
    }
    if let Ok(value) = std::env::var("KERNEL_CIRCULAR_DEPENDENCIES") {
        config.circular_dependencies = parse_bool_env(&value, "KERNEL_CIRCULAR_DEPENDENCIES")?;
    }
    if let Ok(value) = std::env::var("KERNEL_LOG_LEVEL") {
        config.log_level = value;
    }

    Ok(config)
}

fn parse_bool_env(value: &str, name: &str) -> Result<bool, String> {
    value.parse::<bool>().map_err(|_| format!("{name} must be 'true' or 'false', got '{value}'"))
}
