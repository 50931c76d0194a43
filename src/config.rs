//! Analyzer configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding modscope state inside a workspace
pub const CONFIG_DIR: &str = ".modscope";

/// Analyzer options, read from the `[analyzer]` section of `.modscope/config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Usages shown inline before collapsing the rest (display only)
    #[serde(default = "default_max_inline_usages")]
    pub max_inline_usages: usize,

    /// Restrict usage searches to modules that can see the symbol
    #[serde(default = "default_enable_module_scoping")]
    pub enable_module_scoping: bool,

    /// Query cache capacity; fixed when the analyzer is created
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Globs excluded from every file enumeration
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Delay before a burst of changes to one file is processed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_max_inline_usages() -> usize {
    5
}

fn default_enable_module_scoping() -> bool {
    true
}

fn default_cache_size() -> usize {
    100
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "**/node_modules/**",
        "**/dist/**",
        "**/out/**",
        "**/build/**",
        "**/.git/**",
        "**/coverage/**",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_inline_usages: default_max_inline_usages(),
            enable_module_scoping: default_enable_module_scoping(),
            cache_size: default_cache_size(),
            exclude_patterns: default_exclude_patterns(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Path of the config file for a workspace root
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join("config.toml")
}

/// Load analyzer config for the workspace at `root`
///
/// Falls back to defaults if the file doesn't exist or the [analyzer] section is missing.
pub fn load_config(root: &Path) -> Result<AnalyzerConfig> {
    let path = config_path(root);

    if !path.exists() {
        log::debug!("No config.toml found, using default analyzer config");
        return Ok(AnalyzerConfig::default());
    }

    let config_str = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let toml_value: toml::Value = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    match toml_value.get("analyzer") {
        Some(table) => {
            let config: AnalyzerConfig = table
                .clone()
                .try_into()
                .context("Failed to parse [analyzer] section")?;
            Ok(config)
        }
        None => {
            log::debug!("No [analyzer] section in config.toml, using defaults");
            Ok(AnalyzerConfig::default())
        }
    }
}
