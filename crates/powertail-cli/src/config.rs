//! Filter configuration loading and validation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Stream filter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Samples per block.
    #[serde(default = "default_block_len")]
    pub block_len: usize,

    /// Power-law decay exponent.
    #[serde(default = "default_decay")]
    pub decay: f64,
}

fn default_block_len() -> usize {
    2048
}

fn default_decay() -> f64 {
    0.5
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            block_len: default_block_len(),
            decay: default_decay(),
        }
    }
}

/// Load configuration from a file.
///
/// `.json` files parse as JSON, anything else as TOML.
pub fn load_config(path: &Path) -> Result<FilterConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: FilterConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content).with_context(|| "Failed to parse config as TOML")?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Write a configuration file, format chosen by extension.
///
/// `.toml` writes TOML, anything else JSON.
pub fn save_config(config: &FilterConfig, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |e| e == "toml") {
        toml::to_string_pretty(config)?
    } else {
        serde_json::to_string_pretty(config)?
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

/// Validate configuration.
fn validate_config(config: &FilterConfig) -> Result<()> {
    if config.block_len == 0 {
        anyhow::bail!("block_len must be at least 1");
    }

    if !config.decay.is_finite() {
        anyhow::bail!("decay must be finite, got {}", config.decay);
    }

    Ok(())
}
