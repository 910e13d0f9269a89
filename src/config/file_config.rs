use std::fs;
use std::path::Path;

use tracing::info;

use super::data_model::{ConfigFile, RuntimeConfig};
use crate::errors::ConfigError;

pub fn parse_json_config(content: &str) -> Result<ConfigFile, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn parse_yaml_config(content: &str) -> Result<ConfigFile, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load and validate the catalog from a YAML or JSON file.
pub fn load_from_file(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    info!("Loading configuration from {}", path.display());

    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let config = if ext == "json" {
        parse_json_config(&content)?
    } else {
        parse_yaml_config(&content)?
    };

    config.into_runtime()
}
