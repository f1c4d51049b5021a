//! Configuration file loader
//!
//! Loads the optional YAML configuration. Command line flags are layered on
//! top by the binary.

use super::ProvisionConfig;
use crate::ProvisionError;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Configuration file read when no explicit path is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cyclecloud-provision/config.yaml";

/// Load configuration from `path`, or from the default location if present
///
/// An explicit path that does not exist is an error; a missing default file
/// yields the built-in defaults.
pub async fn load_config(path: Option<&Path>) -> Result<ProvisionConfig, ProvisionError> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ProvisionError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            load_config_file(path).await
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config_file(default).await
            } else {
                debug!("No config file at {}, using defaults", DEFAULT_CONFIG_PATH);
                Ok(ProvisionConfig::default())
            }
        }
    }
}

async fn load_config_file(path: &Path) -> Result<ProvisionConfig, ProvisionError> {
    let content = fs::read_to_string(path).await?;
    let config = parse_config(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse configuration YAML; an empty document yields the defaults
pub fn parse_config(yaml: &str) -> Result<ProvisionConfig, ProvisionError> {
    if yaml.trim().is_empty() {
        return Ok(ProvisionConfig::default());
    }
    Ok(serde_yaml::from_str(yaml)?)
}
