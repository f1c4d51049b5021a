//! Error types for cyclecloud-provision

use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command `{command}` exited with status {status}: {output}")]
    Command {
        command: String,
        status: i32,
        output: String,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Step '{step}' failed: {message}")]
    Step { step: String, message: String },
}

impl ProvisionError {
    /// Create a command error from a rendered command line and its captured output
    pub fn command(command: impl Into<String>, status: i32, output: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            status,
            output: output.into(),
        }
    }

    /// Create a step error
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<minijinja::Error> for ProvisionError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}
