//! Process-backed server clients

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{CommandLineClient, ServerControlClient};
use crate::ProvisionError;

/// Argument prefixes whose values never reach the logs
const SECRET_FLAGS: &[&str] = &["--password="];

/// Render a command line for logs and errors with secret values masked
pub fn render_command(program: &Path, args: &[String]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        match SECRET_FLAGS.iter().find(|flag| arg.starts_with(**flag)) {
            Some(flag) => {
                rendered.push_str(flag);
                rendered.push_str("***");
            }
            None => rendered.push_str(arg),
        }
    }
    rendered
}

/// Run a command to completion, returning stdout
///
/// A non-zero exit becomes [`ProvisionError::Command`] carrying the captured
/// output.
pub async fn run_command(program: &Path, args: &[String]) -> Result<String, ProvisionError> {
    let rendered = render_command(program, args);
    debug!("Running command: {}", rendered);

    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| ProvisionError::command(&rendered, -1, e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("Error with cmd: {}", rendered);
        return Err(ProvisionError::command(
            rendered,
            output.status.code().unwrap_or(-1),
            format!("{}{}", stdout, stderr).trim().to_string(),
        ));
    }

    if !stdout.is_empty() {
        debug!("stdout: {}", stdout.trim_end());
    }

    Ok(stdout)
}

/// The `cycle_server` control binary
#[derive(Debug, Clone)]
pub struct CycleServerControl {
    binary: PathBuf,
}

impl CycleServerControl {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ProvisionError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        run_command(&self.binary, &args).await
    }
}

#[async_trait]
impl ServerControlClient for CycleServerControl {
    async fn start(&self) -> Result<(), ProvisionError> {
        info!("Starting CycleCloud server");
        self.run(&["start"]).await.map(|_| ())
    }

    async fn restart(&self) -> Result<(), ProvisionError> {
        info!("Restarting CycleCloud server");
        self.run(&["restart"]).await.map(|_| ())
    }

    async fn await_startup(&self) -> Result<(), ProvisionError> {
        self.run(&["await_startup"]).await.map(|_| ())
    }

    async fn status(&self) -> Result<String, ProvisionError> {
        self.run(&["status"]).await
    }

    async fn keystore_automatic(&self, fqdn: &str) -> Result<(), ProvisionError> {
        self.run(&["keystore", "automatic", "--accept-terms", fqdn])
            .await
            .map(|_| ())
    }

    async fn execute(&self, statement: &str) -> Result<(), ProvisionError> {
        self.run(&["execute", statement]).await.map(|_| ())
    }
}

/// The `cyclecloud` CLI
#[derive(Debug, Clone)]
pub struct CycleCloudCli {
    binary: PathBuf,
}

impl CycleCloudCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl CommandLineClient for CycleCloudCli {
    async fn initialize(
        &self,
        url: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), ProvisionError> {
        info!("Initializing cyclecloud CLI");
        let args = vec![
            "initialize".to_string(),
            "--loglevel=debug".to_string(),
            "--batch".to_string(),
            format!("--url={}", url),
            "--verify-ssl=false".to_string(),
            format!("--username={}", username),
            format!("--password={}", secret),
        ];
        run_command(&self.binary, &args).await.map(|_| ())
    }

    async fn create_account(&self, descriptor: &Path) -> Result<(), ProvisionError> {
        info!("Registering Azure subscription");
        let args = vec![
            "account".to_string(),
            "create".to_string(),
            "-f".to_string(),
            descriptor.display().to_string(),
        ];
        run_command(&self.binary, &args).await.map(|_| ())
    }
}
