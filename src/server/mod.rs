//! Application server capabilities
//!
//! The pipeline talks to the server through two narrow interfaces: the
//! control binary shipped with the server ([`ServerControlClient`]) and the
//! CycleCloud CLI ([`CommandLineClient`]). Records are handed to the server's
//! importer through an [`ImportDirectory`].

pub mod import;
pub mod mock;
pub mod process;

pub use import::ImportDirectory;
pub use process::{CycleCloudCli, CycleServerControl};

use crate::ProvisionError;
use async_trait::async_trait;
use std::path::Path;

/// Show the first-boot setup UI again on next access
pub const RESET_INSTALLATION: &str =
    r#"update Application.Setting set Value = false where name == "cycleserver.installation.complete""#;

/// Let the first interactive login through without a datastore permission prompt
pub const RELAX_DATASTORE_PERMISSIONS: &str =
    r#"update Application.Setting set Value = false where name == "authorization.check_datastore_permissions""#;

/// Operations of the server control binary
#[async_trait]
pub trait ServerControlClient: Send + Sync {
    async fn start(&self) -> Result<(), ProvisionError>;

    async fn restart(&self) -> Result<(), ProvisionError>;

    /// Block until the server reports it has finished starting
    async fn await_startup(&self) -> Result<(), ProvisionError>;

    /// Human-readable server status
    async fn status(&self) -> Result<String, ProvisionError>;

    /// Obtain a publicly trusted certificate for `fqdn` via ACME
    async fn keystore_automatic(&self, fqdn: &str) -> Result<(), ProvisionError>;

    /// Run an administrative statement against the server's datastore
    async fn execute(&self, statement: &str) -> Result<(), ProvisionError>;
}

/// Operations of the CycleCloud CLI
#[async_trait]
pub trait CommandLineClient: Send + Sync {
    /// Create the CLI profile in batch mode against `url`
    async fn initialize(&self, url: &str, username: &str, secret: &str)
    -> Result<(), ProvisionError>;

    /// Create a cloud provider account from a descriptor file
    async fn create_account(&self, descriptor: &Path) -> Result<(), ProvisionError>;
}
