//! cyclecloud-provision library
//!
//! First-boot provisioning of a CycleCloud application server running on an
//! Azure VM: the server is started, bound to the subscription it runs in and
//! left ready to use without a trip through the setup UI.
//!
//! # Design Principles
//!
//! - **Sequential**: every step depends on side effects left by the one before
//! - **Re-runnable**: account registration is gated on the server's import marker
//! - **Declared failure policy**: each step is either fatal or degrades and continues

pub mod config;
pub mod metadata;
pub mod pogo;
pub mod records;
pub mod secret;
pub mod server;
pub mod stages;

mod error;

pub use error::ProvisionError;
pub use stages::{Pipeline, ProvisionReport};

use serde::{Deserialize, Serialize};

/// Provisioning steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Start the application server and wait for it to come up
    StartServer,
    /// Fetch instance identity from the metadata service
    Metadata,
    /// Request a publicly trusted TLS certificate
    Certificate,
    /// Register the Azure account and bootstrap credentials
    Registration,
    /// Import the admin user's SSH public key as a credential
    CredentialImport,
    /// Finalize or reset the first-boot setup UI
    InstallationGate,
}

impl Step {
    /// All steps in the order the pipeline runs them
    pub const ALL: [Step; 6] = [
        Step::StartServer,
        Step::Metadata,
        Step::Certificate,
        Step::Registration,
        Step::CredentialImport,
        Step::InstallationGate,
    ];
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::StartServer => write!(f, "start-server"),
            Step::Metadata => write!(f, "metadata"),
            Step::Certificate => write!(f, "certificate"),
            Step::Registration => write!(f, "registration"),
            Step::CredentialImport => write!(f, "credential-import"),
            Step::InstallationGate => write!(f, "installation-gate"),
        }
    }
}

/// Instance identity retrieved from the metadata service
///
/// Fetched once per run; every Azure identifier written to the server is
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetadata {
    pub subscription_id: String,
    pub location: String,
    pub resource_group_name: String,
}
