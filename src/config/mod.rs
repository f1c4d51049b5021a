//! Provisioning configuration
//!
//! Everything the pipeline needs to know: the identity inputs handed over by
//! the deployment template, where the server lives on disk, how long to wait
//! for its asynchronous subsystems, and which steps are allowed to fail.

pub mod loader;

pub use loader::{DEFAULT_CONFIG_PATH, load_config};

use crate::{ProvisionError, Step};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default install root of the application server
pub const SERVER_ROOT: &str = "/opt/cycle_server";

/// Default location of the CycleCloud CLI
pub const CLI_PATH: &str = "/usr/local/bin/cyclecloud";

/// Parent of local user home directories
pub const HOME_ROOT: &str = "/home";

/// URL the CLI uses to reach the local server
pub const LOCAL_SERVER_URL: &str = "https://localhost";

/// Default Azure environment tag
pub const DEFAULT_AZURE_CLOUD: &str = "public";

/// Full provisioning configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Azure AD tenant of the service principal
    pub tenant_id: String,

    /// Service principal application id
    pub application_id: String,

    /// Service principal secret
    pub application_secret: String,

    /// Local admin user of the VM, also the named login user of the server
    pub admin_user: String,

    /// Public hostname used for certificate issuance
    pub hostname: Option<String>,

    /// Whether licensing terms were accepted for a silent install
    pub accept_terms: bool,

    /// Admin secret override; generated when absent
    pub password: Option<String>,

    /// Storage locker override; generated when absent
    pub storage_account: Option<String>,

    /// Azure environment tag (public, china, germany, usgov)
    pub azure_cloud: String,

    /// Where the server artifacts were downloaded from (informational)
    pub download_url: Option<String>,

    /// Installed server version (informational)
    pub version: Option<String>,

    /// Restart instead of start the server
    pub restart: bool,

    pub paths: ServerPaths,

    pub timings: Timings,

    pub policies: StepPolicies,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            application_id: String::new(),
            application_secret: String::new(),
            admin_user: String::new(),
            hostname: None,
            accept_terms: false,
            password: None,
            storage_account: None,
            azure_cloud: DEFAULT_AZURE_CLOUD.to_string(),
            download_url: None,
            version: None,
            restart: false,
            paths: ServerPaths::default(),
            timings: Timings::default(),
            policies: StepPolicies::default(),
        }
    }
}

impl std::fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("tenant_id", &self.tenant_id)
            .field("application_id", &self.application_id)
            .field("application_secret", &"<redacted>")
            .field("admin_user", &self.admin_user)
            .field("hostname", &self.hostname)
            .field("accept_terms", &self.accept_terms)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("storage_account", &self.storage_account)
            .field("azure_cloud", &self.azure_cloud)
            .field("download_url", &self.download_url)
            .field("version", &self.version)
            .field("restart", &self.restart)
            .field("paths", &self.paths)
            .field("timings", &self.timings)
            .field("policies", &self.policies)
            .finish()
    }
}

impl ProvisionConfig {
    /// Check the inputs registration cannot do without
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.admin_user.is_empty() {
            return Err(ProvisionError::Config(
                "admin username is required".to_string(),
            ));
        }
        if self.admin_user.contains('/') || self.admin_user.starts_with('.') {
            return Err(ProvisionError::Config(format!(
                "invalid admin username: {}",
                self.admin_user
            )));
        }
        if let Some(account) = &self.storage_account
            && (account.is_empty()
                || !account
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
        {
            return Err(ProvisionError::Config(format!(
                "storage account must be lowercase alphanumeric: {}",
                account
            )));
        }
        Ok(())
    }

    /// Whether an admin secret override was supplied
    pub fn password_supplied(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Filesystem layout of the server and its users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerPaths {
    /// Server install root (default: /opt/cycle_server)
    pub root: PathBuf,

    /// CycleCloud CLI binary
    pub cli: PathBuf,

    /// Parent of user home directories (default: /home)
    pub home_root: PathBuf,

    /// Home of the user running the CLI; `$HOME` when unset
    pub cli_home: Option<PathBuf>,

    /// URL the CLI is initialized against
    pub server_url: String,
}

impl Default for ServerPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from(SERVER_ROOT),
            cli: PathBuf::from(CLI_PATH),
            home_root: PathBuf::from(HOME_ROOT),
            cli_home: None,
            server_url: LOCAL_SERVER_URL.to_string(),
        }
    }
}

impl ServerPaths {
    /// Create with a custom server root (useful for testing)
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// <root>/cycle_server - server control binary
    pub fn control_binary(&self) -> PathBuf {
        self.root.join("cycle_server")
    }

    /// <root>/config/data - directory polled by the server's importer
    pub fn import_dir(&self) -> PathBuf {
        self.root.join("config").join("data")
    }

    /// Home directory of a local user
    pub fn user_home(&self, username: &str) -> PathBuf {
        self.home_root.join(username)
    }

    /// <home>/.ssh/authorized_keys of a local user
    pub fn authorized_keys(&self, username: &str) -> PathBuf {
        self.user_home(username).join(".ssh").join("authorized_keys")
    }

    /// Home directory of the user running the CLI
    pub fn cli_home(&self) -> PathBuf {
        self.cli_home.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/root"))
        })
    }
}

/// Fixed waits and retry bounds
///
/// Waits run to completion; only the certificate request is bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Warm-up before requesting a certificate
    pub startup_warmup_secs: u64,

    /// Upper bound on the ACME certificate request
    pub certificate_timeout_secs: u64,

    /// Wait for the server's import poller after dropping records
    pub import_settle_secs: u64,

    /// Delay between metadata attempts
    pub metadata_retry_delay_secs: u64,

    /// Timeout of a single metadata request
    pub metadata_timeout_secs: u64,

    /// Total metadata attempts
    pub metadata_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            startup_warmup_secs: 60,
            certificate_timeout_secs: 300,
            import_settle_secs: 5,
            metadata_retry_delay_secs: 2,
            metadata_timeout_secs: 2,
            metadata_attempts: 30,
        }
    }
}

impl Timings {
    /// No waits at all (useful for testing)
    pub fn immediate() -> Self {
        Self {
            startup_warmup_secs: 0,
            import_settle_secs: 0,
            metadata_retry_delay_secs: 0,
            ..Self::default()
        }
    }

    pub fn startup_warmup(&self) -> Duration {
        Duration::from_secs(self.startup_warmup_secs)
    }

    pub fn certificate_timeout(&self) -> Duration {
        Duration::from_secs(self.certificate_timeout_secs)
    }

    pub fn import_settle(&self) -> Duration {
        Duration::from_secs(self.import_settle_secs)
    }

    pub fn metadata_retry_delay(&self) -> Duration {
        Duration::from_secs(self.metadata_retry_delay_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

/// What happens when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepPolicy {
    /// Abort the remaining pipeline
    Fatal,
    /// Log, record the missing state and let the pipeline proceed
    DegradeAndContinue,
}

impl std::fmt::Display for StepPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::DegradeAndContinue => write!(f, "degrade-and-continue"),
        }
    }
}

/// Per-step failure policy table
///
/// The certificate step has no entry: it always degrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPolicies {
    pub start_server: StepPolicy,
    pub metadata: StepPolicy,
    pub registration: StepPolicy,
    pub credential_import: StepPolicy,
    pub installation_gate: StepPolicy,
}

impl Default for StepPolicies {
    fn default() -> Self {
        Self {
            start_server: StepPolicy::Fatal,
            metadata: StepPolicy::DegradeAndContinue,
            registration: StepPolicy::DegradeAndContinue,
            credential_import: StepPolicy::Fatal,
            installation_gate: StepPolicy::Fatal,
        }
    }
}

impl StepPolicies {
    /// Policy for a step
    pub fn for_step(&self, step: Step) -> StepPolicy {
        match step {
            Step::StartServer => self.start_server,
            Step::Metadata => self.metadata,
            Step::Certificate => StepPolicy::DegradeAndContinue,
            Step::Registration => self.registration,
            Step::CredentialImport => self.credential_import,
            Step::InstallationGate => self.installation_gate,
        }
    }
}
