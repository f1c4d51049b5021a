//! Azure account registration
//!
//! Runs at most once per server: the bootstrap record set is dropped into the
//! import directory and nothing is attempted again once the server has marked
//! it imported. After the import settles the CLI is initialized as `root`,
//! the Azure account is created from its descriptor, and the installation
//! settings are adjusted for the first interactive login.

use crate::config::{ProvisionConfig, StepPolicy};
use crate::records::{AccountDescriptor, AccountInputs, ROOT_USER, bootstrap_records};
use crate::server::import::ACCOUNT_DATA_FILE;
use crate::server::{
    CommandLineClient, ImportDirectory, RELAX_DATASTORE_PERMISSIONS, RESET_INSTALLATION,
    ServerControlClient,
};
use crate::{InstanceMetadata, ProvisionError, pogo, secret};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Descriptor file handed to `cyclecloud account create`
pub const AZURE_DATA_FILE: &str = "azure_data.json";

/// Result of the registration step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RegistrationOutcome {
    Registered {
        storage_account: String,
        login_user_created: bool,
    },
    /// The server had already imported the bootstrap records
    AlreadyRegistered,
    /// Registration failed and the pipeline went on without an account
    Failed { reason: String },
}

/// Registers the Azure account and bootstrap credentials with the server
pub struct AccountRegistrar<'a> {
    server: &'a dyn ServerControlClient,
    cli: &'a dyn CommandLineClient,
    imports: &'a ImportDirectory,
    config: &'a ProvisionConfig,
    workspace: &'a Path,
}

impl<'a> AccountRegistrar<'a> {
    pub fn new(
        server: &'a dyn ServerControlClient,
        cli: &'a dyn CommandLineClient,
        imports: &'a ImportDirectory,
        config: &'a ProvisionConfig,
        workspace: &'a Path,
    ) -> Self {
        Self {
            server,
            cli,
            imports,
            config,
            workspace,
        }
    }

    /// Register the account using `admin_secret` for every bootstrap login
    ///
    /// Under a fatal registration policy any failure is returned; otherwise it
    /// is reported as [`RegistrationOutcome::Failed`] for the caller to log.
    pub async fn register(
        &self,
        metadata: &InstanceMetadata,
        admin_secret: &str,
    ) -> Result<RegistrationOutcome, ProvisionError> {
        match self.try_register(metadata, admin_secret).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => match self.config.policies.registration {
                StepPolicy::Fatal => Err(e),
                StepPolicy::DegradeAndContinue => Ok(RegistrationOutcome::Failed {
                    reason: format!("{}. Check the service principal credentials", e),
                }),
            },
        }
    }

    async fn try_register(
        &self,
        metadata: &InstanceMetadata,
        admin_secret: &str,
    ) -> Result<RegistrationOutcome, ProvisionError> {
        if self.imports.is_imported(ACCOUNT_DATA_FILE).await? {
            info!("Bootstrap records already imported, skipping account registration");
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        info!("Setting up azure account in CycleCloud and initializing cyclecloud CLI");

        let config = self.config;
        let storage_account = secret::generate_locker_name(config.storage_account.as_deref());
        let inputs = AccountInputs {
            tenant_id: &config.tenant_id,
            application_id: &config.application_id,
            application_secret: &config.application_secret,
            azure_cloud: &config.azure_cloud,
        };
        let account = AccountDescriptor::new(metadata, &inputs, &storage_account);
        let records = bootstrap_records(admin_secret, &config.admin_user, config.accept_terms);

        self.imports.write(ACCOUNT_DATA_FILE, &records).await?;
        let descriptor = self.write_descriptor(&account).await?;

        // The importer gives no acknowledgment; give it time to pick the records up
        debug!("Waiting {:?} for the import to complete", config.timings.import_settle());
        tokio::time::sleep(config.timings.import_settle()).await;

        self.cli
            .initialize(&config.paths.server_url, ROOT_USER, admin_secret)
            .await?;
        self.cli.create_account(&descriptor).await?;

        self.install_storage_profiles(&account).await?;

        if !config.accept_terms {
            info!("Terms not accepted, resetting installation");
            self.server.execute(RESET_INSTALLATION).await?;
        }
        self.server.execute(RELAX_DATASTORE_PERMISSIONS).await?;

        info!("Registered Azure subscription {}", metadata.subscription_id);
        Ok(RegistrationOutcome::Registered {
            storage_account,
            login_user_created: config.accept_terms,
        })
    }

    async fn write_descriptor(&self, account: &AccountDescriptor) -> Result<PathBuf, ProvisionError> {
        let path = self.workspace.join(AZURE_DATA_FILE);
        fs::write(&path, serde_json::to_vec_pretty(account)?).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        debug!("Wrote account descriptor {}", path.display());
        Ok(path)
    }

    /// Storage profiles for the CLI user and the admin user
    async fn install_storage_profiles(&self, account: &AccountDescriptor) -> Result<(), ProvisionError> {
        let contents = pogo::render_pogo_config(account)?;
        let paths = &self.config.paths;

        pogo::write_pogo_config(&paths.cli_home(), &contents).await?;

        let admin_home = paths.user_home(&self.config.admin_user);
        pogo::write_pogo_config(&admin_home, &contents).await?;
        pogo::change_ownership(&admin_home, &self.config.admin_user).await;

        Ok(())
    }
}
