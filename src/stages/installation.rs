//! Installation state gate
//!
//! Decides at the end of the run whether the server is finalized silently or
//! whether its first-boot setup UI is brought back for manual completion.

use crate::ProvisionError;
use crate::records::{AdminCredential, ImportRecord};
use crate::server::import::{ACCOUNT_DATA_FILE, LOGIN_USER_FILE};
use crate::server::{ImportDirectory, RESET_INSTALLATION, ServerControlClient};
use serde::Serialize;
use tracing::info;

/// Outcome of the installation gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallationDecision {
    /// Terms accepted and a password was supplied
    FinalizeWithSuppliedSecret,
    /// Terms accepted; the login user gets the generated secret
    FinalizeWithGeneratedSecret,
    /// Terms not accepted; the setup UI reappears
    ResetInstallation,
}

impl InstallationDecision {
    pub fn is_finalize(&self) -> bool {
        !matches!(self, Self::ResetInstallation)
    }
}

/// Evaluate the decision table
pub fn decide(accept_terms: bool, password_supplied: bool) -> InstallationDecision {
    match (accept_terms, password_supplied) {
        (true, true) => InstallationDecision::FinalizeWithSuppliedSecret,
        (true, false) => InstallationDecision::FinalizeWithGeneratedSecret,
        (false, _) => InstallationDecision::ResetInstallation,
    }
}

/// Carry out `decision`
///
/// When finalizing, the named login user is queued for import unless this
/// run's registration created it or the server imported it on an earlier
/// run. An existing login user keeps its secret.
pub async fn apply(
    decision: InstallationDecision,
    server: &dyn ServerControlClient,
    imports: &ImportDirectory,
    admin_user: &str,
    admin_secret: &str,
    login_user_created: bool,
) -> Result<InstallationDecision, ProvisionError> {
    if decision.is_finalize() {
        if login_user_created {
            info!("Login user {} already registered", admin_user);
        } else if login_user_imported(imports, admin_user).await? {
            info!("Login user {} imported on an earlier run, keeping its secret", admin_user);
        } else {
            info!("Creating login user {}", admin_user);
            let records = [ImportRecord::User(AdminCredential::superuser(
                admin_user,
                admin_secret,
            ))];
            imports.write(LOGIN_USER_FILE, &records).await?;
        }
    } else {
        info!("Resetting installation");
        server.execute(RESET_INSTALLATION).await?;
    }
    Ok(decision)
}

async fn login_user_imported(
    imports: &ImportDirectory,
    admin_user: &str,
) -> Result<bool, ProvisionError> {
    for file in [ACCOUNT_DATA_FILE, LOGIN_USER_FILE] {
        if imports.imported_users(file).await?.iter().any(|u| u == admin_user) {
            return Ok(true);
        }
    }
    Ok(false)
}
