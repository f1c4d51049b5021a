//! Provisioning pipeline
//!
//! Steps run strictly in order, each relying on what the previous one left
//! behind:
//! 1. Start server - start the server and wait for it
//! 2. Metadata - fetch instance identity (absence skips 3 and 4)
//! 3. Certificate - best-effort ACME certificate
//! 4. Registration - Azure account and bootstrap credentials
//! 5. Credential import - admin user's SSH public key
//! 6. Installation gate - finalize or reset the setup UI

pub mod certificate;
pub mod credential;
pub mod installation;
pub mod registration;
pub mod startup;

pub use certificate::CertificateOutcome;
pub use installation::InstallationDecision;
pub use registration::{AccountRegistrar, RegistrationOutcome};

use crate::config::{ProvisionConfig, StepPolicy};
use crate::metadata::azure::AzureImds;
use crate::metadata::{MetadataSource, RetryPolicy, fetch_metadata};
use crate::server::{
    CommandLineClient, CycleCloudCli, CycleServerControl, ImportDirectory, ServerControlClient,
};
use crate::{InstanceMetadata, ProvisionError, Step, secret};
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

/// What a provisioning run achieved
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisionReport {
    pub metadata: Option<InstanceMetadata>,
    pub certificate: Option<CertificateOutcome>,
    pub registration: Option<RegistrationOutcome>,
    /// Name of the queued public key credential
    pub credential: Option<String>,
    pub installation: Option<InstallationDecision>,
    /// State left missing that an operator has to reconcile
    pub warnings: Vec<String>,
}

impl ProvisionReport {
    fn warn(&mut self, step: Step, message: impl Into<String>) {
        let message = message.into();
        warn!("{}: {}", step, message);
        self.warnings.push(format!("{}: {}", step, message));
    }

    /// Write the report as JSON
    pub async fn write(&self, path: &Path) -> Result<(), ProvisionError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }
}

/// The provisioning pipeline and the collaborators it drives
pub struct Pipeline {
    config: ProvisionConfig,
    metadata: Box<dyn MetadataSource>,
    server: Box<dyn ServerControlClient>,
    cli: Box<dyn CommandLineClient>,
}

impl Pipeline {
    pub fn new(
        config: ProvisionConfig,
        metadata: Box<dyn MetadataSource>,
        server: Box<dyn ServerControlClient>,
        cli: Box<dyn CommandLineClient>,
    ) -> Self {
        Self {
            config,
            metadata,
            server,
            cli,
        }
    }

    /// Pipeline against the real metadata service, control binary and CLI
    pub fn from_config(config: ProvisionConfig) -> Result<Self, ProvisionError> {
        let metadata = AzureImds::new(config.timings.metadata_timeout())?;
        let server = CycleServerControl::new(config.paths.control_binary());
        let cli = CycleCloudCli::new(&config.paths.cli);
        Ok(Self::new(
            config,
            Box::new(metadata),
            Box::new(server),
            Box::new(cli),
        ))
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Run every step
    ///
    /// A fatal step aborts the run with an error; degraded steps are listed in
    /// the report's warnings. The run workspace is removed on every exit path.
    pub async fn run(&self) -> Result<ProvisionReport, ProvisionError> {
        self.config.validate()?;

        let workspace = tempfile::Builder::new()
            .prefix("cyclecloud-provision-")
            .tempdir()?;
        info!("Created workspace {}", workspace.path().display());

        self.run_steps(workspace.path()).await
    }

    async fn run_steps(&self, workspace: &Path) -> Result<ProvisionReport, ProvisionError> {
        let config = &self.config;
        let mut report = ProvisionReport::default();
        let imports = ImportDirectory::new(config.paths.import_dir());
        let admin_secret = secret::generate_secret(config.password.as_deref());

        info!("Starting step: {}", Step::StartServer);
        let started = startup::start_server(self.server.as_ref(), config.restart).await;
        self.settle(Step::StartServer, started, &mut report)?;

        info!("Starting step: {}", Step::Metadata);
        let policy = RetryPolicy::from_timings(&config.timings);
        let metadata = fetch_metadata(self.metadata.as_ref(), &policy).await;
        if metadata.is_none() {
            match config.policies.for_step(Step::Metadata) {
                StepPolicy::Fatal => {
                    return Err(ProvisionError::step(
                        Step::Metadata.to_string(),
                        "instance metadata unavailable",
                    ));
                }
                StepPolicy::DegradeAndContinue => report.warn(
                    Step::Metadata,
                    "Failed to get VM metadata, skipping certificate and Azure account registration. Please perform these steps manually.",
                ),
            }
        }
        report.metadata = metadata.clone();

        if let Some(metadata) = &metadata {
            info!("Starting step: {}", Step::Certificate);
            let certificate = match config.hostname.as_deref() {
                Some(hostname) => {
                    certificate::provision_certificate(
                        self.server.as_ref(),
                        hostname,
                        &metadata.location,
                        config.timings.startup_warmup(),
                        config.timings.certificate_timeout(),
                    )
                    .await
                }
                None => CertificateOutcome::Skipped {
                    reason: "no public hostname configured".to_string(),
                },
            };
            if let CertificateOutcome::SelfSigned { reason } = &certificate {
                report.warn(Step::Certificate, format!("using self-signed certificate: {}", reason));
            }
            report.certificate = Some(certificate);

            info!("Starting step: {}", Step::Registration);
            let registrar = AccountRegistrar::new(
                self.server.as_ref(),
                self.cli.as_ref(),
                &imports,
                config,
                workspace,
            );
            let registration = registrar
                .register(metadata, &admin_secret)
                .await
                .map_err(|e| ProvisionError::step(Step::Registration.to_string(), e.to_string()))?;
            if let RegistrationOutcome::Failed { reason } = &registration {
                report.warn(Step::Registration, format!("no Azure account registered: {}", reason));
            }
            report.registration = Some(registration);
        }

        info!("Starting step: {}", Step::CredentialImport);
        let credential =
            credential::import_public_key_credential(&imports, &config.paths, &config.admin_user)
                .await;
        report.credential = self
            .settle(Step::CredentialImport, credential, &mut report)?
            .map(|c| c.name);

        info!("Starting step: {}", Step::InstallationGate);
        let decision = installation::decide(config.accept_terms, config.password_supplied());
        let login_user_created = matches!(
            report.registration,
            Some(RegistrationOutcome::Registered {
                login_user_created: true,
                ..
            })
        );
        let applied = installation::apply(
            decision,
            self.server.as_ref(),
            &imports,
            &config.admin_user,
            &admin_secret,
            login_user_created,
        )
        .await;
        report.installation = self.settle(Step::InstallationGate, applied, &mut report)?;

        info!(
            "Provisioning finished with {} warning(s)",
            report.warnings.len()
        );
        Ok(report)
    }

    /// Apply the step's declared policy to its result
    fn settle<T>(
        &self,
        step: Step,
        result: Result<T, ProvisionError>,
        report: &mut ProvisionReport,
    ) -> Result<Option<T>, ProvisionError> {
        match result {
            Ok(value) => {
                info!("Completed step: {}", step);
                Ok(Some(value))
            }
            Err(e) => match self.config.policies.for_step(step) {
                StepPolicy::Fatal => Err(ProvisionError::step(step.to_string(), e.to_string())),
                StepPolicy::DegradeAndContinue => {
                    report.warn(step, e.to_string());
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serialization() {
        let report = ProvisionReport {
            certificate: Some(CertificateOutcome::SelfSigned {
                reason: "timeout".to_string(),
            }),
            registration: Some(RegistrationOutcome::AlreadyRegistered),
            installation: Some(InstallationDecision::ResetInstallation),
            ..Default::default()
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["certificate"]["outcome"], "self-signed");
        assert_eq!(value["registration"]["outcome"], "already-registered");
        assert_eq!(value["installation"], "reset-installation");
        assert!(value["metadata"].is_null());
    }

    #[tokio::test]
    async fn test_write_report() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("reports/run.json");
        ProvisionReport::default().write(&path).await.unwrap();
        assert!(path.exists());
    }
}
