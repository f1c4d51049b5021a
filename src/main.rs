//! cyclecloud-provision - first-boot setup of a CycleCloud server on Azure
//!
//! Starts the server, binds it to the subscription the VM runs in and
//! leaves it ready to use without a trip through the setup UI.

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber, filter::LevelFilter};

use cyclecloud_provision::config::{self, ProvisionConfig, StepPolicy};
use cyclecloud_provision::metadata::azure::AzureImds;
use cyclecloud_provision::metadata::{RetryPolicy, fetch_metadata};
use cyclecloud_provision::secret::generate_secret;
use cyclecloud_provision::server::{CycleServerControl, ServerControlClient};
use cyclecloud_provision::Pipeline;

#[derive(Parser)]
#[command(name = "cyclecloud-provision")]
#[command(author, version, about = "Provision a CycleCloud server on an Azure VM", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    provision: ProvisionArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch instance metadata and print it as JSON
    Metadata,
    /// Print a freshly generated admin secret
    Secret,
    /// Show the server status
    Status,
}

/// Provisioning inputs, usually passed by the deployment template
#[derive(Args)]
struct ProvisionArgs {
    /// Tenant ID of the Azure subscription
    #[arg(long, visible_alias = "tenantId")]
    tenant_id: Option<String>,

    /// Application ID of the service principal
    #[arg(long, visible_alias = "applicationId")]
    application_id: Option<String>,

    /// Application secret of the service principal
    #[arg(long, visible_alias = "applicationSecret", env = "CYCLECLOUD_APPLICATION_SECRET", hide_env_values = true)]
    application_secret: Option<String>,

    /// The local admin user of the VM
    #[arg(long, visible_alias = "username")]
    admin_user: Option<String>,

    /// Public hostname of this VM, used for Let's Encrypt
    #[arg(long)]
    hostname: Option<String>,

    /// Accept CycleCloud terms and do a silent install
    #[arg(long, visible_alias = "acceptTerms")]
    accept_terms: bool,

    /// Password for the CycleCloud UI user
    #[arg(long, env = "CYCLECLOUD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Storage account to use as the locker instead of a generated one
    #[arg(long, visible_alias = "storageAccount")]
    storage_account: Option<String>,

    /// Azure environment [china|germany|public|usgov]
    #[arg(long, visible_alias = "azureSovereignCloud")]
    azure_sovereign_cloud: Option<String>,

    /// Download URL the server was installed from
    #[arg(long, visible_alias = "downloadURL")]
    download_url: Option<String>,

    /// CycleCloud version installed
    #[arg(long, visible_alias = "cyclecloudVersion")]
    cyclecloud_version: Option<String>,

    /// Restart the server instead of starting it
    #[arg(long)]
    restart: bool,

    /// Abort the run when account registration fails
    #[arg(long)]
    strict_registration: bool,

    /// Write a JSON report of the run
    #[arg(long)]
    report: Option<PathBuf>,
}

impl ProvisionArgs {
    /// Layer command line values over the file configuration
    fn apply(self, config: &mut ProvisionConfig) {
        if let Some(v) = self.tenant_id {
            config.tenant_id = v;
        }
        if let Some(v) = self.application_id {
            config.application_id = v;
        }
        if let Some(v) = self.application_secret {
            config.application_secret = v;
        }
        if let Some(v) = self.admin_user {
            config.admin_user = v;
        }
        if self.hostname.is_some() {
            config.hostname = self.hostname;
        }
        config.accept_terms |= self.accept_terms;
        if self.password.is_some() {
            config.password = self.password;
        }
        if self.storage_account.is_some() {
            config.storage_account = self.storage_account;
        }
        if let Some(v) = self.azure_sovereign_cloud {
            config.azure_cloud = v;
        }
        if self.download_url.is_some() {
            config.download_url = self.download_url;
        }
        if self.cyclecloud_version.is_some() {
            config.version = self.cyclecloud_version;
        }
        config.restart |= self.restart;
        if self.strict_registration {
            config.policies.registration = StepPolicy::Fatal;
        }
    }
}

fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = config::load_config(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Metadata) => {
            let source = AzureImds::new(config.timings.metadata_timeout())?;
            let policy = RetryPolicy::from_timings(&config.timings);
            match fetch_metadata(&source, &policy).await {
                Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
                None => bail!("instance metadata unavailable"),
            }
        }
        Some(Commands::Secret) => {
            println!("{}", generate_secret(None));
        }
        Some(Commands::Status) => {
            let server = CycleServerControl::new(config.paths.control_binary());
            print!("{}", server.status().await?);
        }
        None => {
            let report_path = cli.provision.report.clone();
            cli.provision.apply(&mut config);
            info!("Provisioning with {:?}", config);
            if let Some(version) = &config.version {
                info!("CycleCloud version {}", version);
            }

            let pipeline = Pipeline::from_config(config)?;
            let report = pipeline.run().await.context("Provisioning failed")?;

            if let Some(path) = report_path {
                report
                    .write(&path)
                    .await
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                info!("Wrote report to {}", path.display());
            }
        }
    }

    Ok(())
}
