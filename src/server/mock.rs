//! In-process fake of the application server for testing
//!
//! [`MockCycleServer`] implements both server interfaces over shared state,
//! records every call, and can consume the import directory the way the
//! real server's poller does.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::import::{IMPORTED_SUFFIX, ImportDirectory};
use super::{CommandLineClient, RELAX_DATASTORE_PERMISSIONS, RESET_INSTALLATION, ServerControlClient};
use crate::ProvisionError;
use crate::records::{
    AdminCredential, INSTALLATION_COMPLETE, INSTALLATION_INITIAL_USER, ImportRecord,
    PublicKeyCredential,
};

/// Observable state of the fake server
#[derive(Debug, Clone)]
pub struct MockServerState {
    /// Every client call, in order
    pub calls: Vec<String>,
    /// Statements passed to `execute`
    pub statements: Vec<String>,
    pub running: bool,
    pub installation_complete: bool,
    pub datastore_permission_check: bool,
    pub initial_user: Option<String>,
    pub users: Vec<AdminCredential>,
    pub credentials: Vec<PublicKeyCredential>,
    /// Username and secret the CLI was initialized with
    pub cli_login: Option<(String, String)>,
    /// Account descriptors as read at `account create` time
    pub accounts: Vec<serde_json::Value>,
}

impl Default for MockServerState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            statements: Vec::new(),
            running: false,
            installation_complete: false,
            datastore_permission_check: true,
            initial_user: None,
            users: Vec::new(),
            credentials: Vec::new(),
            cli_login: None,
            accounts: Vec::new(),
        }
    }
}

impl MockServerState {
    /// Find an imported user by name
    pub fn user(&self, username: &str) -> Option<&AdminCredential> {
        self.users.iter().find(|u| u.username == username)
    }
}

#[derive(Debug, Default, Clone)]
struct Failures {
    start: bool,
    keystore: bool,
    keystore_hangs: bool,
    initialize: bool,
    create_account: bool,
}

/// Fake application server
///
/// # Example
/// ```
/// use cyclecloud_provision::server::mock::MockCycleServer;
///
/// let server = MockCycleServer::new()
///     .with_auto_import("/tmp/cycle_server/config/data")
///     .failing_keystore();
/// ```
#[derive(Clone, Default)]
pub struct MockCycleServer {
    state: Arc<Mutex<MockServerState>>,
    failures: Failures,
    auto_import: Option<PathBuf>,
}

impl MockCycleServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the import directory when the CLI is initialized, as the real
    /// poller would have during the settle delay
    pub fn with_auto_import(mut self, dir: impl Into<PathBuf>) -> Self {
        self.auto_import = Some(dir.into());
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.failures.start = true;
        self
    }

    pub fn failing_keystore(mut self) -> Self {
        self.failures.keystore = true;
        self
    }

    /// Never answer the certificate request
    pub fn hanging_keystore(mut self) -> Self {
        self.failures.keystore_hangs = true;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.failures.initialize = true;
        self
    }

    pub fn failing_create_account(mut self) -> Self {
        self.failures.create_account = true;
        self
    }

    /// Snapshot of the server state
    pub async fn state(&self) -> MockServerState {
        self.state.lock().await.clone()
    }

    /// Ingest every pending file in `dir` and leave `.imported` markers
    pub async fn consume_imports(&self, dir: &Path) -> Result<usize, ProvisionError> {
        let pending = ImportDirectory::new(dir).pending().await?;
        let mut state = self.state.lock().await;

        for path in &pending {
            let content = tokio::fs::read_to_string(path).await?;
            for record in parse_records(&content)? {
                apply_record(&mut state, record);
            }
            let mut marker = path.clone().into_os_string();
            marker.push(IMPORTED_SUFFIX);
            tokio::fs::rename(path, PathBuf::from(marker)).await?;
        }

        Ok(pending.len())
    }

    async fn record_call(&self, call: String) {
        self.state.lock().await.calls.push(call);
    }
}

fn parse_records(content: &str) -> Result<Vec<ImportRecord>, ProvisionError> {
    match serde_json::from_str::<Vec<ImportRecord>>(content) {
        Ok(records) => Ok(records),
        Err(_) => Ok(vec![serde_json::from_str::<ImportRecord>(content)?]),
    }
}

fn apply_record(state: &mut MockServerState, record: ImportRecord) {
    match record {
        ImportRecord::User(user) => {
            state.users.retain(|u| u.username != user.username);
            state.users.push(user);
        }
        ImportRecord::Setting(setting) if setting.name == INSTALLATION_COMPLETE => {
            state.installation_complete = setting.value.as_bool().unwrap_or(false);
        }
        ImportRecord::Setting(setting) if setting.name == INSTALLATION_INITIAL_USER => {
            state.initial_user = setting.value.as_str().map(str::to_string);
        }
        ImportRecord::Setting(_) => {}
        ImportRecord::Credential(credential) => state.credentials.push(credential),
    }
}

fn simulated_failure(command: &str) -> ProvisionError {
    ProvisionError::command(command, 1, "simulated failure")
}

#[async_trait]
impl ServerControlClient for MockCycleServer {
    async fn start(&self) -> Result<(), ProvisionError> {
        self.record_call("start".to_string()).await;
        if self.failures.start {
            return Err(simulated_failure("cycle_server start"));
        }
        self.state.lock().await.running = true;
        Ok(())
    }

    async fn restart(&self) -> Result<(), ProvisionError> {
        self.record_call("restart".to_string()).await;
        if self.failures.start {
            return Err(simulated_failure("cycle_server restart"));
        }
        self.state.lock().await.running = true;
        Ok(())
    }

    async fn await_startup(&self) -> Result<(), ProvisionError> {
        self.record_call("await_startup".to_string()).await;
        Ok(())
    }

    async fn status(&self) -> Result<String, ProvisionError> {
        self.record_call("status".to_string()).await;
        let running = self.state.lock().await.running;
        Ok(if running { "running" } else { "stopped" }.to_string())
    }

    async fn keystore_automatic(&self, fqdn: &str) -> Result<(), ProvisionError> {
        self.record_call(format!("keystore automatic {}", fqdn)).await;
        if self.failures.keystore_hangs {
            std::future::pending::<()>().await;
        }
        if self.failures.keystore {
            return Err(simulated_failure("cycle_server keystore automatic"));
        }
        Ok(())
    }

    async fn execute(&self, statement: &str) -> Result<(), ProvisionError> {
        self.record_call("execute".to_string()).await;
        let mut state = self.state.lock().await;
        state.statements.push(statement.to_string());
        if statement == RESET_INSTALLATION {
            state.installation_complete = false;
        } else if statement == RELAX_DATASTORE_PERMISSIONS {
            state.datastore_permission_check = false;
        }
        Ok(())
    }
}

#[async_trait]
impl CommandLineClient for MockCycleServer {
    async fn initialize(
        &self,
        url: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), ProvisionError> {
        self.record_call(format!("initialize {}", url)).await;
        if let Some(dir) = &self.auto_import {
            self.consume_imports(dir).await?;
        }
        if self.failures.initialize {
            return Err(simulated_failure("cyclecloud initialize"));
        }
        self.state.lock().await.cli_login = Some((username.to_string(), secret.to_string()));
        Ok(())
    }

    async fn create_account(&self, descriptor: &Path) -> Result<(), ProvisionError> {
        self.record_call("account create".to_string()).await;
        if self.failures.create_account {
            return Err(simulated_failure("cyclecloud account create"));
        }
        let content = tokio::fs::read_to_string(descriptor).await?;
        let account: serde_json::Value = serde_json::from_str(&content)?;
        self.state.lock().await.accounts.push(account);
        Ok(())
    }
}
