//! The server's import directory
//!
//! The server polls this directory and ingests every `*.json` file it finds.
//! A consumed file is renamed to `<file>.imported`; that marker is the only
//! acknowledgment the server gives.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::ProvisionError;
use crate::records::ImportRecord;

/// Suffix the server appends to consumed import files
pub const IMPORTED_SUFFIX: &str = ".imported";

/// Bootstrap users and installation settings
pub const ACCOUNT_DATA_FILE: &str = "account_data.json";

/// Named login user created by the installation gate
pub const LOGIN_USER_FILE: &str = "login_user_data.json";

/// Admin user's SSH public key
pub const CREDENTIAL_FILE: &str = "credential.json";

/// Server import directory
#[derive(Debug, Clone)]
pub struct ImportDirectory {
    dir: PathBuf,
}

impl ImportDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of an import file
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Path of the marker left once `name` has been consumed
    pub fn marker_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, IMPORTED_SUFFIX))
    }

    /// Whether the server has already consumed `name`
    pub async fn is_imported(&self, name: &str) -> Result<bool, ProvisionError> {
        Ok(fs::try_exists(self.marker_path(name)).await?)
    }

    /// Users the server ingested from `name`; empty until it is imported
    ///
    /// Reads the consumed copy left behind as the marker, which holds either
    /// a record list or a single record.
    pub async fn imported_users(&self, name: &str) -> Result<Vec<String>, ProvisionError> {
        let marker = self.marker_path(name);
        if !fs::try_exists(&marker).await? {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&marker).await?;
        let records = match serde_json::from_str::<Vec<ImportRecord>>(&content) {
            Ok(records) => records,
            Err(_) => vec![serde_json::from_str::<ImportRecord>(&content)?],
        };

        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                ImportRecord::User(user) => Some(user.username),
                _ => None,
            })
            .collect())
    }

    /// Serialize `records` as JSON into `name`
    ///
    /// The file appears under its final name only once fully written, so the
    /// poller never reads a partial document.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        name: &str,
        records: &T,
    ) -> Result<PathBuf, ProvisionError> {
        fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(records)?;
        let staging = self.dir.join(format!(".{}.partial", name));
        let target = self.record_path(name);

        fs::write(&staging, &json).await?;
        fs::rename(&staging, &target).await?;

        info!("Queued {} for import", target.display());
        Ok(target)
    }

    /// Import files not yet consumed by the server
    pub async fn pending(&self) -> Result<Vec<PathBuf>, ProvisionError> {
        if !fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut pending = Vec::new();
        let mut read_dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                pending.push(path);
            }
        }
        pending.sort();

        debug!("{} pending import files", pending.len());
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::bootstrap_records;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_directory() {
        let temp = TempDir::new().unwrap();
        let imports = ImportDirectory::new(temp.path().join("config/data"));

        let path = imports
            .write(ACCOUNT_DATA_FILE, &bootstrap_records("pw", "alice", true))
            .await
            .unwrap();

        assert_eq!(path, temp.path().join("config/data/account_data.json"));
        let written: Vec<ImportRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 4);
        assert!(!temp.path().join("config/data/.account_data.json.partial").exists());
    }

    #[tokio::test]
    async fn test_marker_detection() {
        let temp = TempDir::new().unwrap();
        let imports = ImportDirectory::new(temp.path());

        assert!(!imports.is_imported(ACCOUNT_DATA_FILE).await.unwrap());

        std::fs::write(temp.path().join("account_data.json.imported"), "[]").unwrap();
        assert!(imports.is_imported(ACCOUNT_DATA_FILE).await.unwrap());
        assert!(!imports.is_imported(CREDENTIAL_FILE).await.unwrap());
    }

    #[tokio::test]
    async fn test_imported_users() {
        let temp = TempDir::new().unwrap();
        let imports = ImportDirectory::new(temp.path());

        imports
            .write(ACCOUNT_DATA_FILE, &bootstrap_records("pw", "alice", true))
            .await
            .unwrap();
        // Not consumed yet
        assert!(imports.imported_users(ACCOUNT_DATA_FILE).await.unwrap().is_empty());

        std::fs::rename(
            imports.record_path(ACCOUNT_DATA_FILE),
            imports.marker_path(ACCOUNT_DATA_FILE),
        )
        .unwrap();
        assert_eq!(
            imports.imported_users(ACCOUNT_DATA_FILE).await.unwrap(),
            vec!["root", "alice"]
        );
    }

    #[tokio::test]
    async fn test_pending_ignores_markers() {
        let temp = TempDir::new().unwrap();
        let imports = ImportDirectory::new(temp.path());

        std::fs::write(temp.path().join("credential.json"), "{}").unwrap();
        std::fs::write(temp.path().join("account_data.json.imported"), "[]").unwrap();

        let pending = imports.pending().await.unwrap();
        assert_eq!(pending, vec![temp.path().join("credential.json")]);
    }

    #[tokio::test]
    async fn test_pending_missing_directory() {
        let temp = TempDir::new().unwrap();
        let imports = ImportDirectory::new(temp.path().join("absent"));
        assert!(imports.pending().await.unwrap().is_empty());
    }
}
