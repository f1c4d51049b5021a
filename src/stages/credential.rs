//! SSH public key credential import

use crate::config::ServerPaths;
use crate::records::{ImportRecord, PublicKeyCredential};
use crate::server::ImportDirectory;
use crate::server::import::CREDENTIAL_FILE;
use crate::ProvisionError;
use tokio::fs;
use tracing::{debug, info};

/// Register `username`'s authorized keys as the credential `<username>/public`
///
/// The key file is passed through verbatim. Nothing prevents a second run
/// from queuing the same credential again.
pub async fn import_public_key_credential(
    imports: &ImportDirectory,
    paths: &ServerPaths,
    username: &str,
) -> Result<PublicKeyCredential, ProvisionError> {
    let key_file = paths.authorized_keys(username);
    debug!("Reading public key from {}", key_file.display());

    let public_key = fs::read_to_string(&key_file).await?;
    let credential = PublicKeyCredential::for_user(username, public_key);

    if imports.is_imported(CREDENTIAL_FILE).await? {
        debug!("{} was imported before, queuing it again", CREDENTIAL_FILE);
    }

    imports
        .write(CREDENTIAL_FILE, &ImportRecord::Credential(credential.clone()))
        .await?;

    info!("Queued credential {}", credential.name);
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(temp: &TempDir, key: &str) -> ServerPaths {
        let mut paths = ServerPaths::with_root(temp.path().join("cycle_server"));
        paths.home_root = temp.path().join("home");
        let ssh_dir = temp.path().join("home/alice/.ssh");
        std::fs::create_dir_all(&ssh_dir).unwrap();
        std::fs::write(ssh_dir.join("authorized_keys"), key).unwrap();
        paths
    }

    #[tokio::test]
    async fn test_import_public_key() {
        let temp = TempDir::new().unwrap();
        let paths = setup(&temp, "ssh-rsa AAAA... user@host");
        let imports = ImportDirectory::new(paths.import_dir());

        let credential = import_public_key_credential(&imports, &paths, "alice")
            .await
            .unwrap();

        assert_eq!(credential.name, "alice/public");
        assert_eq!(credential.public_key, "ssh-rsa AAAA... user@host");

        let written = std::fs::read_to_string(imports.record_path(CREDENTIAL_FILE)).unwrap();
        let record: ImportRecord = serde_json::from_str(&written).unwrap();
        assert_eq!(record, ImportRecord::Credential(credential));
    }

    #[tokio::test]
    async fn test_key_file_kept_verbatim() {
        let temp = TempDir::new().unwrap();
        let keys = "ssh-ed25519 AAAAC3 alice@laptop\nssh-rsa AAAAB3 alice@desktop\n";
        let paths = setup(&temp, keys);
        let imports = ImportDirectory::new(paths.import_dir());

        let credential = import_public_key_credential(&imports, &paths, "alice")
            .await
            .unwrap();
        assert_eq!(credential.public_key, keys);
    }

    #[tokio::test]
    async fn test_missing_key_file() {
        let temp = TempDir::new().unwrap();
        let mut paths = ServerPaths::with_root(temp.path());
        paths.home_root = temp.path().join("home");
        let imports = ImportDirectory::new(paths.import_dir());

        let err = import_public_key_credential(&imports, &paths, "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Io(_)));
    }
}
