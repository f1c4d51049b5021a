//! Storage CLI profile (`~/.cycle/pogo.ini`)
//!
//! Lets `cyclecloud project upload` reach the storage locker with the same
//! service principal the account was registered with.

use crate::ProvisionError;
use crate::records::AccountDescriptor;
use minijinja::{Environment, context};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const POGO_TEMPLATE: &str = "\
[pogo azure-storage]
type = az
subscription_id = {{ subscription_id }}
tenant_id = {{ tenant_id }}
application_id = {{ application_id }}
application_secret = {{ application_secret }}
matches = az://{{ storage_account }}/{{ storage_container }}
";

/// Render the `[pogo azure-storage]` section for an account
pub fn render_pogo_config(account: &AccountDescriptor) -> Result<String, ProvisionError> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template("pogo.ini", POGO_TEMPLATE)?;

    let rendered = env.get_template("pogo.ini")?.render(context! {
        subscription_id => account.subscription_id,
        tenant_id => account.tenant_id,
        application_id => account.application_id,
        application_secret => account.application_secret,
        storage_account => account.storage_account,
        storage_container => account.storage_container,
    })?;

    Ok(rendered)
}

/// Write `pogo.ini` into `<home>/.cycle`, creating the directory with mode 0700
pub async fn write_pogo_config(home: &Path, contents: &str) -> Result<PathBuf, ProvisionError> {
    let cycle_dir = home.join(".cycle");
    if !cycle_dir.exists() {
        debug!("Creating {}", cycle_dir.display());
        fs::create_dir_all(&cycle_dir).await?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&cycle_dir, std::fs::Permissions::from_mode(0o700)).await?;
    }

    let path = cycle_dir.join("pogo.ini");
    fs::write(&path, contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    info!("Wrote storage profile {}", path.display());
    Ok(path)
}

/// Hand `<home>/.cycle` over to `username`
///
/// Failures are logged and tolerated; the profile is still usable by root.
pub async fn change_ownership(home: &Path, username: &str) {
    let cycle_dir = home.join(".cycle");
    let output = tokio::process::Command::new("chown")
        .args(["-R", username])
        .arg(&cycle_dir)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            debug!("Changed ownership of {} to {}", cycle_dir.display(), username);
        }
        Ok(output) => warn!(
            "Failed to change ownership of {}: {}",
            cycle_dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => warn!("Failed to run chown on {}: {}", cycle_dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstanceMetadata;
    use crate::records::AccountInputs;
    use tempfile::TempDir;

    fn account() -> AccountDescriptor {
        let metadata = InstanceMetadata {
            subscription_id: "sub1".to_string(),
            location: "eastus".to_string(),
            resource_group_name: "rg1".to_string(),
        };
        let inputs = AccountInputs {
            tenant_id: "tenant1",
            application_id: "app1",
            application_secret: "secret1",
            azure_cloud: "public",
        };
        AccountDescriptor::new(&metadata, &inputs, "cyclecloudabcdefghijklmn")
    }

    #[test]
    fn test_render_pogo_config() {
        let rendered = render_pogo_config(&account()).unwrap();
        assert_eq!(
            rendered,
            "[pogo azure-storage]\n\
             type = az\n\
             subscription_id = sub1\n\
             tenant_id = tenant1\n\
             application_id = app1\n\
             application_secret = secret1\n\
             matches = az://cyclecloudabcdefghijklmn/cyclecloud\n"
        );
    }

    #[tokio::test]
    async fn test_write_pogo_config() {
        let temp = TempDir::new().unwrap();
        let path = write_pogo_config(temp.path(), "[pogo azure-storage]\n")
            .await
            .unwrap();

        assert_eq!(path, temp.path().join(".cycle/pogo.ini"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[pogo azure-storage]\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(temp.path().join(".cycle"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
