//! Records written for the application server
//!
//! Field names follow the server's PascalCase data format. Import records
//! carry an `AdType` tag telling the importer what kind of object to create.

use crate::InstanceMetadata;
use serde::{Deserialize, Serialize};

/// Fixed bootstrap identity used by the CLI
pub const ROOT_USER: &str = "root";

/// Setting that hides the first-boot setup UI when true
pub const INSTALLATION_COMPLETE: &str = "cycleserver.installation.complete";

/// Setting naming the first interactive user
pub const INSTALLATION_INITIAL_USER: &str = "cycleserver.installation.initial_user";

/// Blob container used inside the storage locker
pub const STORAGE_CONTAINER: &str = "cyclecloud";

/// A record the server's importer understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "AdType")]
pub enum ImportRecord {
    #[serde(rename = "AuthenticatedUser")]
    User(AdminCredential),
    #[serde(rename = "Application.Setting")]
    Setting(ApplicationSetting),
    #[serde(rename = "Credential")]
    Credential(PublicKeyCredential),
}

/// A server login
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminCredential {
    #[serde(rename = "Name")]
    pub username: String,
    #[serde(rename = "RawPassword")]
    pub secret: String,
    #[serde(rename = "Superuser")]
    pub superuser: bool,
}

impl AdminCredential {
    /// The fixed `root` superuser
    pub fn root(secret: &str) -> Self {
        Self::superuser(ROOT_USER, secret)
    }

    pub fn superuser(username: &str, secret: &str) -> Self {
        Self {
            username: username.to_string(),
            secret: secret.to_string(),
            superuser: true,
        }
    }
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("superuser", &self.superuser)
            .finish()
    }
}

/// A server application setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplicationSetting {
    pub name: String,
    pub value: serde_json::Value,
}

impl ApplicationSetting {
    pub fn new(name: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// A user's SSH public key registered as a named credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicKeyCredential {
    pub name: String,
    pub credential_type: String,
    pub public_key: String,
}

impl PublicKeyCredential {
    /// Credential named `<username>/public`
    pub fn for_user(username: &str, public_key: impl Into<String>) -> Self {
        Self {
            name: format!("{}/public", username),
            credential_type: "PublicKey".to_string(),
            public_key: public_key.into(),
        }
    }
}

/// Cloud provider account handed to `cyclecloud account create`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    #[serde(rename = "Environment")]
    pub environment: String,
    #[serde(rename = "AzureRMApplicationId")]
    pub application_id: String,
    #[serde(rename = "AzureRMApplicationSecret")]
    pub application_secret: String,
    #[serde(rename = "AzureRMSubscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "AzureRMTenantId")]
    pub tenant_id: String,
    #[serde(rename = "AzureResourceGroup")]
    pub resource_group: String,
    #[serde(rename = "DefaultAccount")]
    pub default_account: bool,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Provider")]
    pub provider: String,
    #[serde(rename = "ProviderId")]
    pub provider_id: String,
    #[serde(rename = "RMStorageAccount")]
    pub storage_account: String,
    #[serde(rename = "RMStorageContainer")]
    pub storage_container: String,
}

/// Service principal and environment the account is bound to
#[derive(Clone)]
pub struct AccountInputs<'a> {
    pub tenant_id: &'a str,
    pub application_id: &'a str,
    pub application_secret: &'a str,
    pub azure_cloud: &'a str,
}

impl AccountDescriptor {
    /// Default `azure` account for the subscription the VM runs in
    pub fn new(metadata: &InstanceMetadata, inputs: &AccountInputs<'_>, storage_account: &str) -> Self {
        Self {
            environment: inputs.azure_cloud.to_string(),
            application_id: inputs.application_id.to_string(),
            application_secret: inputs.application_secret.to_string(),
            subscription_id: metadata.subscription_id.clone(),
            tenant_id: inputs.tenant_id.to_string(),
            resource_group: metadata.resource_group_name.clone(),
            default_account: true,
            location: metadata.location.clone(),
            name: "azure".to_string(),
            provider: "azure".to_string(),
            provider_id: metadata.subscription_id.clone(),
            storage_account: storage_account.to_string(),
            storage_container: STORAGE_CONTAINER.to_string(),
        }
    }
}

impl std::fmt::Debug for AccountDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountDescriptor")
            .field("environment", &self.environment)
            .field("application_id", &self.application_id)
            .field("application_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("resource_group", &self.resource_group)
            .field("location", &self.location)
            .field("storage_account", &self.storage_account)
            .finish_non_exhaustive()
    }
}

/// Bootstrap record set: root, the optional named login user, and the
/// installation settings
pub fn bootstrap_records(secret: &str, admin_user: &str, include_login_user: bool) -> Vec<ImportRecord> {
    let mut records = vec![ImportRecord::User(AdminCredential::root(secret))];
    if include_login_user {
        records.push(ImportRecord::User(AdminCredential::superuser(admin_user, secret)));
    }
    records.push(ImportRecord::Setting(ApplicationSetting::new(
        INSTALLATION_INITIAL_USER,
        admin_user,
    )));
    records.push(ImportRecord::Setting(ApplicationSetting::new(
        INSTALLATION_COMPLETE,
        true,
    )));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_record_format() {
        let record = ImportRecord::User(AdminCredential::root("s3cret"));
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "AdType": "AuthenticatedUser",
                "Name": "root",
                "RawPassword": "s3cret",
                "Superuser": true
            })
        );
    }

    #[test]
    fn test_credential_record_format() {
        let record = ImportRecord::Credential(PublicKeyCredential::for_user(
            "alice",
            "ssh-rsa AAAA... user@host",
        ));
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "AdType": "Credential",
                "Name": "alice/public",
                "CredentialType": "PublicKey",
                "PublicKey": "ssh-rsa AAAA... user@host"
            })
        );
    }

    #[test]
    fn test_account_descriptor_format() {
        let metadata = InstanceMetadata {
            subscription_id: "sub1".to_string(),
            location: "eastus".to_string(),
            resource_group_name: "rg1".to_string(),
        };
        let inputs = AccountInputs {
            tenant_id: "tenant",
            application_id: "app",
            application_secret: "app-secret",
            azure_cloud: "public",
        };
        let value = serde_json::to_value(AccountDescriptor::new(&metadata, &inputs, "cyclecloudabc")).unwrap();
        assert_eq!(value["ProviderId"], "sub1");
        assert_eq!(value["AzureRMSubscriptionId"], "sub1");
        assert_eq!(value["AzureResourceGroup"], "rg1");
        assert_eq!(value["Location"], "eastus");
        assert_eq!(value["RMStorageAccount"], "cyclecloudabc");
        assert_eq!(value["RMStorageContainer"], "cyclecloud");
        assert_eq!(value["DefaultAccount"], true);
        assert_eq!(value["Environment"], "public");
    }

    #[test]
    fn test_bootstrap_records_without_login_user() {
        let records = bootstrap_records("pw", "alice", false);
        let users: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                ImportRecord::User(u) => Some(u.username.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(users, vec!["root"]);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", AdminCredential::root("s3cret"));
        assert!(!rendered.contains("s3cret"));
    }
}
