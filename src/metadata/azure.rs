//! Azure Instance Metadata Service (IMDS) source
//!
//! <https://docs.microsoft.com/en-us/azure/virtual-machines/linux/instance-metadata-service>

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::MetadataSource;
use crate::{InstanceMetadata, ProvisionError};

/// Azure IMDS base URL (link-local address)
pub const AZURE_IMDS_URL: &str = "http://169.254.169.254/metadata";

/// API version for Azure IMDS
pub const AZURE_API_VERSION: &str = "2017-08-01";

/// Azure IMDS response structures
#[derive(Debug, Deserialize)]
struct AzureInstanceMetadata {
    compute: AzureCompute,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCompute {
    subscription_id: String,
    location: String,
    resource_group_name: String,
}

impl From<AzureInstanceMetadata> for InstanceMetadata {
    fn from(meta: AzureInstanceMetadata) -> Self {
        Self {
            subscription_id: meta.compute.subscription_id,
            location: meta.compute.location,
            resource_group_name: meta.compute.resource_group_name,
        }
    }
}

/// Azure IMDS metadata source
pub struct AzureImds {
    client: Client,
    base_url: String,
}

impl AzureImds {
    /// Create against the link-local endpoint with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, ProvisionError> {
        Self::with_base_url(AZURE_IMDS_URL, timeout)
    }

    /// Create with a custom base URL (for testing)
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn instance_url(&self) -> String {
        format!(
            "{}/instance?api-version={}",
            self.base_url, AZURE_API_VERSION
        )
    }
}

#[async_trait]
impl MetadataSource for AzureImds {
    fn name(&self) -> &'static str {
        "Azure IMDS"
    }

    async fn fetch_once(&self) -> Result<InstanceMetadata, ProvisionError> {
        let url = self.instance_url();
        debug!("Fetching Azure IMDS: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Metadata", "true")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProvisionError::Metadata(format!(
                "Failed to fetch Azure metadata: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let metadata: AzureInstanceMetadata = serde_json::from_str(&body)
            .map_err(|e| ProvisionError::Metadata(format!("Malformed metadata response: {}", e)))?;

        Ok(metadata.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_default_url() {
        let imds = AzureImds::new(Duration::from_secs(2)).unwrap();
        assert_eq!(imds.name(), "Azure IMDS");
        assert_eq!(
            imds.instance_url(),
            "http://169.254.169.254/metadata/instance?api-version=2017-08-01"
        );
    }

    #[test]
    fn test_parse_compute_section() {
        let body = r#"{
            "compute": {
                "location": "westeurope",
                "name": "cyclecloud-vm",
                "resourceGroupName": "hpc-rg",
                "subscriptionId": "0000-1111",
                "vmSize": "Standard_D4s_v3"
            },
            "network": {"interface": []}
        }"#;
        let parsed: AzureInstanceMetadata = serde_json::from_str(body).unwrap();
        let metadata = InstanceMetadata::from(parsed);
        assert_eq!(metadata.subscription_id, "0000-1111");
        assert_eq!(metadata.location, "westeurope");
        assert_eq!(metadata.resource_group_name, "hpc-rg");
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let body = r#"{"compute": {"location": "westeurope"}}"#;
        assert!(serde_json::from_str::<AzureInstanceMetadata>(body).is_err());
    }
}
