//! # Azure Cloud Configuration
//!
//! Resolves which Azure cloud (public, US government, China) a bucket lives in.
//!
//! An explicit [`CloudConfiguration`] always wins. Without one the cloud is
//! inferred from the region name, using the same prefixes Azure uses for its
//! sovereign regions. The resolved cloud decides the Resource Manager endpoint,
//! the blob storage domain and the environment variable name downstream
//! tooling expects.

use crate::crd::CloudConfiguration;
use thiserror::Error;

pub const AZURE_PUBLIC_CLOUD_NAME: &str = "AzurePublic";
pub const AZURE_GOV_CLOUD_NAME: &str = "AzureGovernment";
pub const AZURE_CHINA_CLOUD_NAME: &str = "AzureChina";

/// Region prefixes of the US government cloud
pub const AZURE_GOV_REGION_PREFIXES: &[&str] = &["usgov", "usdod"];
/// Region prefixes of the China cloud
pub const AZURE_CHINA_REGION_PREFIXES: &[&str] = &["china"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudConfigError {
    #[error("either cloud configuration or region must be set to determine the Azure cloud")]
    ConfigurationAmbiguous,
    #[error("unknown cloud configuration name '{0}'")]
    UnknownRealm(String),
}

/// One of the well known Azure cloud instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudRealm {
    Public,
    Government,
    China,
}

impl CloudRealm {
    /// Resolve the realm for a bucket, preferring the explicit configuration
    pub fn resolve(
        cloud_configuration: Option<&CloudConfiguration>,
        region: Option<&str>,
    ) -> Result<Self, CloudConfigError> {
        let resolved = self::cloud_configuration(cloud_configuration, region)?;
        Self::from_configuration(Some(&resolved))
    }

    /// Map a configuration name onto a realm; `None` means the public cloud
    pub fn from_configuration(
        cloud_configuration: Option<&CloudConfiguration>,
    ) -> Result<Self, CloudConfigError> {
        let Some(config) = cloud_configuration else {
            return Ok(Self::Public);
        };
        let name = config.name.as_str();
        if name.eq_ignore_ascii_case(AZURE_PUBLIC_CLOUD_NAME) {
            Ok(Self::Public)
        } else if name.eq_ignore_ascii_case(AZURE_GOV_CLOUD_NAME) {
            Ok(Self::Government)
        } else if name.eq_ignore_ascii_case(AZURE_CHINA_CLOUD_NAME) {
            Ok(Self::China)
        } else {
            Err(CloudConfigError::UnknownRealm(config.name.clone()))
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Public => AZURE_PUBLIC_CLOUD_NAME,
            Self::Government => AZURE_GOV_CLOUD_NAME,
            Self::China => AZURE_CHINA_CLOUD_NAME,
        }
    }

    /// Environment variable name used by infrastructure tooling for this cloud
    #[must_use]
    pub fn env_var_name(self) -> &'static str {
        match self {
            Self::Public => "AZUREPUBLICCLOUD",
            Self::Government => "AZUREUSGOVERNMENT",
            Self::China => "AZURECHINACLOUD",
        }
    }

    #[must_use]
    pub fn resource_manager_endpoint(self) -> &'static str {
        match self {
            Self::Public => "https://management.azure.com",
            Self::Government => "https://management.usgovcloudapi.net",
            Self::China => "https://management.chinacloudapi.cn",
        }
    }

    /// Blob service domain, published in the generated secret
    #[must_use]
    pub fn storage_domain(self) -> &'static str {
        match self {
            Self::Public => "blob.core.windows.net",
            Self::Government => "blob.core.usgovcloudapi.net",
            Self::China => "blob.core.chinacloudapi.cn",
        }
    }
}

impl std::fmt::Display for CloudRealm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unify the explicit configuration and the region into a single configuration
///
/// The explicit configuration is returned unchanged when present, even if its
/// name is not a known cloud.
pub fn cloud_configuration(
    cloud_configuration: Option<&CloudConfiguration>,
    region: Option<&str>,
) -> Result<CloudConfiguration, CloudConfigError> {
    match (cloud_configuration, region) {
        (Some(config), _) => Ok(config.clone()),
        (None, Some(region)) => Ok(cloud_configuration_from_region(region)),
        (None, None) => Err(CloudConfigError::ConfigurationAmbiguous),
    }
}

/// Infer the cloud from a region name; anything unrecognised is the public cloud
#[must_use]
pub fn cloud_configuration_from_region(region: &str) -> CloudConfiguration {
    let name = if has_any_prefix(region, AZURE_GOV_REGION_PREFIXES) {
        AZURE_GOV_CLOUD_NAME
    } else if has_any_prefix(region, AZURE_CHINA_REGION_PREFIXES) {
        AZURE_CHINA_CLOUD_NAME
    } else {
        AZURE_PUBLIC_CLOUD_NAME
    };
    CloudConfiguration::new(name)
}

/// Environment variable name for the cloud, preferring the explicit configuration
pub fn cloud_env_var_name(
    cloud_configuration: Option<&CloudConfiguration>,
    region: Option<&str>,
) -> Result<&'static str, CloudConfigError> {
    let resolved = self::cloud_configuration(cloud_configuration, region)?;
    cloud_env_var_name_from_configuration(Some(&resolved))
}

/// Environment variable name for a configuration; `None` defaults to the public cloud
pub fn cloud_env_var_name_from_configuration(
    cloud_configuration: Option<&CloudConfiguration>,
) -> Result<&'static str, CloudConfigError> {
    CloudRealm::from_configuration(cloud_configuration).map(CloudRealm::env_var_name)
}

fn has_any_prefix(s: &str, prefixes: &[&str]) -> bool {
    let lower = s.to_lowercase();
    prefixes
        .iter()
        .any(|prefix| lower.starts_with(&prefix.to_lowercase()))
}
