//! Cloud vendor and account identity

use super::Feature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cloud vendor hosting an onboarded account
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudVendor {
    Aws,
    Azure,
    Gcp,
}

impl CloudVendor {
    pub const ALL: [CloudVendor; 3] = [CloudVendor::Aws, CloudVendor::Azure, CloudVendor::Gcp];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloudVendor::Aws => "aws",
            CloudVendor::Azure => "azure",
            CloudVendor::Gcp => "gcp",
        }
    }
}

impl fmt::Display for CloudVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(CloudVendor::Aws),
            "azure" => Ok(CloudVendor::Azure),
            "gcp" | "google" => Ok(CloudVendor::Gcp),
            other => Err(format!("unknown cloud vendor: {}", other)),
        }
    }
}

/// Cloud account as last seen by the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAccount {
    pub cloud: CloudVendor,

    /// AWS account id, Azure subscription id or GCP project id
    pub native_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Features currently enabled on the account
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl CloudAccount {
    pub fn new(cloud: CloudVendor, native_id: impl Into<String>) -> Self {
        Self {
            cloud,
            native_id: native_id.into(),
            name: None,
            features: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    /// Stable identifier used in reports and the operation ledger (`aws:123456789012`)
    pub fn account_id(&self) -> String {
        format!("{}:{}", self.cloud, self.native_id)
    }
}
