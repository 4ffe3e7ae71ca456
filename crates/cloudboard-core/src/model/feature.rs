//! Feature model
//!
//! A feature is a named capability enabled on a cloud account, scoped by
//! permission groups and regions. Feature-specific parameters are a tagged
//! variant whose allowed shape depends on the feature name.

use super::CloudVendor;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Name of a feature known to the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureName {
    CloudNativeProtection,
    Exocompute,
    CloudNativeArchival,
    CloudNativeArchivalEncryption,
    DataScanning,
    Outpost,
    CloudNativeS3Protection,
    CloudNativeBlobProtection,
    AzureSqlDbProtection,
    KubernetesProtection,
    ServersAndApps,
}

impl FeatureName {
    pub const ALL: [FeatureName; 11] = [
        FeatureName::CloudNativeProtection,
        FeatureName::Exocompute,
        FeatureName::CloudNativeArchival,
        FeatureName::CloudNativeArchivalEncryption,
        FeatureName::DataScanning,
        FeatureName::Outpost,
        FeatureName::CloudNativeS3Protection,
        FeatureName::CloudNativeBlobProtection,
        FeatureName::AzureSqlDbProtection,
        FeatureName::KubernetesProtection,
        FeatureName::ServersAndApps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::CloudNativeProtection => "CLOUD_NATIVE_PROTECTION",
            FeatureName::Exocompute => "EXOCOMPUTE",
            FeatureName::CloudNativeArchival => "CLOUD_NATIVE_ARCHIVAL",
            FeatureName::CloudNativeArchivalEncryption => "CLOUD_NATIVE_ARCHIVAL_ENCRYPTION",
            FeatureName::DataScanning => "DATA_SCANNING",
            FeatureName::Outpost => "OUTPOST",
            FeatureName::CloudNativeS3Protection => "CLOUD_NATIVE_S3_PROTECTION",
            FeatureName::CloudNativeBlobProtection => "CLOUD_NATIVE_BLOB_PROTECTION",
            FeatureName::AzureSqlDbProtection => "AZURE_SQL_DB_PROTECTION",
            FeatureName::KubernetesProtection => "KUBERNETES_PROTECTION",
            FeatureName::ServersAndApps => "SERVERS_AND_APPS",
        }
    }

    /// Whether enabling the feature on `cloud` requires attached identity
    /// artifacts (IAM roles, instance profiles).
    pub fn requires_identity_artifacts(&self, cloud: CloudVendor) -> bool {
        cloud == CloudVendor::Aws && *self != FeatureName::CloudNativeArchivalEncryption
    }
}

// Ordering follows the wire name so change-sets sort the same way regardless
// of the variant declaration order.
impl Ord for FeatureName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for FeatureName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        FeatureName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == normalized)
            .ok_or_else(|| CoreError::invalid_feature(s, "unknown feature name"))
    }
}

/// Resource group a feature's cloud-side resources are placed in (Azure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupBinding {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Feature-specific parameters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureParams {
    #[default]
    None,
    ResourceGroup(ResourceGroupBinding),
    Outpost { outpost_account_id: String },
}

impl FeatureParams {
    pub fn is_none(&self) -> bool {
        matches!(self, FeatureParams::None)
    }

    fn kind(&self) -> &'static str {
        match self {
            FeatureParams::None => "none",
            FeatureParams::ResourceGroup(_) => "resource_group",
            FeatureParams::Outpost { .. } => "outpost",
        }
    }
}

/// Desired or current state of one feature on an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: FeatureName,

    #[serde(default)]
    pub permission_groups: Vec<String>,

    #[serde(default)]
    pub regions: Vec<String>,

    #[serde(default, skip_serializing_if = "FeatureParams::is_none")]
    pub params: FeatureParams,
}

impl Feature {
    pub fn new(name: FeatureName) -> Self {
        Self {
            name,
            permission_groups: Vec::new(),
            regions: Vec::new(),
            params: FeatureParams::None,
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permission_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params(mut self, params: FeatureParams) -> Self {
        self.params = params;
        self
    }

    pub fn group_set(&self) -> BTreeSet<&str> {
        self.permission_groups.iter().map(String::as_str).collect()
    }

    pub fn region_set(&self) -> BTreeSet<&str> {
        self.regions.iter().map(String::as_str).collect()
    }

    /// Structural checks independent of the permission catalog.
    ///
    /// Duplicate permission groups are left to the catalog, which reports
    /// them as `DuplicateGroup`.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for region in &self.regions {
            if region.trim().is_empty() {
                return Err(CoreError::invalid_feature(self.name, "empty region name"));
            }
            if !seen.insert(region.as_str()) {
                return Err(CoreError::invalid_feature(
                    self.name,
                    format!("duplicate region '{}'", region),
                ));
            }
        }

        match (&self.params, self.name) {
            (FeatureParams::Outpost { outpost_account_id }, FeatureName::Outpost) => {
                if outpost_account_id.trim().is_empty() {
                    return Err(CoreError::invalid_feature(
                        self.name,
                        "outpost account id must not be empty",
                    ));
                }
            }
            (_, FeatureName::Outpost) => {
                return Err(CoreError::invalid_feature(
                    self.name,
                    format!("requires outpost parameters, got '{}'", self.params.kind()),
                ));
            }
            (FeatureParams::Outpost { .. }, _) => {
                return Err(CoreError::invalid_feature(
                    self.name,
                    "outpost parameters are only valid on OUTPOST",
                ));
            }
            (FeatureParams::ResourceGroup(rg), _) => {
                if rg.name.trim().is_empty() || rg.region.trim().is_empty() {
                    return Err(CoreError::invalid_feature(
                        self.name,
                        "resource group needs a name and a region",
                    ));
                }
            }
            (FeatureParams::None, _) => {}
        }

        Ok(())
    }

    /// Same feature state, comparing groups and regions as sets
    pub fn is_equivalent(&self, other: &Feature) -> bool {
        self.name == other.name
            && self.group_set() == other.group_set()
            && self.region_set() == other.region_set()
            && self.params == other.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_name_round_trip_through_str() {
        for name in FeatureName::ALL {
            assert_eq!(name.as_str().parse::<FeatureName>().unwrap(), name);
        }
        assert_eq!(
            "cloud-native-protection".parse::<FeatureName>().unwrap(),
            FeatureName::CloudNativeProtection
        );
        assert!("TELEPORTATION".parse::<FeatureName>().is_err());
    }

    #[test]
    fn test_feature_name_orders_by_wire_name() {
        assert!(FeatureName::Exocompute < FeatureName::Outpost);
        assert!(FeatureName::CloudNativeArchival < FeatureName::CloudNativeProtection);
        assert!(FeatureName::AzureSqlDbProtection < FeatureName::CloudNativeArchival);
    }

    #[test]
    fn test_feature_serde_shape() {
        let yaml = r#"
name: EXOCOMPUTE
permission_groups: [BASIC, RSC_MANAGED_CLUSTER]
regions: [eastus2]
params:
  kind: resource_group
  name: rg-exo
  region: eastus2
"#;
        let feature: Feature = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(feature.name, FeatureName::Exocompute);
        assert_eq!(feature.permission_groups.len(), 2);
        assert!(matches!(feature.params, FeatureParams::ResourceGroup(ref rg) if rg.name == "rg-exo"));

        let json = serde_json::to_value(Feature::new(FeatureName::Outpost)).unwrap();
        assert_eq!(json["name"], "OUTPOST");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_validate_regions() {
        let dup = Feature::new(FeatureName::CloudNativeProtection)
            .with_regions(["us-east-1", "us-east-1"]);
        assert!(matches!(dup.validate(), Err(CoreError::InvalidFeatureSpec { .. })));

        let blank = Feature::new(FeatureName::CloudNativeProtection).with_regions([" "]);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_validate_params_shape() {
        let outpost_without_params = Feature::new(FeatureName::Outpost);
        assert!(outpost_without_params.validate().is_err());

        let outpost = Feature::new(FeatureName::Outpost).with_params(FeatureParams::Outpost {
            outpost_account_id: "123456789012".into(),
        });
        assert!(outpost.validate().is_ok());

        let misplaced = Feature::new(FeatureName::Exocompute).with_params(FeatureParams::Outpost {
            outpost_account_id: "123456789012".into(),
        });
        assert!(misplaced.validate().is_err());
    }

    #[test]
    fn test_equivalence_ignores_order() {
        let a = Feature::new(FeatureName::CloudNativeProtection)
            .with_groups(["BASIC", "EXPORT_AND_RESTORE"])
            .with_regions(["us-east-2", "us-west-2"]);
        let b = Feature::new(FeatureName::CloudNativeProtection)
            .with_groups(["EXPORT_AND_RESTORE", "BASIC"])
            .with_regions(["us-west-2", "us-east-2"]);
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn test_identity_artifacts_only_on_aws() {
        assert!(FeatureName::CloudNativeProtection.requires_identity_artifacts(CloudVendor::Aws));
        assert!(!FeatureName::CloudNativeProtection.requires_identity_artifacts(CloudVendor::Azure));
        assert!(
            !FeatureName::CloudNativeArchivalEncryption.requires_identity_artifacts(CloudVendor::Aws)
        );
    }
}
