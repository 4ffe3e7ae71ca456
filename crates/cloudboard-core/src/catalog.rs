//! Permission catalog
//!
//! Maps `(cloud, feature, permission group)` to the permissions the control
//! plane needs in the customer's cloud. Tables are loaded once through a
//! [`PermissionCatalogSource`] and the resulting [`PermissionCatalog`] is an
//! immutable value handed to whoever needs to validate feature requests.

use crate::error::{CoreError, Result};
use crate::model::{CloudVendor, Feature, FeatureName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const BASELINE_GROUP: &str = "BASIC";
pub const BUILTIN_CATALOG_VERSION: &str = "2026-09";

/// Permission groups defined for one feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGroups {
    /// Group every multi-group request must include
    #[serde(default = "default_baseline")]
    pub baseline: String,

    /// Group that may be requested on its own without the baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_group: Option<String>,

    /// Group name -> permissions granted by the group
    pub groups: BTreeMap<String, Vec<String>>,
}

fn default_baseline() -> String {
    BASELINE_GROUP.to_string()
}

impl FeatureGroups {
    pub fn new(baseline: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
            default_group: None,
            groups: BTreeMap::new(),
        }
    }

    pub fn with_group(mut self, name: &str, permissions: &[&str]) -> Self {
        self.groups.insert(
            name.to_string(),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn with_default_group(mut self, name: impl Into<String>) -> Self {
        self.default_group = Some(name.into());
        self
    }

    fn default_group(&self) -> &str {
        self.default_group.as_deref().unwrap_or(&self.baseline)
    }
}

/// Versioned permission table for one cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTable {
    pub cloud: CloudVendor,
    pub version: String,
    #[serde(default)]
    pub features: BTreeMap<FeatureName, FeatureGroups>,
}

impl PermissionTable {
    pub fn new(cloud: CloudVendor, version: impl Into<String>) -> Self {
        Self {
            cloud,
            version: version.into(),
            features: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, feature: FeatureName, groups: FeatureGroups) -> Self {
        self.features.insert(feature, groups);
        self
    }

    fn check(&self) -> Result<()> {
        for (feature, groups) in &self.features {
            if !groups.groups.contains_key(&groups.baseline) {
                return Err(CoreError::CatalogLoad(format!(
                    "{} table v{}: baseline group '{}' of {} is not defined",
                    self.cloud, self.version, groups.baseline, feature
                )));
            }
            if let Some(default) = &groups.default_group {
                if !groups.groups.contains_key(default) {
                    return Err(CoreError::CatalogLoad(format!(
                        "{} table v{}: default group '{}' of {} is not defined",
                        self.cloud, self.version, default, feature
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Permissions resolved for a feature request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFragment {
    pub cloud: CloudVendor,
    pub feature: FeatureName,
    /// Table version the fragment was resolved against
    pub version: String,
    /// Resolved group names, sorted
    pub groups: Vec<String>,
    pub permissions: BTreeSet<String>,
}

/// Source of permission tables, consulted once per cloud at startup
pub trait PermissionCatalogSource {
    fn load(&self, cloud: CloudVendor) -> Result<PermissionTable>;
}

/// Resolves permission group requests against loaded tables
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    tables: BTreeMap<CloudVendor, PermissionTable>,
}

impl PermissionCatalog {
    /// Load the table of every cloud from `source`
    pub fn load(source: &dyn PermissionCatalogSource) -> Result<Self> {
        let mut tables = Vec::with_capacity(CloudVendor::ALL.len());
        for cloud in CloudVendor::ALL {
            tables.push(source.load(cloud)?);
        }
        Self::from_tables(tables)
    }

    /// Catalog of the in-source tables; their consistency is covered by tests
    pub fn builtin() -> Self {
        let tables = CloudVendor::ALL
            .iter()
            .map(|cloud| (*cloud, builtin_table(*cloud)))
            .collect();
        Self { tables }
    }

    pub fn from_tables(tables: impl IntoIterator<Item = PermissionTable>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for table in tables {
            table.check()?;
            tracing::debug!(
                "Loaded {} permission table v{} ({} features)",
                table.cloud,
                table.version,
                table.features.len()
            );
            map.insert(table.cloud, table);
        }
        Ok(Self { tables: map })
    }

    pub fn version(&self, cloud: CloudVendor) -> Option<&str> {
        self.tables.get(&cloud).map(|t| t.version.as_str())
    }

    /// Features the catalog knows for `cloud`
    pub fn features(&self, cloud: CloudVendor) -> Vec<FeatureName> {
        self.tables
            .get(&cloud)
            .map(|t| t.features.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn groups(&self, cloud: CloudVendor, feature: FeatureName) -> Option<&FeatureGroups> {
        self.tables.get(&cloud)?.features.get(&feature)
    }

    /// Resolve the permissions for `groups` of `feature` on `cloud`.
    ///
    /// An empty request resolves to the baseline group.
    pub fn resolve(
        &self,
        cloud: CloudVendor,
        feature: FeatureName,
        groups: &[String],
    ) -> Result<PermissionFragment> {
        let mut seen = BTreeSet::new();
        for group in groups {
            if !seen.insert(group.as_str()) {
                return Err(CoreError::DuplicateGroup {
                    feature,
                    group: group.clone(),
                });
            }
        }

        let table = self.tables.get(&cloud);
        let defined = table.and_then(|t| t.features.get(&feature));
        let Some(defined) = defined else {
            return Err(CoreError::UnknownPermissionGroup {
                cloud,
                feature,
                group: groups
                    .first()
                    .cloned()
                    .unwrap_or_else(|| BASELINE_GROUP.to_string()),
            });
        };

        for group in groups {
            if !defined.groups.contains_key(group) {
                return Err(CoreError::UnknownPermissionGroup {
                    cloud,
                    feature,
                    group: group.clone(),
                });
            }
        }

        let single_default = groups.len() == 1 && groups[0] == defined.default_group();
        if !groups.is_empty() && !single_default && !seen.contains(defined.baseline.as_str()) {
            return Err(CoreError::MissingBaselineGroup {
                feature,
                baseline: defined.baseline.clone(),
            });
        }

        let resolved: Vec<String> = if groups.is_empty() {
            vec![defined.baseline.clone()]
        } else {
            seen.iter().map(|g| g.to_string()).collect()
        };

        let permissions = resolved
            .iter()
            .filter_map(|g| defined.groups.get(g))
            .flatten()
            .cloned()
            .collect();

        Ok(PermissionFragment {
            cloud,
            feature,
            version: table.map(|t| t.version.clone()).unwrap_or_default(),
            groups: resolved,
            permissions,
        })
    }

    pub fn resolve_feature(&self, cloud: CloudVendor, feature: &Feature) -> Result<PermissionFragment> {
        self.resolve(cloud, feature.name, &feature.permission_groups)
    }

    /// Spell out implicit group requests: a feature asking for no group
    /// gets its baseline, as [`resolve`](Self::resolve) would grant it.
    /// Diff normalised lists so `[]` and `[BASIC]` compare equal.
    pub fn normalize(&self, cloud: CloudVendor, features: &[Feature]) -> Vec<Feature> {
        features
            .iter()
            .map(|feature| {
                if !feature.permission_groups.is_empty() {
                    return feature.clone();
                }
                let baseline = self
                    .groups(cloud, feature.name)
                    .map(|g| g.baseline.clone())
                    .unwrap_or_else(|| BASELINE_GROUP.to_string());
                let mut feature = feature.clone();
                feature.permission_groups = vec![baseline];
                feature
            })
            .collect()
    }
}

/// In-source permission tables
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalogSource;

impl PermissionCatalogSource for BuiltinCatalogSource {
    fn load(&self, cloud: CloudVendor) -> Result<PermissionTable> {
        Ok(builtin_table(cloud))
    }
}

/// Permission tables read from a YAML file holding a list of tables
#[derive(Debug, Clone)]
pub struct YamlCatalogSource {
    path: PathBuf,
    tables: Vec<PermissionTable>,
}

impl YamlCatalogSource {
    /// Read and parse the file once; tables are then served from memory
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path)?;
        let tables: Vec<PermissionTable> = serde_yaml::from_str(&content)?;
        tracing::debug!("Parsed {} permission table(s) from {}", tables.len(), path.display());
        Ok(Self { path, tables })
    }
}

impl PermissionCatalogSource for YamlCatalogSource {
    fn load(&self, cloud: CloudVendor) -> Result<PermissionTable> {
        self.tables
            .iter()
            .find(|t| t.cloud == cloud)
            .cloned()
            .ok_or_else(|| {
                CoreError::CatalogLoad(format!(
                    "{} has no permission table for {}",
                    self.path.display(),
                    cloud
                ))
            })
    }
}

fn builtin_table(cloud: CloudVendor) -> PermissionTable {
    let table = PermissionTable::new(cloud, BUILTIN_CATALOG_VERSION);
    match cloud {
        CloudVendor::Aws => table
            .with_feature(
                FeatureName::CloudNativeProtection,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group(
                        "BASIC",
                        &[
                            "ec2:CreateSnapshot",
                            "ec2:CreateTags",
                            "ec2:DeleteSnapshot",
                            "ec2:DescribeInstances",
                            "ec2:DescribeSnapshots",
                            "ec2:DescribeVolumes",
                            "kms:DescribeKey",
                        ],
                    )
                    .with_group(
                        "EXPORT_AND_RESTORE",
                        &[
                            "ec2:AttachVolume",
                            "ec2:CreateVolume",
                            "ec2:DetachVolume",
                            "ec2:RunInstances",
                            "ec2:StartInstances",
                            "ec2:StopInstances",
                        ],
                    )
                    .with_group(
                        "FILE_LEVEL_RECOVERY",
                        &["ebs:ListChangedBlocks", "ebs:ListSnapshotBlocks", "ebs:GetSnapshotBlock"],
                    )
                    .with_group(
                        "SNAPSHOT_PRIVATE_ACCESS",
                        &["ec2:CreateVpcEndpoint", "ec2:DescribeVpcEndpoints"],
                    ),
            )
            .with_feature(
                FeatureName::Exocompute,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group(
                        "BASIC",
                        &["eks:CreateCluster", "eks:DescribeCluster", "iam:PassRole"],
                    )
                    .with_group(
                        "RSC_MANAGED_CLUSTER",
                        &["eks:CreateNodegroup", "eks:DeleteCluster", "autoscaling:*"],
                    )
                    .with_group("PRIVATE_ENDPOINTS", &["ec2:CreateVpcEndpoint"]),
            )
            .with_feature(
                FeatureName::CloudNativeArchival,
                FeatureGroups::new(BASELINE_GROUP).with_group(
                    "BASIC",
                    &["s3:CreateBucket", "s3:GetObject", "s3:ListBucket", "s3:PutObject"],
                ),
            )
            .with_feature(
                FeatureName::CloudNativeArchivalEncryption,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group("BASIC", &["kms:Decrypt", "kms:Encrypt", "kms:GenerateDataKey"]),
            )
            .with_feature(
                FeatureName::CloudNativeS3Protection,
                FeatureGroups::new(BASELINE_GROUP).with_group(
                    "BASIC",
                    &["s3:GetBucketVersioning", "s3:GetObjectVersion", "s3:ListBucketVersions"],
                ),
            )
            .with_feature(
                FeatureName::DataScanning,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group("BASIC", &["macie2:GetFindings", "s3:GetObject"]),
            )
            .with_feature(
                FeatureName::Outpost,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group("BASIC", &["sts:AssumeRole", "organizations:DescribeAccount"]),
            )
            .with_feature(
                FeatureName::KubernetesProtection,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group("BASIC", &["eks:DescribeCluster", "eks:ListClusters"]),
            )
            .with_feature(
                FeatureName::ServersAndApps,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group("BASIC", &["ec2:DescribeInstances"])
                    .with_group(
                        "CLOUD_CLUSTER_ES",
                        &["ec2:RunInstances", "s3:CreateBucket", "s3:PutObject"],
                    )
                    .with_default_group("CLOUD_CLUSTER_ES"),
            ),
        CloudVendor::Azure => table
            .with_feature(
                FeatureName::CloudNativeProtection,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group(
                        "BASIC",
                        &[
                            "Microsoft.Compute/disks/read",
                            "Microsoft.Compute/snapshots/write",
                            "Microsoft.Compute/virtualMachines/read",
                        ],
                    )
                    .with_group(
                        "EXPORT_AND_RESTORE",
                        &[
                            "Microsoft.Compute/disks/write",
                            "Microsoft.Compute/virtualMachines/write",
                        ],
                    )
                    .with_group(
                        "FILE_LEVEL_RECOVERY",
                        &["Microsoft.Compute/snapshots/beginGetAccess/action"],
                    ),
            )
            .with_feature(
                FeatureName::Exocompute,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group(
                        "BASIC",
                        &["Microsoft.ContainerService/managedClusters/read"],
                    )
                    .with_group(
                        "PRIVATE_ENDPOINTS",
                        &["Microsoft.Network/privateEndpoints/write"],
                    )
                    .with_group(
                        "CUSTOMER_MANAGED_BASIC",
                        &["Microsoft.ContainerService/managedClusters/write"],
                    ),
            )
            .with_feature(
                FeatureName::CloudNativeArchival,
                FeatureGroups::new(BASELINE_GROUP).with_group(
                    "BASIC",
                    &["Microsoft.Storage/storageAccounts/write"],
                ),
            )
            .with_feature(
                FeatureName::CloudNativeArchivalEncryption,
                FeatureGroups::new(BASELINE_GROUP).with_group(
                    "BASIC",
                    &["Microsoft.KeyVault/vaults/keys/read"],
                ),
            )
            .with_feature(
                FeatureName::CloudNativeBlobProtection,
                FeatureGroups::new(BASELINE_GROUP).with_group(
                    "BASIC",
                    &["Microsoft.Storage/storageAccounts/blobServices/read"],
                ),
            )
            .with_feature(
                FeatureName::AzureSqlDbProtection,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group("BASIC", &["Microsoft.Sql/servers/databases/read"])
                    .with_group(
                        "EXPORT_AND_RESTORE",
                        &["Microsoft.Sql/servers/databases/write"],
                    ),
            ),
        CloudVendor::Gcp => table
            .with_feature(
                FeatureName::CloudNativeProtection,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group(
                        "BASIC",
                        &[
                            "compute.disks.createSnapshot",
                            "compute.instances.list",
                            "compute.snapshots.delete",
                        ],
                    )
                    .with_group(
                        "EXPORT_AND_RESTORE",
                        &["compute.disks.create", "compute.instances.create"],
                    ),
            )
            .with_feature(
                FeatureName::CloudNativeArchival,
                FeatureGroups::new(BASELINE_GROUP)
                    .with_group("BASIC", &["storage.buckets.create", "storage.objects.create"]),
            ),
    }
}
