//! Feature diff engine
//!
//! Compares the features currently enabled on an account with the desired
//! ones and produces an ordered [`ChangeSet`]: disables first, then enables,
//! then updates, each category sorted by feature name.

use crate::error::{CoreError, Result};
use crate::model::{Feature, FeatureName, FeatureParams};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Change category; also the order in which categories are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Disable,
    Enable,
    Update,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Disable => write!(f, "disable"),
            ChangeKind::Enable => write!(f, "enable"),
            ChangeKind::Update => write!(f, "update"),
        }
    }
}

/// Added and removed members of a set-valued field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDelta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl SetDelta {
    fn between(current: &BTreeSet<&str>, desired: &BTreeSet<&str>) -> Option<Self> {
        let added: Vec<String> = desired.difference(current).map(|s| s.to_string()).collect();
        let removed: Vec<String> = current.difference(desired).map(|s| s.to_string()).collect();
        if added.is_empty() && removed.is_empty() {
            None
        } else {
            Some(Self { added, removed })
        }
    }

    fn apply_to(&self, values: &mut Vec<String>) {
        values.retain(|v| !self.removed.contains(v));
        for value in &self.added {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }
}

/// Fields that changed on an already enabled feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_groups: Option<SetDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<SetDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<FeatureParams>,
}

impl FeatureDelta {
    pub fn is_empty(&self) -> bool {
        self.permission_groups.is_none() && self.regions.is_none() && self.params.is_none()
    }

    /// Whether the change only removes regions
    pub fn is_region_removal_only(&self) -> bool {
        self.permission_groups.is_none()
            && self.params.is_none()
            && self
                .regions
                .as_ref()
                .is_some_and(|r| r.added.is_empty() && !r.removed.is_empty())
    }
}

/// One entry of a change-set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FeatureChange {
    Enable { feature: Feature },
    Disable { name: FeatureName },
    Update { feature: Feature, delta: FeatureDelta },
}

impl FeatureChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            FeatureChange::Enable { .. } => ChangeKind::Enable,
            FeatureChange::Disable { .. } => ChangeKind::Disable,
            FeatureChange::Update { .. } => ChangeKind::Update,
        }
    }

    pub fn feature_name(&self) -> FeatureName {
        match self {
            FeatureChange::Enable { feature } | FeatureChange::Update { feature, .. } => {
                feature.name
            }
            FeatureChange::Disable { name } => *name,
        }
    }

    /// Desired feature state after the change, if the feature stays enabled
    pub fn target(&self) -> Option<&Feature> {
        match self {
            FeatureChange::Enable { feature } | FeatureChange::Update { feature, .. } => {
                Some(feature)
            }
            FeatureChange::Disable { .. } => None,
        }
    }
}

impl fmt::Display for FeatureChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureChange::Enable { feature } => write!(
                f,
                "+ enable  {} groups=[{}] regions=[{}]",
                feature.name,
                feature.permission_groups.join(","),
                feature.regions.join(",")
            ),
            FeatureChange::Disable { name } => write!(f, "- disable {}", name),
            FeatureChange::Update { feature, delta } => {
                write!(f, "~ update  {}", feature.name)?;
                if let Some(groups) = &delta.permission_groups {
                    write!(f, " groups(+{:?} -{:?})", groups.added, groups.removed)?;
                }
                if let Some(regions) = &delta.regions {
                    write!(f, " regions(+{:?} -{:?})", regions.added, regions.removed)?;
                }
                if delta.params.is_some() {
                    write!(f, " params")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered set of feature changes for one account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<FeatureChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureChange> {
        self.changes.iter()
    }

    /// Changes of one category, in change-set order
    pub fn by_kind(&self, kind: ChangeKind) -> Vec<&FeatureChange> {
        self.changes.iter().filter(|c| c.kind() == kind).collect()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            enable: self.by_kind(ChangeKind::Enable).len(),
            update: self.by_kind(ChangeKind::Update).len(),
            disable: self.by_kind(ChangeKind::Disable).len(),
        }
    }

    /// Apply the change-set to `current`, returning the resulting features
    /// sorted by name.
    pub fn apply(&self, current: &[Feature]) -> Vec<Feature> {
        let mut features: BTreeMap<FeatureName, Feature> =
            current.iter().map(|f| (f.name, f.clone())).collect();

        for change in &self.changes {
            match change {
                FeatureChange::Disable { name } => {
                    features.remove(name);
                }
                FeatureChange::Enable { feature } => {
                    features.insert(feature.name, feature.clone());
                }
                FeatureChange::Update { feature, delta } => {
                    let entry = features
                        .entry(feature.name)
                        .or_insert_with(|| Feature::new(feature.name));
                    if let Some(groups) = &delta.permission_groups {
                        groups.apply_to(&mut entry.permission_groups);
                    }
                    if let Some(regions) = &delta.regions {
                        regions.apply_to(&mut entry.regions);
                    }
                    if let Some(params) = &delta.params {
                        entry.params = params.clone();
                    }
                }
            }
        }

        features.into_values().collect()
    }
}

/// Counts of planned changes per category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSummary {
    pub enable: usize,
    pub update: usize,
    pub disable: usize,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to enable, {} to update, {} to disable",
            self.enable, self.update, self.disable
        )
    }
}

fn index_by_name(features: &[Feature]) -> Result<BTreeMap<FeatureName, &Feature>> {
    let mut index = BTreeMap::new();
    for feature in features {
        feature.validate()?;
        if index.insert(feature.name, feature).is_some() {
            return Err(CoreError::invalid_feature(
                feature.name,
                "feature listed more than once",
            ));
        }
    }
    Ok(index)
}

fn delta_between(current: &Feature, desired: &Feature) -> FeatureDelta {
    FeatureDelta {
        permission_groups: SetDelta::between(&current.group_set(), &desired.group_set()),
        regions: SetDelta::between(&current.region_set(), &desired.region_set()),
        params: (current.params != desired.params).then(|| desired.params.clone()),
    }
}

/// Compute the change-set turning `current` into `desired`.
///
/// Region changes on an enabled feature, removals included, are updates
/// rather than a disable followed by an enable.
pub fn diff(current: &[Feature], desired: &[Feature]) -> Result<ChangeSet> {
    let current = index_by_name(current)?;
    let desired = index_by_name(desired)?;

    let mut disables = Vec::new();
    let mut enables = Vec::new();
    let mut updates = Vec::new();

    // BTreeMap iteration keeps every category sorted by feature name
    for name in current.keys() {
        if !desired.contains_key(name) {
            disables.push(FeatureChange::Disable { name: *name });
        }
    }

    for (name, wanted) in &desired {
        match current.get(name) {
            None => enables.push(FeatureChange::Enable {
                feature: (*wanted).clone(),
            }),
            Some(existing) => {
                let delta = delta_between(existing, wanted);
                if !delta.is_empty() {
                    updates.push(FeatureChange::Update {
                        feature: (*wanted).clone(),
                        delta,
                    });
                }
            }
        }
    }

    let mut changes = disables;
    changes.append(&mut enables);
    changes.append(&mut updates);

    let change_set = ChangeSet { changes };
    tracing::debug!("Computed change-set: {}", change_set.summary());
    Ok(change_set)
}
