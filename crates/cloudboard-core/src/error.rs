//! Validation and catalog errors

use crate::model::{CloudVendor, FeatureName};
use thiserror::Error;

/// Errors raised before anything is submitted to the control plane
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown permission group '{group}' for {feature} on {cloud}")]
    UnknownPermissionGroup {
        cloud: CloudVendor,
        feature: FeatureName,
        group: String,
    },

    #[error("Permission groups for {feature} must include the baseline group '{baseline}'")]
    MissingBaselineGroup {
        feature: FeatureName,
        baseline: String,
    },

    #[error("Duplicate permission group '{group}' for {feature}")]
    DuplicateGroup { feature: FeatureName, group: String },

    #[error("Invalid feature specification for {feature}: {reason}")]
    InvalidFeatureSpec { feature: String, reason: String },

    #[error("Permission catalog error: {0}")]
    CatalogLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    pub(crate) fn invalid_feature(feature: impl ToString, reason: impl Into<String>) -> Self {
        CoreError::InvalidFeatureSpec {
            feature: feature.to_string(),
            reason: reason.into(),
        }
    }

    /// Validation errors block every submission and are never retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownPermissionGroup { .. }
                | CoreError::MissingBaselineGroup { .. }
                | CoreError::DuplicateGroup { .. }
                | CoreError::InvalidFeatureSpec { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
