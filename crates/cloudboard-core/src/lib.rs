//! cloudboard core
//!
//! Pure building blocks of the cloud account reconciliation engine:
//!
//! - **model**: accounts, features and identity artifacts
//! - **catalog**: permission groups per `(cloud, feature)`
//! - **diff**: desired vs. current feature state as an ordered change-set
//! - **matcher**: identity artifacts matched against role-key requirements
//!
//! Nothing in this crate performs network I/O; the async side lives in
//! `cloudboard-cloud`.

pub mod catalog;
pub mod diff;
pub mod error;
pub mod matcher;
pub mod model;

// Re-exports
pub use catalog::{
    BuiltinCatalogSource, FeatureGroups, PermissionCatalog, PermissionCatalogSource,
    PermissionFragment, PermissionTable, YamlCatalogSource, BASELINE_GROUP,
};
pub use diff::{diff, ChangeKind, ChangeSet, ChangeSummary, FeatureChange, FeatureDelta, SetDelta};
pub use error::{CoreError, Result};
pub use matcher::{match_artifacts, MatchNote, MatchReport};
pub use model::*;
