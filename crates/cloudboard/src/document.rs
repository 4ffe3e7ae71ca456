//! Account document read by the file-based commands
//!
//! ```yaml
//! account:
//!   cloud: aws
//!   native_id: "123456789012"
//!   features: []        # current state, unless `current` is given
//! desired:
//!   - name: CLOUD_NATIVE_PROTECTION
//!     permission_groups: [BASIC]
//!     regions: [us-east-1]
//! requirements: []
//! bindings: []
//! ```

use anyhow::Context;
use cloudboard_core::{ArtifactBinding, ArtifactRequirement, CloudAccount, Feature};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct AccountDocument {
    pub account: CloudAccount,
    #[serde(default)]
    pub current: Option<Vec<Feature>>,
    #[serde(default)]
    pub desired: Vec<Feature>,
    #[serde(default)]
    pub requirements: Vec<ArtifactRequirement>,
    #[serde(default)]
    pub bindings: Vec<ArtifactBinding>,
}

impl AccountDocument {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let document: AccountDocument = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::debug!(
            "Loaded {} with {} desired feature(s)",
            document.account.account_id(),
            document.desired.len()
        );
        Ok(document)
    }

    /// Explicit `current` list, else the features recorded on the account
    pub fn current(&self) -> &[Feature] {
        self.current.as_deref().unwrap_or(&self.account.features)
    }
}
