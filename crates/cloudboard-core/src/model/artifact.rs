//! Identity artifact model
//!
//! The control plane groups the identity artifacts a feature combination
//! needs under opaque role keys. Callers supply concrete bindings (ARNs) for
//! those keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque grouping identifier issued by the control plane
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleKey(String);

impl RoleKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Kind of identity artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Role,
    InstanceProfile,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Role => write!(f, "role"),
            ArtifactKind::InstanceProfile => write!(f, "instance-profile"),
        }
    }
}

/// Expected shape of an artifact's resource name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "value", rename_all = "snake_case")]
pub enum NamePattern {
    Prefix(String),
    Suffix(String),
}

impl NamePattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
            NamePattern::Suffix(suffix) => name.ends_with(suffix.as_str()),
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Prefix(p) => write!(f, "{}*", p),
            NamePattern::Suffix(s) => write!(f, "*{}", s),
        }
    }
}

/// Artifact the control plane expects for a role key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRequirement {
    pub role_key: RoleKey,
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<NamePattern>,
}

impl ArtifactRequirement {
    pub fn new(role_key: impl Into<RoleKey>, kind: ArtifactKind) -> Self {
        Self {
            role_key: role_key.into(),
            kind,
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: NamePattern) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

impl fmt::Display for ArtifactRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role_key, self.kind)?;
        if let Some(pattern) = &self.pattern {
            write!(f, " ({})", pattern)?;
        }
        Ok(())
    }
}

/// Concrete identity artifact supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBinding {
    pub role_key: RoleKey,
    pub kind: ArtifactKind,
    /// ARN or other provider identifier
    pub identifier: String,
}

impl ArtifactBinding {
    pub fn new(role_key: impl Into<RoleKey>, kind: ArtifactKind, identifier: impl Into<String>) -> Self {
        Self {
            role_key: role_key.into(),
            kind,
            identifier: identifier.into(),
        }
    }

    /// Resource name part of the identifier
    ///
    /// `arn:aws:iam::123456789012:role/path/cnp-role` -> `cnp-role`
    pub fn resource_name(&self) -> &str {
        let id = self.identifier.as_str();
        match id.rfind('/') {
            Some(pos) => &id[pos + 1..],
            None => id.rsplit(':').next().unwrap_or(id),
        }
    }
}
