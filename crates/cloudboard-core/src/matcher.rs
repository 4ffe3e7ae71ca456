//! Artifact matcher
//!
//! Resolves which supplied identity artifacts satisfy the requirements the
//! control plane issued per role key.

use crate::model::{ArtifactBinding, ArtifactKind, ArtifactRequirement, NamePattern, RoleKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Non-fatal observation made while matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum MatchNote {
    /// Requirement had no name pattern, so the binding was accepted unchecked
    Unverified {
        role_key: RoleKey,
        kind: ArtifactKind,
        identifier: String,
    },
    /// Binding has the right key and kind but its name does not fit the pattern
    PatternMismatch {
        role_key: RoleKey,
        kind: ArtifactKind,
        identifier: String,
        pattern: NamePattern,
    },
}

/// Outcome of matching bindings against requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub matched: BTreeMap<RoleKey, Vec<ArtifactBinding>>,
    pub missing: Vec<ArtifactRequirement>,
    pub extra: Vec<ArtifactBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<MatchNote>,
}

impl MatchReport {
    /// Every requirement has at least one matching binding
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.matched.values().map(Vec::len).sum()
    }
}

/// Match `bindings` against `requirements`.
///
/// Bindings are keyed by `(role key, kind)`. When a requirement carries a
/// name pattern, the binding's resource name must satisfy it as well.
pub fn match_artifacts(
    requirements: &[ArtifactRequirement],
    bindings: &[ArtifactBinding],
) -> MatchReport {
    let mut report = MatchReport::default();
    let required_keys: BTreeSet<&RoleKey> = requirements.iter().map(|r| &r.role_key).collect();
    let mut used: BTreeSet<usize> = BTreeSet::new();

    for requirement in requirements {
        let mut found = false;
        for (idx, binding) in bindings.iter().enumerate() {
            if binding.role_key != requirement.role_key || binding.kind != requirement.kind {
                continue;
            }

            match &requirement.pattern {
                Some(pattern) if !pattern.matches(binding.resource_name()) => {
                    tracing::debug!(
                        "Binding {} does not match pattern {} for {}",
                        binding.identifier,
                        pattern,
                        requirement.role_key
                    );
                    report.notes.push(MatchNote::PatternMismatch {
                        role_key: binding.role_key.clone(),
                        kind: binding.kind,
                        identifier: binding.identifier.clone(),
                        pattern: pattern.clone(),
                    });
                    continue;
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        "Accepting {} for {}/{} without a name pattern to verify against",
                        binding.identifier,
                        requirement.role_key,
                        requirement.kind
                    );
                    report.notes.push(MatchNote::Unverified {
                        role_key: binding.role_key.clone(),
                        kind: binding.kind,
                        identifier: binding.identifier.clone(),
                    });
                }
            }

            found = true;
            // A binding satisfying two identical requirements is listed once
            if used.insert(idx) {
                report
                    .matched
                    .entry(binding.role_key.clone())
                    .or_default()
                    .push(binding.clone());
            }
        }

        if !found {
            report.missing.push(requirement.clone());
        }
    }

    report.extra = bindings
        .iter()
        .filter(|b| !required_keys.contains(&b.role_key))
        .cloned()
        .collect();

    if !report.extra.is_empty() {
        tracing::info!(
            "{} artifact binding(s) not required by any role key",
            report.extra.len()
        );
    }

    report
}
