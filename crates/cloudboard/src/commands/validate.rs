use super::{load_catalog, print_json};
use crate::document::AccountDocument;
use cloudboard_config::Settings;
use cloudboard_core::{CloudVendor, Feature, PermissionCatalog, PermissionFragment, diff};
use colored::Colorize;
use std::path::Path;

/// Outcome of checking desired features against the catalog
pub struct Validation {
    pub fragments: Vec<PermissionFragment>,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check every desired feature, collecting all problems instead of
/// stopping at the first one
pub fn check(
    catalog: &PermissionCatalog,
    cloud: CloudVendor,
    current: &[Feature],
    desired: &[Feature],
) -> Validation {
    let mut fragments = Vec::new();
    let mut errors = Vec::new();

    for feature in desired {
        let resolved = feature
            .validate()
            .and_then(|_| catalog.resolve_feature(cloud, feature));
        match resolved {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => errors.push(e.to_string()),
        }
    }

    // Duplicate names and a malformed current state only show up in the diff
    if errors.is_empty() {
        let current = catalog.normalize(cloud, current);
        let desired = catalog.normalize(cloud, desired);
        if let Err(e) = diff(&current, &desired) {
            errors.push(e.to_string());
        }
    }

    Validation { fragments, errors }
}

pub fn handle(settings: &Settings, file: &Path, json: bool) -> anyhow::Result<()> {
    let document = AccountDocument::load(file)?;
    let catalog = load_catalog(settings)?;
    let account_id = document.account.account_id();
    let validation = check(
        &catalog,
        document.account.cloud,
        document.current(),
        &document.desired,
    );

    if json {
        print_json(&serde_json::json!({
            "account_id": account_id,
            "valid": validation.is_valid(),
            "errors": validation.errors,
            "permissions": validation.fragments,
        }))?;
    } else {
        println!("{}", format!("Validating {}...", account_id).blue());
        if validation.is_valid() {
            println!("{}", "✓ Desired features are valid".green().bold());
            println!();
            for fragment in &validation.fragments {
                println!(
                    "  - {} [{}] {} permission(s)",
                    fragment.feature.to_string().cyan(),
                    fragment.groups.join(", "),
                    fragment.permissions.len()
                );
            }
        } else {
            eprintln!("{}", "✗ Validation failed".red().bold());
            for error in &validation.errors {
                eprintln!("  {}", error);
            }
        }
    }

    if !validation.is_valid() {
        anyhow::bail!("{} validation error(s)", validation.errors.len());
    }
    Ok(())
}
