use super::{load_catalog, print_json};
use crate::commands::validate;
use crate::document::AccountDocument;
use cloudboard_config::Settings;
use cloudboard_core::{ChangeKind, diff};
use colored::Colorize;
use std::path::Path;

pub fn handle(settings: &Settings, file: &Path, json: bool) -> anyhow::Result<()> {
    let document = AccountDocument::load(file)?;
    let catalog = load_catalog(settings)?;
    let account_id = document.account.account_id();

    let validation = validate::check(
        &catalog,
        document.account.cloud,
        document.current(),
        &document.desired,
    );
    if !validation.is_valid() {
        for error in &validation.errors {
            eprintln!("{} {}", "✗".red(), error);
        }
        anyhow::bail!("Cannot plan {}: desired features are invalid", account_id);
    }

    let cloud = document.account.cloud;
    let change_set = diff(
        &catalog.normalize(cloud, document.current()),
        &catalog.normalize(cloud, &document.desired),
    )?;
    let summary = change_set.summary();

    if json {
        return print_json(&serde_json::json!({
            "account_id": account_id,
            "changes": change_set.changes,
            "summary": {
                "enable": summary.enable,
                "update": summary.update,
                "disable": summary.disable,
            },
        }));
    }

    println!("{}", format!("Plan for {}", account_id).blue());
    println!();
    if change_set.is_empty() {
        println!("{}", "No changes. Account is in the desired state.".green());
        return Ok(());
    }

    for change in change_set.iter() {
        let line = change.to_string();
        let line = match change.kind() {
            ChangeKind::Disable => line.red(),
            ChangeKind::Enable => line.green(),
            ChangeKind::Update => line.yellow(),
        };
        println!("  {}", line);
    }
    println!();
    println!("Plan: {}", summary.to_string().bold());
    Ok(())
}
