use super::print_json;
use crate::document::AccountDocument;
use cloudboard_core::{MatchNote, match_artifacts};
use colored::Colorize;
use std::path::Path;

pub fn handle(file: &Path, json: bool) -> anyhow::Result<()> {
    let document = AccountDocument::load(file)?;
    let report = match_artifacts(&document.requirements, &document.bindings);

    if json {
        print_json(&report)?;
    } else {
        println!(
            "{}",
            format!(
                "Matching {} artifact(s) against {} requirement(s)",
                document.bindings.len(),
                document.requirements.len()
            )
            .blue()
        );
        println!();

        for (role_key, bindings) in &report.matched {
            for binding in bindings {
                println!(
                    "  {} {} -> {}",
                    "✓".green(),
                    role_key.to_string().cyan(),
                    binding.identifier
                );
            }
        }
        for requirement in &report.missing {
            println!("  {} missing {}", "✗".red(), requirement);
        }
        for binding in &report.extra {
            println!(
                "  {}",
                format!("? extra {} ({})", binding.role_key, binding.identifier).dimmed()
            );
        }
        for note in &report.notes {
            let text = match note {
                MatchNote::Unverified {
                    role_key,
                    identifier,
                    ..
                } => format!("{} accepted without a name check: {}", role_key, identifier),
                MatchNote::PatternMismatch {
                    role_key,
                    identifier,
                    pattern,
                    ..
                } => format!("{} does not match {} for {}", identifier, pattern, role_key),
            };
            println!("  {} {}", "!".yellow(), text);
        }
    }

    if !report.is_satisfied() {
        anyhow::bail!(
            "{} requirement(s) without a matching artifact",
            report.missing.len()
        );
    }
    Ok(())
}
