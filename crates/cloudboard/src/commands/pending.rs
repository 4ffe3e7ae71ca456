use super::print_json;
use cloudboard_cloud::FileLedger;
use cloudboard_config::Settings;
use colored::Colorize;

pub async fn handle(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let dir = match &settings.ledger_dir {
        Some(dir) => dir.clone(),
        None => cloudboard_config::default_ledger_dir()?,
    };
    let ledger = FileLedger::new(&dir).load().await?;

    if json {
        return print_json(&ledger);
    }

    if ledger.entries.is_empty() {
        println!("{}", "No pending operations".dimmed());
        return Ok(());
    }

    println!("{}", format!("Pending operations ({})", dir.display()).blue());
    println!();
    for (key, entry) in &ledger.entries {
        println!(
            "  {} {} {} [{}] recorded {}",
            key.cyan(),
            entry.change.kind(),
            entry.operation.id,
            entry.operation.status.to_string().yellow(),
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
