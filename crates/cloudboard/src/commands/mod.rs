pub mod catalog;
pub mod matching;
pub mod pending;
pub mod plan;
pub mod validate;

use cloudboard_config::Settings;
use cloudboard_core::PermissionCatalog;

pub fn load_catalog(settings: &Settings) -> anyhow::Result<PermissionCatalog> {
    Ok(cloudboard_cloud::catalog_from_settings(settings)?)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
