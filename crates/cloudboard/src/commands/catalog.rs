use super::{load_catalog, print_json};
use cloudboard_config::Settings;
use cloudboard_core::{CloudVendor, FeatureGroups, FeatureName};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct CatalogView<'a> {
    cloud: CloudVendor,
    version: &'a str,
    features: BTreeMap<FeatureName, &'a FeatureGroups>,
}

pub fn handle(
    settings: &Settings,
    cloud: Option<CloudVendor>,
    feature: Option<FeatureName>,
    json: bool,
) -> anyhow::Result<()> {
    let catalog = load_catalog(settings)?;
    let clouds: Vec<CloudVendor> = match cloud {
        Some(cloud) => vec![cloud],
        None => CloudVendor::ALL.to_vec(),
    };

    let mut views = Vec::new();
    for cloud in clouds {
        let Some(version) = catalog.version(cloud) else {
            continue;
        };
        let features: BTreeMap<FeatureName, &FeatureGroups> = catalog
            .features(cloud)
            .into_iter()
            .filter(|name| feature.is_none_or(|wanted| wanted == *name))
            .filter_map(|name| catalog.groups(cloud, name).map(|groups| (name, groups)))
            .collect();
        if feature.is_some() && features.is_empty() {
            continue;
        }
        views.push(CatalogView {
            cloud,
            version,
            features,
        });
    }

    if let Some(feature) = feature {
        if views.is_empty() {
            anyhow::bail!("{} is not in the permission catalog", feature);
        }
    }

    if json {
        return print_json(&views);
    }

    for view in &views {
        println!(
            "{} {}",
            view.cloud.to_string().to_uppercase().bold(),
            format!("(catalog {})", view.version).dimmed()
        );
        for (name, groups) in &view.features {
            println!("  {}", name.to_string().cyan());
            for (group, permissions) in &groups.groups {
                let mut marks = Vec::new();
                if *group == groups.baseline {
                    marks.push("baseline");
                }
                if groups.default_group.as_deref() == Some(group.as_str()) {
                    marks.push("default");
                }
                let marks = if marks.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", marks.join(", "))
                };
                println!(
                    "    - {}{} {} permission(s)",
                    group,
                    marks.dimmed(),
                    permissions.len()
                );
                if feature.is_some() {
                    for permission in permissions {
                        println!("        {}", permission);
                    }
                }
            }
        }
        println!();
    }
    Ok(())
}
