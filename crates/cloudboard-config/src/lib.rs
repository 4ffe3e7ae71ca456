pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{MAX_TIMEOUT_SECS, RetrySettings, Settings, TrackerSettings};

use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "CLOUDBOARD_CONFIG_PATH";
const PROJECT_DIR: &str = ".cloudboard";

/// Locate the settings file
///
/// Search order:
/// 1. `CLOUDBOARD_CONFIG_PATH` (direct path)
/// 2. current directory: cloudboard.local.yaml, cloudboard.yaml
/// 3. `./.cloudboard/`: same order
/// 4. `~/.config/cloudboard/config.yaml` (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            "{} points to {}, which does not exist",
            CONFIG_PATH_ENV,
            path.display()
        );
    }

    let current_dir = std::env::current_dir()?;
    let candidates = ["cloudboard.local.yaml", "cloudboard.yaml"];

    for filename in &candidates {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir() {
        for filename in &candidates {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("cloudboard").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load settings from the located file, or defaults when there is none
pub fn load_settings() -> Result<Settings> {
    match find_config_file() {
        Ok(path) => Settings::from_path(path),
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("No configuration file found, using defaults");
            Ok(Settings::default())
        }
        Err(e) => Err(e),
    }
}

/// Default ledger directory: `./.cloudboard`
pub fn default_ledger_dir() -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(PROJECT_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    // Keeps a developer's real ~/.config/cloudboard out of the lookup
    fn isolated<F: FnOnce()>(home: &std::path::Path, f: F) {
        let home = home.to_str().unwrap().to_string();
        temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, None),
                ("XDG_CONFIG_HOME", Some(home.clone())),
                ("HOME", Some(home)),
            ],
            f,
        );
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("cloudboard.yaml"), "{}").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        isolated(temp_dir.path(), || {
            let found = find_config_file().unwrap();
            assert!(found.ends_with("cloudboard.yaml"));
        });

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_local_file_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("cloudboard.yaml"), "{}").unwrap();
        fs::write(temp_dir.path().join("cloudboard.local.yaml"), "{}").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        isolated(temp_dir.path(), || {
            assert!(find_config_file().unwrap().ends_with("cloudboard.local.yaml"));
        });

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let project_dir = temp_dir.path().join(".cloudboard");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("cloudboard.yaml"), "{}").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        isolated(temp_dir.path(), || {
            assert!(find_config_file().unwrap().ends_with(".cloudboard/cloudboard.yaml"));
        });

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_env_var_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "{}").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(config_path.to_str().unwrap()), || {
            assert_eq!(find_config_file().unwrap(), config_path);
        });
    }

    #[test]
    #[serial]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        isolated(temp_dir.path(), || {
            assert!(matches!(find_config_file(), Err(ConfigError::ConfigFileNotFound)));
            assert_eq!(load_settings().unwrap(), Settings::default());
        });

        std::env::set_current_dir(original_dir).unwrap();
    }
}
