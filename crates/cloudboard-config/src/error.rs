use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file not found. Looked in:\n\
        - $CLOUDBOARD_CONFIG_PATH\n\
        - current directory: cloudboard.local.yaml, cloudboard.yaml\n\
        - ./.cloudboard/cloudboard.yaml\n\
        - ~/.config/cloudboard/config.yaml"
    )]
    ConfigFileNotFound,

    #[error("Invalid configuration: {0}")]
    InvalidSettings(String),

    #[error("Invalid configuration in {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
