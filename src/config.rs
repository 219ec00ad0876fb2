//! Loads and saves [`OrchestratorConfig`] as TOML at
//! `<repo>/.crossroads/config.toml`.

use std::path::Path;

use crate::types::OrchestratorConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config.toml: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config.toml: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn config_path(repo_path: &Path) -> std::path::PathBuf {
    repo_path.join(".crossroads/config.toml")
}

/// Returns the default config if none is saved yet.
pub fn load(repo_path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let path = config_path(repo_path);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OrchestratorConfig::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn save(repo_path: &Path, config: &OrchestratorConfig) -> Result<(), ConfigError> {
    let path = config_path(repo_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}
