use super::schema::PilotConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./pilot.yaml
    /// 2. ~/.pilot/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<PilotConfig, ConfigError> {
        let local_config = PathBuf::from("./pilot.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".pilot").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(PilotConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<PilotConfig, ConfigError> {
        debug!(path = %path.display(), "Loading config");
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(PilotConfig::default());
        }
        let config: PilotConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Creates every artifact directory named in the config.
    pub async fn ensure_directories(config: &PilotConfig) -> Result<(), ConfigError> {
        for dir in config.artifacts.all_dirs() {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.yaml");
        tokio::fs::write(&path, "runner:\n  max_parallel: 4\n")
            .await
            .unwrap();

        let config = ConfigLoader::load_from(&path).await.unwrap();
        assert_eq!(config.runner.max_parallel, 4);
        assert!(config.runner.apply_fallback_actions);
    }

    #[tokio::test]
    async fn test_load_empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.yaml");
        tokio::fs::write(&path, "").await.unwrap();

        let config = ConfigLoader::load_from(&path).await.unwrap();
        assert_eq!(config.planner.max_recovery_attempts, 3);
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.yaml");
        tokio::fs::write(&path, "runner: [unclosed").await.unwrap();

        let err = ConfigLoader::load_from(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PilotConfig::default();
        config.artifacts.screenshots_dir = dir.path().join("shots");
        config.artifacts.traces_dir = dir.path().join("traces");
        config.artifacts.logs_dir = dir.path().join("logs");
        config.artifacts.downloads_dir = dir.path().join("dl");

        ConfigLoader::ensure_directories(&config).await.unwrap();
        assert!(dir.path().join("shots").is_dir());
        assert!(dir.path().join("dl").is_dir());
    }
}
