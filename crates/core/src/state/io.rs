//! # IO Utilities
//!
//! File system helpers for the `.sieve` runtime directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::EngineConfig;

/// Get the runtime directory path (.sieve)
pub fn get_runtime_path() -> PathBuf {
    if let Ok(path) = std::env::var("SIEVE_RUNTIME_PATH") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".sieve")
}

/// Default audit store location
pub fn db_path() -> PathBuf {
    get_runtime_path().join("sieve.db")
}

/// Default engine configuration location
pub fn config_path() -> PathBuf {
    get_runtime_path().join("config.toml")
}

/// Ensure the runtime directory exists
pub async fn ensure_runtime_dir() -> Result<PathBuf> {
    let path = get_runtime_path();
    fs::create_dir_all(&path)
        .await
        .with_context(|| format!("Failed to create runtime directory: {:?}", path))?;
    Ok(path)
}

/// Load the engine configuration from `path`, or the runtime default
/// location. A missing default file yields the default configuration; a
/// missing explicit file is an error.
pub async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_path(), false),
    };

    if !explicit && fs::metadata(&path).await.is_err() {
        tracing::debug!(path = ?path, "no config file, using defaults");
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config: {:?}", path))?;
    let config = EngineConfig::from_toml_str(&content)
        .with_context(|| format!("Invalid config: {:?}", path))?;
    Ok(config)
}

/// Write a file to the runtime directory
pub async fn write_runtime_file(relative_path: impl AsRef<Path>, content: &str) -> Result<()> {
    let path = get_runtime_path().join(relative_path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_runtime_path() {
        if std::env::var("SIEVE_RUNTIME_PATH").is_err() {
            assert!(get_runtime_path().ends_with(".sieve"));
        }
        assert!(db_path().ends_with("sieve.db"));
    }

    #[tokio::test]
    async fn test_load_config_round_trip() {
        let dir = std::env::temp_dir().join(format!("sieve-io-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("config.toml");

        let mut config = EngineConfig::default();
        config.orchestrator.max_iterations = 9;
        fs::write(&path, config.to_toml_string().unwrap()).await.unwrap();

        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.orchestrator.max_iterations, 9);

        assert!(load_config(Some(&dir.join("missing.toml"))).await.is_err());
        let _ = fs::remove_dir_all(&dir).await;
    }
}
