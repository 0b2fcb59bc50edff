use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::ProcessingConfig;

pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("blockface-align")
        .join("settings.json")
}

pub fn save_settings(config: &ProcessingConfig) -> Result<PathBuf> {
    let path = settings_path();
    save_settings_to(config, &path)?;
    Ok(path)
}

pub fn save_settings_to(config: &ProcessingConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating settings directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;

    log::info!("Settings saved to: {}", path.display());
    Ok(())
}

pub fn load_settings() -> ProcessingConfig {
    load_settings_from(&settings_path())
}

/// Missing or unreadable settings never stop a run, they fall back to defaults.
pub fn load_settings_from(path: &Path) -> ProcessingConfig {
    if !path.exists() {
        log::info!("No settings file found. Using defaults.");
        return ProcessingConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(config) => {
                log::info!("Settings loaded from: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to parse settings file: {}. Using defaults.", e);
                ProcessingConfig::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read settings file: {}. Using defaults.", e);
            ProcessingConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Interpolation;

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let config = ProcessingConfig {
            worker_threads: 6,
            interpolation: Interpolation::Nearest,
            fail_fast: true,
            ..ProcessingConfig::default()
        };
        save_settings_to(&config, &path).unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.worker_threads, 6);
        assert_eq!(loaded.interpolation, Interpolation::Nearest);
        assert!(loaded.fail_fast);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.worker_threads, ProcessingConfig::default().worker_threads);
    }
}
