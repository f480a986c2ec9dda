use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ImportConfig {
    /// Keep extraction scratch directories on disk for debugging.
    #[serde(default)]
    pub keep_scratch: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    /// Root of the vendor sync client's device folders. Falls back to the
    /// platform default when unset.
    #[serde(default)]
    pub devices_root: Option<PathBuf>,
    /// Paths (relative to a device folder) excluded from sync scans.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl SyncConfig {
    /// Compiled exclude set for device-folder scans.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        build_globset(&self.exclude_globs)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate sync excludes compile
    config.sync.exclude_set()?;

    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "./data/pulse.sqlite"
            "#,
        )
        .unwrap();
        assert!(!config.import.keep_scratch);
        assert!(config.sync.devices_root.is_none());
        assert!(config.sync.exclude_globs.is_empty());
    }

    #[test]
    fn bad_glob_fails_validation() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "./data/pulse.sqlite"

            [sync]
            exclude_globs = ["[unclosed"]
            "#,
        )
        .unwrap();
        assert!(config.sync.exclude_set().is_err());
    }
}
