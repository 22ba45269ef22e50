//! Configuration file parsing for otter-ic.toml.

use otter_vm_object::RuntimeConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Object model settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Stress run settings
    #[serde(default)]
    pub stress: StressConfig,
}

/// Stress run configuration.
#[derive(Debug, Deserialize)]
pub struct StressConfig {
    /// Iterations per scenario when `--loop-count` is not given
    #[serde(default = "default_loop_count")]
    pub loop_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            loop_count: default_loop_count(),
        }
    }
}

fn default_loop_count() -> usize {
    1000
}

/// Load configuration from a file or search for default config files.
///
/// An explicitly given path must exist; a missing discovered file just means
/// defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) if !path.exists() => Err(anyhow::anyhow!(
            "Config file not found: {}",
            path.display()
        )),
        Some(path) => parse_config_file(path),
        None => match find_config_file() {
            Some(path) => parse_config_file(&path),
            None => Ok(Config::default()),
        },
    }
}

fn parse_config_file(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

const CONFIG_NAME: &str = "otter-ic.toml";

/// Search for configuration file in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;

    let mut dir = Some(cwd.as_path());
    while let Some(current) = dir {
        let path = current.join(CONFIG_NAME);
        if path.exists() {
            return Some(path);
        }
        dir = current.parent();
    }

    None
}
