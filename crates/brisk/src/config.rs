//! Configuration file (brisk.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use brisk_pipeline::BuildConfig;
use serde::Deserialize;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub paths: PathsConfig,
    pub styles: StylesConfig,
    pub html: HtmlConfig,
    pub server: ServerConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("src"),
            dest: PathBuf::from("docs"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    /// Browserslist queries for vendor prefixes
    pub browsers: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            browsers: vec!["last 2 versions".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    pub include_prefix: String,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            include_prefix: BuildConfig::default().include_prefix,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct NotifyConfig {
    /// Ring the terminal bell on step errors; unset means on in `dev`,
    /// off in `build`
    pub beep: Option<bool>,
}

impl ConfigFile {
    /// Build settings, with `dest` overriding the configured destination.
    pub fn build_config(&self, dest: Option<PathBuf>) -> BuildConfig {
        BuildConfig {
            source_dir: self.paths.source.clone(),
            output_dir: dest.unwrap_or_else(|| self.paths.dest.clone()),
            browsers: self.styles.browsers.clone(),
            include_prefix: self.html.include_prefix.clone(),
        }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}
