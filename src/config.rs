use crate::risk::RiskWeights;
use crate::types::Level;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub risk: RiskWeights,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub province: SourceConfig,
    pub district: SourceConfig,
}

impl InputConfig {
    pub fn source(&self, level: Level) -> &SourceConfig {
        match level {
            Level::Province => &self.province,
            Level::District => &self.district,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub geojson: PathBuf,
    // Property holding the region name. The upstream files disagree on this
    // ("name", "NAME", "District"), so it is configured per source.
    pub feature_key: String,
    pub rates: Option<RatesConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RatesConfig {
    pub csv: PathBuf,
    pub key_column: String,
    #[serde(default)]
    pub province_column: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
