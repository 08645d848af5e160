use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub resource_id: Option<i64>,
    pub num_workers: Option<u32>,
    pub worker_index: Option<u32>,

    // Feature configs
    pub process: Option<ProcessConfig>,
}

/// Which previously-recorded statuses to reprocess.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProcessConfig {
    pub all: Option<bool>,
    pub bad: Option<bool>,
    pub old: Option<bool>,
    pub notdone: Option<bool>,
    pub current: Option<bool>,
    pub big: Option<bool>,
    pub error: Option<i64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
