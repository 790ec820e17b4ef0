use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TrialmineError;

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub request_interval_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub contact: Option<String>,
    pub page_size: u64,
    pub workers: usize,
    pub request_interval_ms: u64,
    pub timeout_secs: u64,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `trialmine.json` (or an explicit path). A missing default-path
    /// file is not an error: the CLI flags alone are enough to run.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TrialmineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("trialmine.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| TrialmineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TrialmineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TrialmineError> {
        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            contact: config
                .contact
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            page_size: config.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            workers: config.workers.unwrap_or(DEFAULT_WORKERS).max(1),
            request_interval_ms: config
                .request_interval_ms
                .unwrap_or(DEFAULT_REQUEST_INTERVAL_MS),
            timeout_secs: config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1),
        })
    }
}
