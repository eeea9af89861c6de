use crate::constants::*;
use crate::error::{ReconError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub num_of_rows: u32,
    /// Usually left empty in the file and supplied via `MUSEUM_API_KEY`.
    pub service_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            num_of_rows: DEFAULT_NUM_OF_ROWS,
            service_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pause after each entry, success or not.
    pub delay_ms: u64,
    pub max_entries: usize,
    pub description_cap: usize,
    pub license_fallback: String,
    /// 1 processes entries strictly one after another.
    pub workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DELAY_MS,
            max_entries: DEFAULT_MAX_ENTRIES,
            description_cap: DEFAULT_DESCRIPTION_CAP,
            license_fallback: DEFAULT_LICENSE.to_string(),
            workers: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub stem: String,
    pub log_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            stem: DEFAULT_OUTPUT_STEM.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    /// Loads the TOML file at `path`, or defaults when it does not exist, then
    /// applies the `MUSEUM_API_KEY` environment override.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                ReconError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };

        if let Ok(key) = std::env::var(SERVICE_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api.service_key = key.trim().to_string();
            }
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api.service_key.trim().is_empty() {
            return Err(ReconError::Config(format!(
                "no service key: set {} or api.service_key",
                SERVICE_KEY_ENV
            )));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ReconError::Config("api.base_url is empty".into()));
        }
        if self.run.description_cap == 0 {
            return Err(ReconError::Config("run.description_cap must be positive".into()));
        }
        if self.run.workers == 0 {
            return Err(ReconError::Config("run.workers must be at least 1".into()));
        }
        Ok(())
    }
}
