use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::DateSpec;
use crate::error::BatchError;
use crate::template::Templates;

pub const DEFAULT_CONFIG_FILE: &str = "dated-fetch.json";
pub const DEFAULT_STEP_DAYS: u32 = 7;
pub const DEFAULT_COUNT: usize = 104;
pub const DEFAULT_MAX_PARALLEL: usize = 1;
pub const DEFAULT_URL_TEMPLATE: &str =
    "http://web.mta.info/developers/data/nyct/turnstile/turnstile_{yymmdd}.txt";
pub const DEFAULT_KEY_TEMPLATE: &str = "{date}.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "turnstile_data";

pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 11, 16).expect("valid default date")
}

/// Raw config as read from JSON or assembled from CLI flags. Every field is
/// optional; see [`Config::overlay`] for how sources combine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub step_days: Option<u32>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub remote_url_template: Option<String>,
    #[serde(default)]
    pub storage_key_template: Option<String>,
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_parallel: Option<usize>,
}

impl Config {
    /// Values set in `overrides` win over values in `self`.
    pub fn overlay(self, overrides: Config) -> Config {
        Config {
            start_date: overrides.start_date.or(self.start_date),
            step_days: overrides.step_days.or(self.step_days),
            count: overrides.count.or(self.count),
            remote_url_template: overrides.remote_url_template.or(self.remote_url_template),
            storage_key_template: overrides.storage_key_template.or(self.storage_key_template),
            output_dir: overrides.output_dir.or(self.output_dir),
            fetch_timeout_secs: overrides.fetch_timeout_secs.or(self.fetch_timeout_secs),
            max_parallel: overrides.max_parallel.or(self.max_parallel),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub date_spec: DateSpec,
    pub templates: Templates,
    pub output_dir: Utf8PathBuf,
    pub fetch_timeout: Option<Duration>,
    pub max_parallel: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `dated-fetch.json` from the current directory when no
    /// path is given. A missing default file yields an empty config.
    pub fn load(path: Option<&str>) -> Result<Config, BatchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BatchError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| BatchError::ConfigParse(err.to_string()))
    }

    pub fn resolve(path: Option<&str>, overrides: Config) -> Result<ResolvedConfig, BatchError> {
        let config = Self::load(path)?.overlay(overrides);
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, BatchError> {
        let date_spec = DateSpec::new(
            config.start_date.unwrap_or_else(default_start_date),
            config.step_days.unwrap_or(DEFAULT_STEP_DAYS),
            config.count.unwrap_or(DEFAULT_COUNT),
        )?;

        let templates = Templates::new(
            config
                .remote_url_template
                .unwrap_or_else(|| DEFAULT_URL_TEMPLATE.to_string()),
            config
                .storage_key_template
                .unwrap_or_else(|| DEFAULT_KEY_TEMPLATE.to_string()),
        )?;

        let fetch_timeout = match config.fetch_timeout_secs {
            Some(0) => {
                return Err(BatchError::InvalidConfig(
                    "fetch_timeout_secs must be greater than 0".to_string(),
                ));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let max_parallel = config.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL);
        if max_parallel == 0 {
            return Err(BatchError::InvalidConfig(
                "max_parallel must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            date_spec,
            templates,
            output_dir: config
                .output_dir
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_OUTPUT_DIR)),
            fetch_timeout,
            max_parallel,
        })
    }
}
