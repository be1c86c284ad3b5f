use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-5-nano-2025-08-07";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CONFIG_FILE: &str = "mangafmt.yaml";
pub const CONFIG_PATH_VAR: &str = "MANGAFMT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting `{0}`")]
    Missing(&'static str),
    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to load .env: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Settings as written in the YAML file. Every key is optional there.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub openai_key: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub model_code: Option<String>,
    pub base_url: Option<String>,
    pub max_iterations: Option<usize>,
    pub command_timeout_secs: Option<u64>,
    pub allow_unisolated: Option<bool>,
    pub prompt_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub openai_key: String,
    pub download_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub model_code: String,
    pub base_url: String,
    pub max_iterations: usize,
    pub command_timeout_secs: u64,
    pub allow_unisolated: bool,
    pub prompt_path: PathBuf,
}

impl Config {
    /// Load `.env`, then the YAML file, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv_if_present(dotenvy::dotenv())?;

        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let explicit = std::env::var_os(CONFIG_PATH_VAR).is_some();

        let file = if path.exists() || explicit {
            Some(path)
        } else {
            None
        };

        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Merge an optional YAML file with `env`; `env` wins.
    pub fn from_sources<F>(file: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw = match file {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };

        if let Some(v) = env("OPENAI_KEY") {
            raw.openai_key = Some(v);
        }
        if let Some(v) = env("DOWNLOAD_DIR") {
            raw.download_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env("ARCHIVE_DIR") {
            raw.archive_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env("MODEL_CODE") {
            raw.model_code = Some(v);
        }
        if let Some(v) = env("OPENAI_BASE_URL") {
            raw.base_url = Some(v);
        }
        if let Some(v) = env("MAX_ITERATIONS") {
            raw.max_iterations = Some(parse_number("MAX_ITERATIONS", &v)?);
        }
        if let Some(v) = env("COMMAND_TIMEOUT_SECS") {
            raw.command_timeout_secs = Some(parse_number("COMMAND_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = env("ALLOW_UNISOLATED") {
            raw.allow_unisolated = Some(parse_flag("ALLOW_UNISOLATED", &v)?);
        }
        if let Some(v) = env("PROMPT_PATH") {
            raw.prompt_path = Some(PathBuf::from(v));
        }

        let config = Config {
            openai_key: raw.openai_key.ok_or(ConfigError::Missing("openai_key"))?,
            download_dir: raw.download_dir.ok_or(ConfigError::Missing("download_dir"))?,
            archive_dir: raw.archive_dir.ok_or(ConfigError::Missing("archive_dir"))?,
            model_code: raw.model_code.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: raw.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_iterations: raw.max_iterations.unwrap_or(25),
            command_timeout_secs: raw.command_timeout_secs.unwrap_or(120),
            allow_unisolated: raw.allow_unisolated.unwrap_or(false),
            prompt_path: raw
                .prompt_path
                .unwrap_or_else(|| PathBuf::from("prompts/base.txt")),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.openai_key.trim().is_empty() {
            return Err(ConfigError::Missing("openai_key"));
        }
        if self.model_code.trim().is_empty() {
            return Err(ConfigError::Missing("model_code"));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url"));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("download_dir"));
        }
        if self.archive_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("archive_dir"));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "command_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "max_iterations",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// A missing `.env` is fine; a malformed one is not.
fn dotenv_if_present<T>(loaded: Result<T, dotenvy::Error>) -> Result<(), ConfigError> {
    match loaded {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got `{}`", other),
        }),
    }
}
