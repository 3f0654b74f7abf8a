use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://my.clockodo.com/api/v2";
const DEFAULT_EXTERNAL_APPLICATION: &str = "clockodo-mcp contact@example.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in the environment")]
    Missing(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub api_key: String,
}

impl Credentials {
    /// Short hash safe to log in place of the key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.email.as_bytes());
        hasher.update(b":");
        hasher.update(self.api_key.as_bytes());
        let result = hasher.finalize();
        result.iter().take(6).map(|byte| format!("{:02x}", byte)).collect()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub base_url: String,
    pub external_application: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    base_url: Option<String>,
    external_application: Option<String>,
    timeout_secs: Option<u64>,
    cache_ttl_secs: Option<u64>,
}

impl Settings {
    /// Loads settings from the process environment and the optional JSON
    /// config file. Environment values win over the file.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => read_file_config(path)?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => read_file_config(&path)?,
                None => FileConfig::default(),
            },
        };
        Self::from_sources(|key| std::env::var(key).ok(), file)
    }

    fn from_sources<F>(env: F, file: FileConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let email = lookup("CLOCKODO_EMAIL").ok_or(ConfigError::Missing("CLOCKODO_EMAIL"))?;
        let api_key = lookup("CLOCKODO_API_KEY").ok_or(ConfigError::Missing("CLOCKODO_API_KEY"))?;
        let base_url = lookup("CLOCKODO_BASE_URL")
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            credentials: Credentials { email, api_key },
            base_url: base_url.trim_end_matches('/').to_string(),
            external_application: file
                .external_application
                .unwrap_or_else(|| DEFAULT_EXTERNAL_APPLICATION.to_string()),
            timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            cache_ttl: Duration::from_secs(file.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(".clockodo-mcp.json");
    Some(path)
}
