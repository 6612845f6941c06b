//! Configuration file handling

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Terraform binary settings
    #[serde(default)]
    pub terraform: TerraformConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Defaults for http steps
    #[serde(default)]
    pub http: HttpDefaults,

    /// LocalStack backend settings
    #[serde(default)]
    pub localstack: LocalStackConfig,
}

/// Terraform binary settings
#[derive(Debug, Deserialize)]
pub struct TerraformConfig {
    /// Binary name or path, looked up in PATH when relative
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
        }
    }
}

fn default_binary() -> PathBuf {
    PathBuf::from("terraform")
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Wall-clock budget for the cleanup pass
    #[serde(default = "default_cleanup")]
    pub cleanup_secs: u64,

    /// Bound on a single HTTP request
    #[serde(default = "default_http_request")]
    pub http_request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            cleanup_secs: default_cleanup(),
            http_request_secs: default_http_request(),
        }
    }
}

fn default_cleanup() -> u64 {
    300
}
fn default_http_request() -> u64 {
    30
}

/// Retry policy applied to http steps that don't set their own
#[derive(Debug, Deserialize)]
pub struct HttpDefaults {
    #[serde(default = "default_retries")]
    pub default_retries: u32,

    #[serde(default = "default_delay")]
    pub default_delay_secs: u64,
}

impl Default for HttpDefaults {
    fn default() -> Self {
        Self {
            default_retries: default_retries(),
            default_delay_secs: default_delay(),
        }
    }
}

fn default_retries() -> u32 {
    3
}
fn default_delay() -> u64 {
    10
}

/// LocalStack configuration
#[derive(Debug, Deserialize)]
pub struct LocalStackConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for LocalStackConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:4566".to_string()
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::from_toml(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.cleanup_secs)
    }

    pub fn http_request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.http_request_secs)
    }

    pub fn http_default_delay(&self) -> Duration {
        Duration::from_secs(self.http.default_delay_secs)
    }

    /// Resolve the terraform binary to an absolute path
    pub fn terraform_binary(&self) -> Option<PathBuf> {
        which::which(&self.terraform.binary).ok()
    }
}
