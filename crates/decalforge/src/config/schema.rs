use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Provider used when neither the config file nor `AI_PROVIDER` names one.
pub const DEFAULT_PROVIDER: &str = "openai";

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/images/generations";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the default image provider.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Directory that receives finished archives.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Per-job working files. Defaults to `{upload_dir}/temp`.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// SQLite file. Defaults to `~/.decalforge/data/decalforge.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Upper bound on pipelines executing at once. Unbounded when absent.
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub replicate: ReplicateConfig,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            upload_dir: default_upload_dir(),
            work_dir: None,
            database: None,
            max_concurrent_jobs: None,
            timeouts: TimeoutConfig::default(),
            openai: OpenAiConfig::default(),
            replicate: ReplicateConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.upload_dir.join("temp"))
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

/// Stage time limits, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_provider_timeout")]
    pub provider_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_secs: u64,
    #[serde(default = "default_package_timeout")]
    pub package_secs: u64,
    /// Unfinished records not refreshed for this long are treated as
    /// abandoned by recovery. Running jobs refresh at a quarter of it.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,
}

fn default_provider_timeout() -> u64 {
    120
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_package_timeout() -> u64 {
    30
}

fn default_lease() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            provider_secs: default_provider_timeout(),
            fetch_secs: default_fetch_timeout(),
            package_secs: default_package_timeout(),
            lease_secs: default_lease(),
        }
    }
}

/// Where a provider API key comes from. The first non-empty source wins:
/// `api_key`, then `api_key_file`, then the environment variable named by
/// `api_key_env_var`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeySource {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env_var: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(flatten)]
    pub key: ApiKeySource,
    #[serde(default = "default_openai_api_url")]
    pub api_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
}

fn default_openai_api_url() -> String {
    DEFAULT_OPENAI_API_URL.to_string()
}

fn default_openai_model() -> String {
    "dall-e-3".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            key: ApiKeySource {
                api_key_env_var: Some("OPENAI_API_KEY".to_string()),
                ..Default::default()
            },
            api_url: default_openai_api_url(),
            model: default_openai_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateConfig {
    #[serde(flatten)]
    pub key: ApiKeySource,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            key: ApiKeySource {
                api_key_env_var: Some("REPLICATE_API_KEY".to_string()),
                ..Default::default()
            },
        }
    }
}
