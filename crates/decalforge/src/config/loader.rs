use std::path::{Path, PathBuf};

use crate::config::schema::AppConfig;
use crate::error::ConfigError;

pub const ENV_PROVIDER: &str = "AI_PROVIDER";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_API_URL: &str = "OPENAI_API_URL";
pub const ENV_REPLICATE_API_KEY: &str = "REPLICATE_API_KEY";
pub const ENV_UPLOAD_DIR: &str = "UPLOAD_DIR";
pub const ENV_DATABASE: &str = "DECALFORGE_DATABASE";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads the optional config file, then overlays the process environment.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Overlays values found through `lookup`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(provider) = get(ENV_PROVIDER) {
        config.provider = provider.trim().to_string();
    }
    if let Some(key) = get(ENV_OPENAI_API_KEY) {
        config.openai.key.api_key = Some(key);
    }
    if let Some(url) = get(ENV_OPENAI_API_URL) {
        config.openai.api_url = url;
    }
    if let Some(key) = get(ENV_REPLICATE_API_KEY) {
        config.replicate.key.api_key = Some(key);
    }
    if let Some(dir) = get(ENV_UPLOAD_DIR) {
        config.upload_dir = PathBuf::from(dir);
    }
    if let Some(db) = get(ENV_DATABASE) {
        config.database = Some(PathBuf::from(db));
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.provider.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "provider name must not be empty".to_string(),
        });
    }

    let timeouts = [
        ("provider_secs", config.timeouts.provider_secs),
        ("fetch_secs", config.timeouts.fetch_secs),
        ("package_secs", config.timeouts.package_secs),
        ("lease_secs", config.timeouts.lease_secs),
    ];
    if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
        return Err(ConfigError::Validation {
            message: format!("timeouts.{} must be greater than zero", name),
        });
    }

    if config.max_concurrent_jobs == Some(0) {
        return Err(ConfigError::Validation {
            message: "max_concurrent_jobs must be greater than zero".to_string(),
        });
    }

    if config.upload_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "upload_dir must not be empty".to_string(),
        });
    }

    if !config.openai.api_url.starts_with("http://") && !config.openai.api_url.starts_with("https://")
    {
        return Err(ConfigError::Validation {
            message: format!("openai.api_url '{}' is not an http(s) URL", config.openai.api_url),
        });
    }

    Ok(())
}
