//! Provider API key resolution.
//!
//! Keys are looked up in priority order: a direct value, then a file
//! (Docker secrets style), then a named environment variable. A key that no
//! source provides is simply absent; the provider reports it when called.

use std::path::PathBuf;

use secrecy::SecretString;

use super::schema::ApiKeySource;
use crate::error::ConfigError;

impl ApiKeySource {
    pub fn resolve(&self) -> Result<Option<SecretString>, ConfigError> {
        if let Some(value) = non_empty(self.api_key.as_deref()) {
            return Ok(Some(SecretString::from(value.to_string())));
        }

        if let Some(path) = non_empty(self.api_key_file.as_deref()) {
            let path = expand_home(path);
            let content =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::KeyFile {
                    path: path.clone(),
                    source: e,
                })?;
            return Ok(non_empty(Some(content.trim())).map(|k| SecretString::from(k.to_string())));
        }

        if let Some(name) = non_empty(self.api_key_env_var.as_deref()) {
            return match std::env::var(name) {
                Ok(value) => Ok(non_empty(Some(value.trim()))
                    .map(|k| SecretString::from(k.to_string()))),
                Err(std::env::VarError::NotPresent) => Ok(None),
                Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::Validation {
                    message: format!("Environment variable '{}' contains invalid UTF-8", name),
                }),
            };
        }

        Ok(None)
    }

    pub fn is_configured(&self) -> bool {
        non_empty(self.api_key.as_deref()).is_some()
            || non_empty(self.api_key_file.as_deref()).is_some()
            || non_empty(self.api_key_env_var.as_deref()).is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Expands a leading `~` (`~` or `~/...`). `~user` is left alone.
fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return match path.strip_prefix("~/") {
                Some(rest) => home.join(rest),
                None => home,
            };
        }
    }
    PathBuf::from(path)
}
