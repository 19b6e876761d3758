//! Replicate adapter. Registered so the name resolves, but not wired to the
//! predictions API yet: every call fails with [`ProviderError::Unsupported`].

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::debug;

use super::{GenerationPrompt, ImageProvider};
use crate::config::ReplicateConfig;
use crate::error::{DecalError, ProviderError};

pub const PROVIDER_NAME: &str = "replicate";

pub struct ReplicateProvider {
    api_key: Option<SecretString>,
}

impl ReplicateProvider {
    pub fn new(api_key: Option<SecretString>) -> Self {
        Self { api_key }
    }

    pub fn from_config(config: &ReplicateConfig) -> Result<Self, DecalError> {
        Ok(Self::new(config.key.resolve()?))
    }
}

#[async_trait]
impl ImageProvider for ReplicateProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_image(&self, request: &GenerationPrompt) -> Result<String, ProviderError> {
        debug!(prompt_len = request.prompt.len(), "Replicate generation requested");
        Err(ProviderError::Unsupported {
            provider: PROVIDER_NAME.to_string(),
        })
    }
}
