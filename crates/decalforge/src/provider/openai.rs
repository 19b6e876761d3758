//! OpenAI images API adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{truncate_body, GenerationPrompt, ImageProvider};
use crate::config::OpenAiConfig;
use crate::error::{DecalError, ProviderError};

pub const PROVIDER_NAME: &str = "openai";

const IMAGE_SIZE: &str = "1024x1024";
const RESPONSE_FORMAT: &str = "url";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_LENGTH: usize = 200;

#[derive(Debug, Serialize)]
struct ImagesRequest {
    model: String,
    prompt: String,
    n: u32,
    size: &'static str,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reference_images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

pub struct OpenAiProvider {
    client: Client,
    api_key: Option<SecretString>,
    api_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: Option<SecretString>,
        api_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER_NAME.to_string(),
                source: e,
            })?;

        Ok(Self {
            client,
            api_key,
            api_url: api_url.into(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &OpenAiConfig) -> Result<Self, DecalError> {
        let api_key = config.key.resolve()?;
        if api_key.is_none() {
            warn!("No OpenAI API key configured; generation requests will fail");
        }
        Ok(Self::new(api_key, &config.api_url, &config.model)?)
    }

    fn payload(&self, request: &GenerationPrompt) -> ImagesRequest {
        ImagesRequest {
            model: self.model.clone(),
            prompt: self.build_prompt(&request.prompt),
            n: 1,
            size: IMAGE_SIZE,
            response_format: RESPONSE_FORMAT,
            reference_images: request.reference_images.clone(),
        }
    }
}

/// Extracts `data[0].url` from an images API response body.
fn parse_image_url(body: &str) -> Result<String, ProviderError> {
    let malformed = |reason: String| ProviderError::MalformedResponse {
        provider: PROVIDER_NAME.to_string(),
        reason,
    };

    let response: ImagesResponse =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| malformed("response contains no images".to_string()))?;

    match first.url {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(malformed("first image has no url".to_string())),
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn build_prompt(&self, prompt: &str) -> String {
        format!(
            "Create a seamless texture for a Rocket League car decal with the following design: {}. \
             The texture should be suitable for wrapping around a 3D car model, with clean edges and high contrast. \
             Make it visually striking with bold colors and clear design elements that would look good on a sports car in a video game.",
            prompt
        )
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_image(&self, request: &GenerationPrompt) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| ProviderError::MissingApiKey {
            provider: PROVIDER_NAME.to_string(),
        })?;

        debug!(
            url = %self.api_url,
            model = %self.model,
            reference_images = request.reference_images.len(),
            "Requesting image generation"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key.expose_secret())
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER_NAME.to_string(),
                source: e,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Request {
            provider: PROVIDER_NAME.to_string(),
            source: e,
        })?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body, MAX_ERROR_BODY_LENGTH),
            });
        }

        parse_image_url(&body)
    }
}
