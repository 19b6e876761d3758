//! Image generation backends.
//!
//! Every backend implements [`ImageProvider`]; the [`ProviderSelector`]
//! maps configured names to instances.

pub mod openai;
pub mod replicate;
pub mod selector;

use async_trait::async_trait;

use crate::error::ProviderError;

pub use openai::OpenAiProvider;
pub use replicate::ReplicateProvider;
pub use selector::ProviderSelector;

/// What a provider needs to produce one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    pub prompt: String,
    pub reference_images: Vec<String>,
}

impl GenerationPrompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Registry name, e.g. `openai`.
    fn name(&self) -> &str;

    /// The prompt text actually sent upstream, including backend framing.
    fn build_prompt(&self, prompt: &str) -> String {
        prompt.to_string()
    }

    /// False when the backend is missing credentials it needs.
    fn is_configured(&self) -> bool {
        true
    }

    /// Generates one image and returns its location.
    async fn generate_image(&self, request: &GenerationPrompt) -> Result<String, ProviderError>;
}

/// Truncates an upstream error body before it lands in an error or a log.
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> String {
    if body.chars().count() > max_chars {
        let head: String = body.chars().take(max_chars).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    }
}
