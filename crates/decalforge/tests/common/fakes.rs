//! Stage doubles that record how often they were called.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use decalforge::descriptor::{ConfigBlob, ConfigEmitter, JsonConfigEmitter};
use decalforge::error::{PackagingError, ProviderError, SerializationError};
use decalforge::package::{Packager, ZipPackager};
use decalforge::provider::{GenerationPrompt, ImageProvider};
use decalforge::texture::TextureSet;

/// Smallest byte sequence `image` recognises as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

/// Always returns the same image location.
pub struct StaticProvider {
    pub url: String,
    pub calls: AtomicUsize,
    delay: Duration,
}

impl StaticProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_delay(url, Duration::ZERO)
    }

    /// Sleeps for `delay` before answering.
    pub fn with_delay(url: impl Into<String>, delay: Duration) -> Self {
        Self {
            url: url.into(),
            calls: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl ImageProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate_image(&self, _: &GenerationPrompt) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.url.clone())
    }
}

/// Fails every request with a 503.
pub struct FailingProvider;

#[async_trait]
impl ImageProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate_image(&self, _: &GenerationPrompt) -> Result<String, ProviderError> {
        Err(ProviderError::Status {
            provider: "failing".to_string(),
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

#[derive(Default)]
pub struct CountingEmitter {
    pub calls: AtomicUsize,
}

impl ConfigEmitter for CountingEmitter {
    fn emit(
        &self,
        job_id: &str,
        prompt: &str,
        textures: &TextureSet,
    ) -> Result<ConfigBlob, SerializationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        JsonConfigEmitter.emit(job_id, prompt, textures)
    }
}

pub struct CountingPackager {
    inner: ZipPackager,
    pub calls: AtomicUsize,
}

impl CountingPackager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: ZipPackager::new(output_dir),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Packager for CountingPackager {
    async fn package(
        &self,
        job_id: &str,
        textures: &TextureSet,
        config: &ConfigBlob,
    ) -> Result<PathBuf, PackagingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.package(job_id, textures, config).await
    }
}
