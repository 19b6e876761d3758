use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::config::AppConfig;
use crate::descriptor::{ConfigEmitter, JsonConfigEmitter};
use crate::error::{DecalError, FetchError, PackagingError, ProviderError};
use crate::fetch::{AssetFetcher, HttpAssetFetcher};
use crate::job::JobPhase;
use crate::package::{Packager, ZipPackager};
use crate::provider::{GenerationPrompt, ProviderSelector};
use crate::texture::{PassthroughProcessor, TextureProcessor};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};

/// Asset type of the generated base image.
pub const DIFFUSE_ASSET: &str = "diffuse";

/// The ordered generation stages for one job.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    selector: Arc<ProviderSelector>,
    fetcher: Arc<dyn AssetFetcher>,
    processor: Arc<dyn TextureProcessor>,
    emitter: Arc<dyn ConfigEmitter>,
    packager: Arc<dyn Packager>,
}

impl Pipeline {
    /// Production constructor: HTTP fetcher, passthrough textures, JSON
    /// descriptor and zip packaging, all rooted at the configured dirs.
    pub fn from_config(
        config: &AppConfig,
        selector: Arc<ProviderSelector>,
    ) -> Result<Self, DecalError> {
        let pipeline_config = PipelineConfig::from_config(config);
        let fetcher = HttpAssetFetcher::new(&pipeline_config.work_dir)?;
        let packager = ZipPackager::new(&pipeline_config.upload_dir);

        Ok(Self::new(
            Arc::new(pipeline_config),
            selector,
            Arc::new(fetcher),
            Arc::new(PassthroughProcessor),
            Arc::new(JsonConfigEmitter),
            Arc::new(packager),
        ))
    }

    /// Injects specific stage implementations.
    pub fn new(
        config: Arc<PipelineConfig>,
        selector: Arc<ProviderSelector>,
        fetcher: Arc<dyn AssetFetcher>,
        processor: Arc<dyn TextureProcessor>,
        emitter: Arc<dyn ConfigEmitter>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            config,
            selector,
            fetcher,
            processor,
            emitter,
            packager,
        }
    }

    pub fn selector(&self) -> &Arc<ProviderSelector> {
        &self.selector
    }

    /// Runs every stage in order and returns the archive location. Stops at
    /// the first failing stage.
    pub async fn run(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        let span = info_span!("pipeline",
            job_id = %ctx.job.id,
            user_id = %ctx.job.user_id,
            colors = ctx.job.colors.len(),
        );

        async {
            progress.report(ProgressEvent::Phase(JobPhase::Generating)).await;
            self.step_generate(ctx, progress)
                .instrument(info_span!("generate"))
                .await?;

            progress.report(ProgressEvent::Phase(JobPhase::Fetching)).await;
            self.step_fetch(ctx).instrument(info_span!("fetch")).await?;

            progress.report(ProgressEvent::Phase(JobPhase::ProcessingTextures)).await;
            self.step_process_textures(ctx, progress)
                .instrument(info_span!("process_textures"))
                .await?;

            progress.report(ProgressEvent::Phase(JobPhase::EmittingConfig)).await;
            info_span!("emit_config").in_scope(|| self.step_emit_config(ctx))?;

            progress.report(ProgressEvent::Phase(JobPhase::Packaging)).await;
            self.step_package(ctx)
                .instrument(info_span!("package"))
                .await?;

            ctx.archive_path
                .clone()
                .ok_or_else(|| PipelineError::Aborted("package step produced no archive".to_string()))
        }
        .instrument(span)
        .await
    }

    async fn step_generate(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let provider = self.selector.active()?;
        let name = provider.name().to_string();
        progress.report(ProgressEvent::ProviderSelected { name: name.clone() }).await;
        ctx.provider = Some(name.clone());

        let request = GenerationPrompt {
            prompt: ctx.job.prompt.clone(),
            reference_images: ctx.job.reference_images.clone(),
        };
        let timeout = self.config.provider_timeout;
        let url = tokio::time::timeout(timeout, provider.generate_image(&request))
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: name.clone(),
                secs: timeout.as_secs(),
            })??;

        debug!(provider = %name, url = %url, "Image generated");
        progress.report(ProgressEvent::ImageGenerated { url: url.clone() }).await;
        ctx.image_url = Some(url);
        Ok(())
    }

    async fn step_fetch(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let url = ctx
            .image_url
            .as_deref()
            .ok_or_else(|| PipelineError::Aborted("fetch ran before generate".to_string()))?;

        let timeout = self.config.fetch_timeout;
        let path = tokio::time::timeout(
            timeout,
            self.fetcher.fetch(&ctx.job.id, url, DIFFUSE_ASSET),
        )
        .await
        .map_err(|_| FetchError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        })??;

        ctx.diffuse_path = Some(path);
        Ok(())
    }

    async fn step_process_textures(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let diffuse = ctx
            .diffuse_path
            .as_deref()
            .ok_or_else(|| PipelineError::Aborted("textures ran before fetch".to_string()))?;

        let textures = self
            .processor
            .process(&ctx.job.id, diffuse, &ctx.job.colors)
            .await?;
        progress.report(ProgressEvent::TexturesReady(textures.clone())).await;
        ctx.textures = Some(textures);
        Ok(())
    }

    fn step_emit_config(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let textures = ctx
            .textures
            .as_ref()
            .ok_or_else(|| PipelineError::Aborted("config ran before textures".to_string()))?;

        let blob = self.emitter.emit(&ctx.job.id, &ctx.job.prompt, textures)?;
        ctx.config = Some(blob);
        Ok(())
    }

    async fn step_package(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let (textures, config) = match (ctx.textures.as_ref(), ctx.config.as_ref()) {
            (Some(t), Some(c)) => (t, c),
            _ => {
                return Err(PipelineError::Aborted(
                    "package ran before config".to_string(),
                ))
            }
        };

        let timeout = self.config.package_timeout;
        let path = tokio::time::timeout(
            timeout,
            self.packager.package(&ctx.job.id, textures, config),
        )
        .await
        .map_err(|_| PackagingError::Timeout {
            secs: timeout.as_secs(),
        })??;

        ctx.archive_path = Some(path);
        Ok(())
    }
}
