use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use crate::job::{JobPatch, JobPhase};
use crate::store::{self, JobRepository};
use crate::texture::TextureSet;

/// Events emitted by the pipeline while a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Phase(JobPhase),
    ProviderSelected { name: String },
    ImageGenerated { url: String },
    TexturesReady(TextureSet),
}

impl ProgressEvent {
    pub fn to_patch(&self) -> JobPatch {
        match self {
            ProgressEvent::Phase(phase) => JobPatch::phase(*phase),
            ProgressEvent::ProviderSelected { name } => JobPatch {
                provider: Some(name.clone()),
                ..Default::default()
            },
            ProgressEvent::ImageGenerated { url } => JobPatch {
                image_url: Some(url.clone()),
                ..Default::default()
            },
            ProgressEvent::TexturesReady(textures) => JobPatch {
                diffuse_path: Some(textures.diffuse.display().to_string()),
                normal_path: textures.normal.as_ref().map(|p| p.display().to_string()),
                mask_path: textures.mask.as_ref().map(|p| p.display().to_string()),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, event: ProgressEvent);
}

/// Records progress on the job record. Write failures are logged and
/// otherwise ignored; only the terminal write is authoritative.
pub struct RepositoryProgress {
    repo: Arc<dyn JobRepository>,
    job_id: String,
}

impl RepositoryProgress {
    pub fn new(repo: Arc<dyn JobRepository>, job_id: impl Into<String>) -> Self {
        Self {
            repo,
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl ProgressReporter for RepositoryProgress {
    async fn report(&self, event: ProgressEvent) {
        let patch = event.to_patch();
        let job_id = self.job_id.clone();
        if let Err(e) = store::blocking(&self.repo, move |repo| repo.update(&job_id, &patch)).await
        {
            warn!(job_id = %self.job_id, event = ?event, error = %e, "Failed to record job progress");
        }
    }
}

/// Keeps every event in order. Used by tests to assert stage sequencing.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|g| g.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn phases(&self) -> Vec<JobPhase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Phase(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn report(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
