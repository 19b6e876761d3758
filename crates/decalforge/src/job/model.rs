use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Number of prompt characters used for a job's display name.
const NAME_LENGTH: usize = 30;

/// Lifecycle state of a job.
///
/// `pending -> processing -> {completed | failed}`. Both terminal states are
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last pipeline stage a job entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Generating,
    Fetching,
    ProcessingTextures,
    EmittingConfig,
    Packaging,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::Generating => "generating",
            JobPhase::Fetching => "fetching",
            JobPhase::ProcessingTextures => "processing_textures",
            JobPhase::EmittingConfig => "emitting_config",
            JobPhase::Packaging => "packaging",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobPhase::Queued),
            "generating" => Some(JobPhase::Generating),
            "fetching" => Some(JobPhase::Fetching),
            "processing_textures" => Some(JobPhase::ProcessingTextures),
            "emitting_config" => Some(JobPhase::EmittingConfig),
            "packaging" => Some(JobPhase::Packaging),
            "completed" => Some(JobPhase::Completed),
            "failed" => Some(JobPhase::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated submission, ready to become a job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub prompt: String,
    pub colors: Vec<String>,
    pub reference_images: Vec<String>,
    pub user_id: String,
}

/// A persisted generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    /// Display name: the first characters of the prompt.
    pub name: String,
    pub prompt: String,
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
    pub user_id: String,
    /// Provider adapter that served the job, once selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub status: JobStatus,
    pub phase: JobPhase,
    /// Location returned by the image provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffuse_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<String>,
    /// Archive location. Present only on completed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Stage name that failed. Never the raw error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Builds a `pending` record for a freshly accepted submission.
    pub fn new(id: String, input: NewJob, now: DateTime<Utc>) -> Self {
        let name = input.prompt.chars().take(NAME_LENGTH).collect();
        Self {
            id,
            name,
            prompt: input.prompt,
            colors: input.colors,
            reference_images: input.reference_images,
            user_id: input.user_id,
            provider: None,
            status: JobStatus::Pending,
            phase: JobPhase::Queued,
            image_url: None,
            diffuse_path: None,
            normal_path: None,
            mask_path: None,
            download_url: None,
            failed_stage: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a partial update, enforcing the lifecycle invariants.
    ///
    /// The record is left untouched when an error is returned.
    pub fn apply(&mut self, patch: &JobPatch, now: DateTime<Utc>) -> Result<(), PersistenceError> {
        if self.status.is_terminal() {
            return Err(PersistenceError::Terminal {
                job_id: self.id.clone(),
                status: self.status,
            });
        }

        let next_status = match patch.status {
            Some(next) if next != self.status => {
                if !self.status.can_transition_to(next) {
                    return Err(PersistenceError::InvalidTransition {
                        job_id: self.id.clone(),
                        from: self.status,
                        to: next,
                    });
                }
                next
            }
            _ => self.status,
        };

        let download_url = patch.download_url.as_ref().or(self.download_url.as_ref());
        match (next_status, download_url) {
            (JobStatus::Completed, None) => {
                return Err(PersistenceError::Invariant {
                    job_id: self.id.clone(),
                    reason: "completed job requires a download url".to_string(),
                });
            }
            (status, Some(_)) if status != JobStatus::Completed => {
                return Err(PersistenceError::Invariant {
                    job_id: self.id.clone(),
                    reason: format!("download url set on a {} job", status),
                });
            }
            _ => {}
        }

        self.status = next_status;
        if let Some(phase) = patch.phase {
            self.phase = phase;
        }
        if let Some(ref provider) = patch.provider {
            self.provider = Some(provider.clone());
        }
        if let Some(ref image_url) = patch.image_url {
            self.image_url = Some(image_url.clone());
        }
        if let Some(ref diffuse) = patch.diffuse_path {
            self.diffuse_path = Some(diffuse.clone());
        }
        if let Some(ref normal) = patch.normal_path {
            self.normal_path = Some(normal.clone());
        }
        if let Some(ref mask) = patch.mask_path {
            self.mask_path = Some(mask.clone());
        }
        if let Some(ref url) = patch.download_url {
            self.download_url = Some(url.clone());
        }
        if let Some(ref stage) = patch.failed_stage {
            self.failed_stage = Some(stage.clone());
        }
        if self.status.is_terminal() {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Partial update of a job record. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub phase: Option<JobPhase>,
    pub provider: Option<String>,
    pub image_url: Option<String>,
    pub diffuse_path: Option<String>,
    pub normal_path: Option<String>,
    pub mask_path: Option<String>,
    pub download_url: Option<String>,
    pub failed_stage: Option<String>,
}

impl JobPatch {
    pub fn phase(phase: JobPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            phase: Some(JobPhase::Queued),
            ..Default::default()
        }
    }

    pub fn completed(download_url: String) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            phase: Some(JobPhase::Completed),
            download_url: Some(download_url),
            ..Default::default()
        }
    }

    pub fn failed(stage: &str) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            phase: Some(JobPhase::Failed),
            failed_stage: Some(stage.to_string()),
            ..Default::default()
        }
    }
}
