//! Job orchestration.
//!
//! The orchestrator accepts submissions, records them, and runs the
//! [`Pipeline`] for each job on its own tokio task. It is the only writer of
//! terminal job states.
//!
//! Several processes may share one job store. A running job holds a lease by
//! refreshing its record's `updated_at`; [`Orchestrator::resume_incomplete`]
//! only interrupts records whose lease has lapsed.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::AppConfig;
use crate::error::{DecalError, PersistenceError, Result};
use crate::job::{
    GenerationRequest, Job, JobPatch, JobStatus, StatusResponse, SubmitResponse,
};
use crate::pipeline::{Pipeline, PipelineContext, PipelineError, RepositoryProgress};
use crate::provider::ProviderSelector;
use crate::store::{self, JobQuery, JobRepository};

/// Stage recorded for jobs cut short by a process restart.
pub const INTERRUPTED_STAGE: &str = "interrupted";

/// Stage recorded when the archive exists but the success write failed.
pub const PERSISTENCE_STAGE: &str = "persistence";

/// How long an unfinished record may go without a heartbeat before another
/// process treats it as abandoned.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

#[derive(Default)]
struct InFlight {
    ids: HashSet<String>,
    handles: HashMap<String, JoinHandle<()>>,
}

fn lock(in_flight: &Mutex<InFlight>) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(|poisoned| {
        warn!("In-flight job set lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Submission, status and lifecycle management for decal jobs.
pub struct Orchestrator {
    repo: Arc<dyn JobRepository>,
    pipeline: Arc<Pipeline>,
    limiter: Option<Arc<Semaphore>>,
    lease: Duration,
    in_flight: Arc<Mutex<InFlight>>,
}

impl Orchestrator {
    pub fn new(repo: Arc<dyn JobRepository>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            repo,
            pipeline,
            limiter: None,
            lease: DEFAULT_LEASE,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    /// Caps how many pipelines execute at once. Further runs queue on the
    /// semaphore; submission itself never waits.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    /// Sets the lease. Running jobs heartbeat at a quarter of it.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Wires the production providers and stages from configuration.
    pub fn from_config(config: &AppConfig, repo: Arc<dyn JobRepository>) -> Result<Self> {
        let selector = Arc::new(ProviderSelector::from_config(config)?);
        let pipeline = Arc::new(Pipeline::from_config(config, selector)?);
        let orchestrator = Self::new(repo, pipeline)
            .with_lease(Duration::from_secs(config.timeouts.lease_secs));

        Ok(match config.max_concurrent_jobs {
            Some(max) => orchestrator.with_max_concurrent_jobs(max),
            None => orchestrator,
        })
    }

    /// Validates and records the request, then starts its pipeline in the
    /// background. Returns once the job is `processing`.
    pub async fn submit(&self, request: GenerationRequest) -> Result<SubmitResponse> {
        let input = request.validate()?;
        let job = store::blocking(&self.repo, move |repo| repo.accept(input)).await?;

        info!(
            job_id = %job.id,
            user_id = %job.user_id,
            colors = job.colors.len(),
            "Job accepted"
        );

        let response = SubmitResponse {
            job_id: job.id.clone(),
            status: job.status,
        };
        self.spawn_run(job);
        Ok(response)
    }

    /// Starts the pipeline for `job` unless a run for that id is already
    /// in flight. Returns whether a run was started.
    fn spawn_run(&self, job: Job) -> bool {
        let job_id = job.id.clone();

        let mut guard = lock(&self.in_flight);
        guard.handles.retain(|_, handle| !handle.is_finished());
        if !guard.ids.insert(job_id.clone()) {
            debug!(job_id = %job_id, "Pipeline already running, not starting another");
            return false;
        }

        let repo = self.repo.clone();
        let pipeline = self.pipeline.clone();
        let limiter = self.limiter.clone();
        let in_flight = self.in_flight.clone();
        let heartbeat = (self.lease / 4).max(MIN_HEARTBEAT);
        let span = info_span!("job", job_id = %job_id);
        let task_id = job_id.clone();

        let handle = tokio::spawn(
            async move {
                let run = execute(repo.clone(), pipeline, limiter, job);
                tokio::pin!(run);

                let mut ticker = tokio::time::interval(heartbeat);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;

                // Queued runs heartbeat too, so the lease covers the wait.
                let outcome = loop {
                    tokio::select! {
                        outcome = &mut run => break outcome,
                        _ = ticker.tick() => renew_lease(&repo, &task_id).await,
                    }
                };

                finish(&repo, &task_id, outcome).await;
                lock(&in_flight).ids.remove(&task_id);
            }
            .instrument(span),
        );

        guard.handles.insert(job_id, handle);
        true
    }

    pub async fn get_status(&self, job_id: &str) -> Result<StatusResponse> {
        let job = self.find(job_id).await?;
        Ok(StatusResponse {
            status: job.status,
            download_url: job.download_url,
        })
    }

    /// Archive location of a completed job.
    pub async fn download(&self, job_id: &str) -> Result<String> {
        let job = self.find(job_id).await?;
        match (job.status, job.download_url) {
            (JobStatus::Completed, Some(url)) => Ok(url),
            (JobStatus::Completed, None) => Err(PersistenceError::Corrupt {
                job_id: job.id,
                reason: "completed without a download url".to_string(),
            }
            .into()),
            (status, _) => Err(DecalError::NotReady {
                job_id: job.id,
                status,
            }),
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.find(job_id).await
    }

    /// Jobs newest first, optionally restricted to one user.
    pub async fn list_jobs(&self, user_id: Option<&str>) -> Result<Vec<Job>> {
        let query = match user_id {
            Some(user) => JobQuery::for_user(user),
            None => JobQuery::default(),
        };
        Ok(store::blocking(&self.repo, move |repo| repo.list(&query)).await?)
    }

    /// Switches the provider used by subsequent runs. Returns the name that
    /// actually took effect.
    pub fn set_provider(&self, name: &str) -> String {
        self.pipeline.selector().set_active(name)
    }

    pub fn active_provider(&self) -> String {
        self.pipeline.selector().active_name()
    }

    pub fn available_providers(&self) -> Vec<String> {
        self.pipeline.selector().available()
    }

    /// Whether the named provider has the credentials it needs.
    pub fn provider_is_configured(&self, name: &str) -> bool {
        self.pipeline.selector().is_configured(name)
    }

    /// Waits for the spawned run of `job_id`, if any, and returns the record.
    pub async fn wait(&self, job_id: &str) -> Result<Job> {
        let handle = lock(&self.in_flight).handles.remove(job_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(job_id = %job_id, error = %e, "Job task ended abnormally");
            }
        }
        self.find(job_id).await
    }

    /// Marks unfinished jobs whose lease has lapsed as failed.
    ///
    /// Jobs running in this process are skipped, and so are records another
    /// process refreshed within the lease.
    pub async fn resume_incomplete(&self) -> Result<usize> {
        let unfinished = store::blocking(&self.repo, |repo| repo.find_unfinished()).await?;
        let running: HashSet<String> = lock(&self.in_flight).ids.clone();

        let mut marked = 0;
        for job in unfinished {
            if running.contains(&job.id) {
                continue;
            }
            let lease = self.lease;
            let id = job.id.clone();
            match store::blocking(&self.repo, move |repo| interrupt_if_stale(repo, &id, lease))
                .await
            {
                Ok(true) => marked += 1,
                Ok(false) => debug!(job_id = %job.id, "Job lease still held, leaving it running"),
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Failed to mark interrupted job");
                }
            }
        }

        if marked > 0 {
            info!(count = marked, "Marked interrupted jobs as failed");
        }
        Ok(marked)
    }

    async fn find(&self, job_id: &str) -> Result<Job> {
        let id = job_id.to_string();
        store::blocking(&self.repo, move |repo| repo.get(&id))
            .await?
            .ok_or_else(|| DecalError::NotFound(job_id.to_string()))
    }
}

/// Waits for a concurrency slot, then runs the pipeline on its own task.
async fn execute(
    repo: Arc<dyn JobRepository>,
    pipeline: Arc<Pipeline>,
    limiter: Option<Arc<Semaphore>>,
    job: Job,
) -> std::result::Result<PathBuf, PipelineError> {
    let _permit = match limiter {
        Some(semaphore) => Some(
            semaphore
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Aborted(e.to_string()))?,
        ),
        None => None,
    };

    // A panic inside a stage must still end in a terminal write.
    tokio::spawn(async move {
        let progress = RepositoryProgress::new(repo, job.id.clone());
        let mut ctx = PipelineContext::new(job);
        pipeline.run(&mut ctx, &progress).await
    })
    .await
    .unwrap_or_else(|e| Err(PipelineError::Aborted(e.to_string())))
}

/// Refreshes the record's `updated_at` without changing anything else.
async fn renew_lease(repo: &Arc<dyn JobRepository>, job_id: &str) {
    let id = job_id.to_string();
    match store::blocking(repo, move |repo| repo.update(&id, &JobPatch::default())).await {
        Ok(_) => debug!(job_id = %job_id, "Job lease renewed"),
        Err(e) => warn!(job_id = %job_id, error = %e, "Could not renew job lease"),
    }
}

fn interrupt_if_stale(
    repo: &dyn JobRepository,
    job_id: &str,
    lease: Duration,
) -> std::result::Result<bool, PersistenceError> {
    let job = match repo.get(job_id)? {
        Some(job) if !job.is_finished() => job,
        _ => return Ok(false),
    };
    let stale = (Utc::now() - job.updated_at)
        .to_std()
        .map_or(false, |age| age >= lease);
    if !stale {
        return Ok(false);
    }

    // pending -> failed is not a legal transition
    if job.status == JobStatus::Pending {
        repo.update(job_id, &JobPatch::processing())?;
    }
    repo.update(job_id, &JobPatch::failed(INTERRUPTED_STAGE))?;
    Ok(true)
}

async fn update_job(
    repo: &Arc<dyn JobRepository>,
    job_id: &str,
    patch: JobPatch,
) -> std::result::Result<Job, PersistenceError> {
    let id = job_id.to_string();
    store::blocking(repo, move |repo| repo.update(&id, &patch)).await
}

/// The single terminal write for a job.
async fn finish(
    repo: &Arc<dyn JobRepository>,
    job_id: &str,
    outcome: std::result::Result<PathBuf, PipelineError>,
) {
    match outcome {
        Ok(archive) => {
            let url = archive.display().to_string();
            match update_job(repo, job_id, JobPatch::completed(url.clone())).await {
                Ok(_) => info!(job_id = %job_id, download_url = %url, "Job completed"),
                Err(e) => {
                    error!(
                        job_id = %job_id,
                        archive = %url,
                        error = %e,
                        "Could not record completed job, archive orphaned"
                    );
                    if let Err(e) =
                        update_job(repo, job_id, JobPatch::failed(PERSISTENCE_STAGE)).await
                    {
                        error!(job_id = %job_id, error = %e, "Could not record job failure");
                    }
                }
            }
        }
        Err(err) => {
            error!(job_id = %job_id, stage = err.stage(), error = %err, "Job failed");
            if let Err(e) = update_job(repo, job_id, JobPatch::failed(err.stage())).await {
                error!(job_id = %job_id, error = %e, "Could not record job failure");
            }
        }
    }
}
