//! Job persistence seam.
//!
//! The orchestrator only talks to [`JobRepository`]. Every implementation
//! funnels updates through [`Job::apply`](crate::job::Job::apply), so the
//! lifecycle invariants hold regardless of backend.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use chrono::Utc;

use crate::error::PersistenceError;
use crate::job::{Job, JobPatch, JobStatus, NewJob};

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

/// Listing parameters.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub user_id: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
}

impl JobQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}

/// Create / read / update-by-id access to job records.
///
/// Calls are synchronous and short; the SQLite implementation runs a single
/// indexed statement per call.
pub trait JobRepository: Send + Sync {
    /// Persists a new `pending` job with a freshly generated id.
    fn create(&self, input: NewJob) -> Result<Job, PersistenceError>;

    /// Persists a new job already moved to `processing`, in one write.
    fn accept(&self, input: NewJob) -> Result<Job, PersistenceError>;

    fn get(&self, id: &str) -> Result<Option<Job>, PersistenceError>;

    /// Applies `patch` atomically and returns the updated record.
    fn update(&self, id: &str, patch: &JobPatch) -> Result<Job, PersistenceError>;

    /// Jobs matching `query`, newest first.
    fn list(&self, query: &JobQuery) -> Result<Vec<Job>, PersistenceError>;

    /// Jobs still `pending` or `processing`.
    fn find_unfinished(&self) -> Result<Vec<Job>, PersistenceError>;
}

/// A fresh `pending` record with a v4 id.
pub(crate) fn new_record(input: NewJob) -> Job {
    Job::new(uuid::Uuid::new_v4().to_string(), input, Utc::now())
}

/// A fresh record taken through `pending -> processing` before it is stored.
pub(crate) fn accepted_record(input: NewJob) -> Result<Job, PersistenceError> {
    let mut job = new_record(input);
    job.apply(&JobPatch::processing(), Utc::now())?;
    Ok(job)
}

/// Runs `f` against `repo` on tokio's blocking pool.
pub async fn blocking<T, F>(repo: &Arc<dyn JobRepository>, f: F) -> Result<T, PersistenceError>
where
    F: FnOnce(&dyn JobRepository) -> Result<T, PersistenceError> + Send + 'static,
    T: Send + 'static,
{
    let repo = Arc::clone(repo);
    tokio::task::spawn_blocking(move || f(repo.as_ref()))
        .await
        .map_err(|e| PersistenceError::TaskFailed(e.to_string()))?
}
