use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::PersistenceError;
use crate::job::{Job, JobPatch, JobStatus, NewJob};

use super::{accepted_record, new_record, JobQuery, JobRepository};

/// Process-local [`JobRepository`]. Records are lost on exit.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

impl JobRepository for MemoryJobStore {
    fn create(&self, input: NewJob) -> Result<Job, PersistenceError> {
        let job = new_record(input);
        self.write().insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn accept(&self, input: NewJob) -> Result<Job, PersistenceError> {
        let job = accepted_record(input)?;
        self.write().insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, PersistenceError> {
        Ok(self.read().get(id).cloned())
    }

    fn update(&self, id: &str, patch: &JobPatch) -> Result<Job, PersistenceError> {
        let mut jobs = self.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| PersistenceError::Missing(id.to_string()))?;
        // Apply to a copy so a rejected patch leaves the stored record intact.
        let mut updated = job.clone();
        updated.apply(patch, Utc::now())?;
        *job = updated.clone();
        Ok(updated)
    }

    fn list(&self, query: &JobQuery) -> Result<Vec<Job>, PersistenceError> {
        let mut jobs: Vec<Job> = self
            .read()
            .values()
            .filter(|j| query.user_id.as_deref().map_or(true, |u| j.user_id == u))
            .filter(|j| query.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        newest_first(&mut jobs);
        if let Some(limit) = query.limit {
            jobs.truncate(limit as usize);
        }
        Ok(jobs)
    }

    fn find_unfinished(&self) -> Result<Vec<Job>, PersistenceError> {
        let mut jobs: Vec<Job> = self
            .read()
            .values()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Processing))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}
