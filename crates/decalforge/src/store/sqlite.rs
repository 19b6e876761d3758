use chrono::{DateTime, Utc};

use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::Database;
use crate::error::PersistenceError;
use crate::job::{Job, JobPatch, JobPhase, JobStatus, NewJob};

use super::{accepted_record, new_record, JobQuery, JobRepository};

// ─── Row conversion ─────────────────────────────────────────────────────────

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn corrupt(job_id: &str, reason: impl Into<String>) -> PersistenceError {
    PersistenceError::Corrupt {
        job_id: job_id.to_string(),
        reason: reason.into(),
    }
}

fn parse_timestamp(s: &str, job_id: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(job_id, format!("bad timestamp '{}': {}", s, e)))
}

fn parse_list(s: &str, column: &str, job_id: &str) -> Result<Vec<String>, PersistenceError> {
    serde_json::from_str(s).map_err(|e| corrupt(job_id, format!("bad {} column: {}", column, e)))
}

fn encode_list(values: &[String]) -> String {
    serde_json::Value::from(values.to_vec()).to_string()
}

fn to_row(job: &Job) -> JobRow {
    JobRow {
        id: job.id.clone(),
        name: job.name.clone(),
        prompt: job.prompt.clone(),
        colors: encode_list(&job.colors),
        reference_images: encode_list(&job.reference_images),
        user_id: job.user_id.clone(),
        provider: job.provider.clone(),
        status: job.status.as_str().to_string(),
        phase: job.phase.as_str().to_string(),
        image_url: job.image_url.clone(),
        diffuse_path: job.diffuse_path.clone(),
        normal_path: job.normal_path.clone(),
        mask_path: job.mask_path.clone(),
        download_url: job.download_url.clone(),
        failed_stage: job.failed_stage.clone(),
        created_at: format_timestamp(job.created_at),
        updated_at: format_timestamp(job.updated_at),
        completed_at: job.completed_at.map(format_timestamp),
    }
}

fn from_row(row: JobRow) -> Result<Job, PersistenceError> {
    let status = JobStatus::parse(&row.status)
        .ok_or_else(|| corrupt(&row.id, format!("unknown status '{}'", row.status)))?;
    let phase = JobPhase::parse(&row.phase)
        .ok_or_else(|| corrupt(&row.id, format!("unknown phase '{}'", row.phase)))?;
    let colors = parse_list(&row.colors, "colors", &row.id)?;
    let reference_images = parse_list(&row.reference_images, "reference_images", &row.id)?;
    let created_at = parse_timestamp(&row.created_at, &row.id)?;
    let updated_at = parse_timestamp(&row.updated_at, &row.id)?;
    let completed_at = row
        .completed_at
        .as_deref()
        .map(|s| parse_timestamp(s, &row.id))
        .transpose()?;

    Ok(Job {
        id: row.id,
        name: row.name,
        prompt: row.prompt,
        colors,
        reference_images,
        user_id: row.user_id,
        provider: row.provider,
        status,
        phase,
        image_url: row.image_url,
        diffuse_path: row.diffuse_path,
        normal_path: row.normal_path,
        mask_path: row.mask_path,
        download_url: row.download_url,
        failed_stage: row.failed_stage,
        created_at,
        updated_at,
        completed_at,
    })
}

// ─── SqliteJobStore ─────────────────────────────────────────────────────────

/// [`JobRepository`] backed by the rusqlite [`Database`].
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Number of jobs currently in `status`.
    pub fn count(&self, status: JobStatus) -> Result<u64, PersistenceError> {
        Ok(self
            .db
            .with_conn(|conn| job_repo::count_by_status(conn, status.as_str()))?)
    }
}

impl JobRepository for SqliteJobStore {
    fn create(&self, input: NewJob) -> Result<Job, PersistenceError> {
        let job = new_record(input);
        self.db.with_conn(|conn| job_repo::insert(conn, &to_row(&job)))?;
        Ok(job)
    }

    fn accept(&self, input: NewJob) -> Result<Job, PersistenceError> {
        let job = accepted_record(input)?;
        self.db.with_conn(|conn| job_repo::insert(conn, &to_row(&job)))?;
        Ok(job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, PersistenceError> {
        let row = self.db.with_conn(|conn| job_repo::find_by_id(conn, id))?;
        row.map(from_row).transpose()
    }

    fn update(&self, id: &str, patch: &JobPatch) -> Result<Job, PersistenceError> {
        self.db.with_transaction(|tx| {
            let row = job_repo::find_by_id(tx, id)?
                .ok_or_else(|| PersistenceError::Missing(id.to_string()))?;
            let mut job = from_row(row)?;
            job.apply(patch, Utc::now())?;
            job_repo::update(tx, &to_row(&job))?;
            Ok(job)
        })
    }

    fn list(&self, query: &JobQuery) -> Result<Vec<Job>, PersistenceError> {
        let filter = JobFilter {
            user_id: query.user_id.clone(),
            status: query.status.map(|s| s.as_str().to_string()),
            limit: query.limit,
            offset: None,
        };
        let rows = self.db.with_conn(|conn| job_repo::query(conn, &filter))?;
        rows.into_iter().map(from_row).collect()
    }

    fn find_unfinished(&self) -> Result<Vec<Job>, PersistenceError> {
        let rows = self.db.with_conn(job_repo::find_unfinished)?;
        rows.into_iter().map(from_row).collect()
    }
}
