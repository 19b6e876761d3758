//! Job repository: row-level operations on the `jobs` table.
//!
//! Functions take a `Connection` so callers can compose them inside a
//! transaction via [`Database::with_transaction`](super::Database::with_transaction).

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row. List-valued columns hold JSON arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub colors: String,
    pub reference_images: String,
    pub user_id: String,
    pub provider: Option<String>,
    pub status: String,
    pub phase: String,
    pub image_url: Option<String>,
    pub diffuse_path: Option<String>,
    pub normal_path: Option<String>,
    pub mask_path: Option<String>,
    pub download_url: Option<String>,
    pub failed_stage: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            prompt: row.get("prompt")?,
            colors: row.get("colors")?,
            reference_images: row.get("reference_images")?,
            user_id: row.get("user_id")?,
            provider: row.get("provider")?,
            status: row.get("status")?,
            phase: row.get("phase")?,
            image_url: row.get("image_url")?,
            diffuse_path: row.get("diffuse_path")?,
            normal_path: row.get("normal_path")?,
            mask_path: row.get("mask_path")?,
            download_url: row.get("download_url")?,
            failed_stage: row.get("failed_stage")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Filter for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, name, prompt, colors, reference_images, user_id, provider,
         status, phase, image_url, diffuse_path, normal_path, mask_path, download_url,
         failed_stage, created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            job.id,
            job.name,
            job.prompt,
            job.colors,
            job.reference_images,
            job.user_id,
            job.provider,
            job.status,
            job.phase,
            job.image_url,
            job.diffuse_path,
            job.normal_path,
            job.mask_path,
            job.download_url,
            job.failed_stage,
            job.created_at,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Overwrites every mutable column. Inputs (`prompt`, `colors`, ...) and
/// `created_at` are never rewritten. Returns the number of rows touched.
pub fn update(conn: &Connection, job: &JobRow) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET provider=?2, status=?3, phase=?4, image_url=?5, diffuse_path=?6,
         normal_path=?7, mask_path=?8, download_url=?9, failed_stage=?10, updated_at=?11,
         completed_at=?12
         WHERE id=?1",
        params![
            job.id,
            job.provider,
            job.status,
            job.phase,
            job.image_url,
            job.diffuse_path,
            job.normal_path,
            job.mask_path,
            job.download_url,
            job.failed_stage,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(changed)
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Lists jobs newest first.
pub fn query(conn: &Connection, filter: &JobFilter) -> Result<Vec<JobRow>, DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref user_id) = filter.user_id {
        conditions.push(format!("user_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(user_id.clone()));
    }
    if let Some(ref status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // SQLite treats a negative LIMIT as unbounded
    let limit = filter.limit.map_or(-1, |l| l as i64);
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let sql = format!(
        "SELECT * FROM jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_by_status(conn: &Connection, status: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status = ?1",
        params![status],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Jobs that never reached a terminal state.
pub fn find_unfinished(conn: &Connection) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM jobs WHERE status IN ('pending', 'processing') ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map([], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
