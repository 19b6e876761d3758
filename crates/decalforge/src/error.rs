use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum DecalError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Packaging error: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is not ready for download (status: {status})")]
    NotReady { job_id: String, status: JobStatus },
}

/// Bad input at submission time. Raised before any job record exists.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("At least one palette color is required")]
    NoColors,

    #[error("Too many palette colors: {count} given, at most {max} allowed")]
    TooManyColors { count: usize, max: usize },

    #[error("Invalid color value '{0}': expected #RGB or #RRGGBB")]
    InvalidColor(String),

    #[error("Reference image location at index {0} is empty")]
    EmptyReferenceImage(usize),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to read API key file '{path}': {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No API key configured for provider '{provider}'")]
    MissingApiKey { provider: String },

    #[error("Request to provider '{provider}' failed: {source}")]
    Request {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Provider '{provider}' returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Provider '{provider}' returned a malformed response: {reason}")]
    MalformedResponse { provider: String, reason: String },

    #[error("Provider '{provider}' timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("Provider '{provider}' does not generate images yet")]
    Unsupported { provider: String },

    #[error("No provider named '{requested}' and default provider '{default}' is not registered")]
    NotRegistered { requested: String, default: String },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid asset location '{0}'")]
    InvalidLocation(String),

    #[error("Download of '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Download of '{url}' returned an empty body")]
    EmptyBody { url: String },

    #[error("Download of '{url}' was truncated: expected {expected} bytes, received {received}")]
    Truncated {
        url: String,
        expected: u64,
        received: u64,
    },

    #[error("Failed to write asset '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
}

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to read base image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Base image '{path}' is not a recognized image format")]
    UnrecognizedFormat { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Failed to serialize decal descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Texture path '{0}' has no usable file name")]
    TextureName(PathBuf),
}

#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read package input '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive '{path}': {source}")]
    WriteArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive entry '{0}' would be written twice")]
    DuplicateEntry(String),

    #[error("Archive write timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Archive task failed: {0}")]
    TaskFailed(String),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job record '{0}' does not exist")]
    Missing(String),

    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {job_id} is already {status} and can no longer change")]
    Terminal { job_id: String, status: JobStatus },

    #[error("Update would break job {job_id}: {reason}")]
    Invariant { job_id: String, reason: String },

    #[error("Stored job {job_id} is corrupt: {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error("Job store task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, DecalError>;
