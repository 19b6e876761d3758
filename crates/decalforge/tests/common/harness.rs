//! Test harness for isolated orchestrator runs.
//!
//! The `TestHarness` struct provides:
//! - Temporary upload and working directories
//! - An in-memory SQLite job store
//! - Counting emitter and packager so tests can assert which stages ran

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use decalforge::db::Database;
use decalforge::fetch::HttpAssetFetcher;
use decalforge::pipeline::{Pipeline, PipelineConfig};
use decalforge::provider::{ImageProvider, ProviderSelector};
use decalforge::store::{JobRepository, SqliteJobStore};
use decalforge::texture::PassthroughProcessor;
use decalforge::Orchestrator;

use super::fakes::{CountingEmitter, CountingPackager};

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub work_dir: PathBuf,
    pub store: Arc<SqliteJobStore>,
    pub emitter: Arc<CountingEmitter>,
    pub packager: Arc<CountingPackager>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        let work_dir = upload_dir.join("temp");
        std::fs::create_dir_all(&work_dir).expect("Failed to create work dir");

        let db = Database::open_in_memory().expect("Failed to open database");

        Self {
            store: Arc::new(SqliteJobStore::new(db)),
            emitter: Arc::new(CountingEmitter::default()),
            packager: Arc::new(CountingPackager::new(&upload_dir)),
            upload_dir,
            work_dir,
            temp_dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            work_dir: self.work_dir.clone(),
            upload_dir: self.upload_dir.clone(),
            provider_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(5),
            package_timeout: Duration::from_secs(5),
        }
    }

    /// An orchestrator using `provider`, the real HTTP fetcher and zip
    /// packaging, with records in this harness's store.
    pub fn orchestrator(&self, provider: Arc<dyn ImageProvider>) -> Orchestrator {
        self.orchestrator_with(provider, self.store.clone())
    }

    /// Like [`TestHarness::orchestrator`], with records kept in `repo`.
    pub fn orchestrator_with(
        &self,
        provider: Arc<dyn ImageProvider>,
        repo: Arc<dyn JobRepository>,
    ) -> Orchestrator {
        let selector = ProviderSelector::new(provider.name().to_string());
        selector.register(provider);

        let fetcher = HttpAssetFetcher::new(&self.work_dir).expect("Failed to build fetcher");
        let pipeline = Pipeline::new(
            Arc::new(self.pipeline_config()),
            Arc::new(selector),
            Arc::new(fetcher),
            Arc::new(PassthroughProcessor),
            self.emitter.clone(),
            self.packager.clone(),
        );

        Orchestrator::new(repo, Arc::new(pipeline))
    }

    /// A store on a database file under this harness's directory. Every
    /// call with the same name opens another handle on the same file.
    pub fn shared_store(&self, name: &str) -> Arc<dyn JobRepository> {
        let db = Database::open(&self.path().join(name)).expect("Failed to open database file");
        Arc::new(SqliteJobStore::new(db))
    }

    pub fn archive_path(&self, job_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{}.zip", job_id))
    }

    pub fn emitter_calls(&self) -> usize {
        self.emitter.calls.load(Ordering::SeqCst)
    }

    pub fn packager_calls(&self) -> usize {
        self.packager.calls.load(Ordering::SeqCst)
    }
}
