pub mod config;
pub mod db;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod package;
pub mod pipeline;
pub mod provider;
pub mod store;
pub mod texture;

pub use config::{load_config, AppConfig};
pub use db::{Database, DatabaseError};
pub use descriptor::{build_descriptor, skin_id, ConfigBlob, ConfigEmitter, DecalDescriptor};
pub use error::{
    ConfigError, DecalError, FetchError, PackagingError, PersistenceError, ProcessingError,
    ProviderError, Result, SerializationError, ValidationError,
};
pub use fetch::{AssetFetcher, HttpAssetFetcher};
pub use job::{GenerationRequest, Job, JobPhase, JobStatus, StatusResponse, SubmitResponse};
pub use orchestrator::Orchestrator;
pub use package::{Packager, ZipPackager};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, PipelineError};
pub use provider::{ImageProvider, ProviderSelector};
pub use store::{JobRepository, MemoryJobStore, SqliteJobStore};
pub use texture::{TextureProcessor, TextureSet};
