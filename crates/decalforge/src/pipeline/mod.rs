pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use progress::{ProgressEvent, ProgressReporter, RecordingProgress, RepositoryProgress};
pub use runner::Pipeline;
