use std::path::PathBuf;
use std::time::Duration;

use crate::config::AppConfig;

pub struct PipelineConfig {
    /// Per-job working files (`{job_id}_{type}.png`).
    pub work_dir: PathBuf,
    /// Finished archives.
    pub upload_dir: PathBuf,
    pub provider_timeout: Duration,
    pub fetch_timeout: Duration,
    pub package_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            work_dir: config.work_dir(),
            upload_dir: config.upload_dir.clone(),
            provider_timeout: Duration::from_secs(config.timeouts.provider_secs),
            fetch_timeout: Duration::from_secs(config.timeouts.fetch_secs),
            package_timeout: Duration::from_secs(config.timeouts.package_secs),
        }
    }
}
