//! Zip packaging of textures and descriptor.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::descriptor::ConfigBlob;
use crate::error::PackagingError;
use crate::texture::TextureSet;

#[async_trait]
pub trait Packager: Send + Sync {
    /// Bundles `textures` and `config` into one archive and returns its path.
    async fn package(
        &self,
        job_id: &str,
        textures: &TextureSet,
        config: &ConfigBlob,
    ) -> Result<PathBuf, PackagingError>;
}

/// Writes `{output_dir}/{job_id}.zip` with every entry at the archive root.
pub struct ZipPackager {
    output_dir: PathBuf,
}

impl ZipPackager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn archive_path(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.zip", job_id))
    }
}

/// Sets the flag when dropped before [`AbandonGuard::disarm`]. The blocking
/// writer checks it before publishing the archive, so a caller that gave up
/// (timeout, cancellation) never leaves a finished archive behind.
struct AbandonGuard {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl AbandonGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

fn entry_name(path: &Path) -> Result<String, PackagingError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| PackagingError::ReadInput {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
        })
}

struct ArchivePlan {
    part: PathBuf,
    target: PathBuf,
    files: Vec<(String, PathBuf)>,
    config_name: String,
    config_bytes: Vec<u8>,
}

impl ArchivePlan {
    fn new(
        output_dir: &Path,
        job_id: &str,
        textures: &TextureSet,
        config: &ConfigBlob,
    ) -> Result<Self, PackagingError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for path in textures.paths() {
            let name = entry_name(path)?;
            if !seen.insert(name.clone()) {
                return Err(PackagingError::DuplicateEntry(name));
            }
            files.push((name, path.to_path_buf()));
        }
        if !seen.insert(config.file_name.clone()) {
            return Err(PackagingError::DuplicateEntry(config.file_name.clone()));
        }

        Ok(Self {
            part: output_dir.join(format!("{}.zip.part", job_id)),
            target: output_dir.join(format!("{}.zip", job_id)),
            files,
            config_name: config.file_name.clone(),
            config_bytes: config.bytes.clone(),
        })
    }

    fn write_part(&self) -> Result<(), PackagingError> {
        let write_err = |e: std::io::Error| PackagingError::WriteArchive {
            path: self.part.clone(),
            source: e,
        };

        let file = File::create(&self.part).map_err(write_err)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, path) in &self.files {
            let bytes = std::fs::read(path).map_err(|e| PackagingError::ReadInput {
                path: path.clone(),
                source: e,
            })?;
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&bytes).map_err(write_err)?;
        }

        zip.start_file(self.config_name.as_str(), options)?;
        zip.write_all(&self.config_bytes).map_err(write_err)?;

        let mut writer = zip.finish()?;
        writer.flush().map_err(write_err)?;
        writer
            .into_inner()
            .map_err(|e| write_err(e.into_error()))?
            .sync_all()
            .map_err(write_err)?;
        Ok(())
    }

    /// Writes the partial archive and renames it into place unless the
    /// caller has abandoned the run. The partial file never survives.
    fn execute(self, abandoned: &AtomicBool) -> Result<PathBuf, PackagingError> {
        let result = self.write_part().and_then(|()| {
            if abandoned.load(Ordering::SeqCst) {
                return Err(PackagingError::TaskFailed(
                    "archive abandoned before completion".to_string(),
                ));
            }
            std::fs::rename(&self.part, &self.target).map_err(|e| PackagingError::WriteArchive {
                path: self.target.clone(),
                source: e,
            })
        });

        match result {
            Ok(()) => Ok(self.target),
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(&self.part) {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %self.part.display(), error = %remove_err, "Failed to remove partial archive");
                    }
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Packager for ZipPackager {
    async fn package(
        &self,
        job_id: &str,
        textures: &TextureSet,
        config: &ConfigBlob,
    ) -> Result<PathBuf, PackagingError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PackagingError::CreateDirectory {
                path: self.output_dir.clone(),
                source: e,
            })?;

        let plan = ArchivePlan::new(&self.output_dir, job_id, textures, config)?;
        let entries = plan.files.len() + 1;

        let flag = Arc::new(AtomicBool::new(false));
        let guard = AbandonGuard {
            flag: Arc::clone(&flag),
            armed: true,
        };
        let path = tokio::task::spawn_blocking(move || plan.execute(&flag))
            .await
            .map_err(|e| PackagingError::TaskFailed(e.to_string()))??;
        guard.disarm();

        debug!(job_id = %job_id, entries, path = %path.display(), "Archive written");
        Ok(path)
    }
}
