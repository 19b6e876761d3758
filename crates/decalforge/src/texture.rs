//! Texture derivation from the fetched base image.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ProcessingError;

/// Texture channels for one decal. Only the diffuse channel is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSet {
    pub diffuse: PathBuf,
    pub normal: Option<PathBuf>,
    pub mask: Option<PathBuf>,
}

impl TextureSet {
    pub fn diffuse_only(diffuse: impl Into<PathBuf>) -> Self {
        Self {
            diffuse: diffuse.into(),
            normal: None,
            mask: None,
        }
    }

    /// Present channels in archive order: diffuse, normal, mask.
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.diffuse.as_path()];
        paths.extend(self.normal.as_deref());
        paths.extend(self.mask.as_deref());
        paths
    }
}

#[async_trait]
pub trait TextureProcessor: Send + Sync {
    async fn process(
        &self,
        job_id: &str,
        diffuse: &Path,
        palette: &[String],
    ) -> Result<TextureSet, ProcessingError>;
}

/// Uses the base image as the diffuse channel after checking that it is an
/// image. Produces no normal or mask map.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughProcessor;

#[async_trait]
impl TextureProcessor for PassthroughProcessor {
    async fn process(
        &self,
        job_id: &str,
        diffuse: &Path,
        palette: &[String],
    ) -> Result<TextureSet, ProcessingError> {
        let bytes = tokio::fs::read(diffuse)
            .await
            .map_err(|e| ProcessingError::ReadImage {
                path: diffuse.to_path_buf(),
                source: e,
            })?;

        let format = image::guess_format(&bytes).map_err(|_| ProcessingError::UnrecognizedFormat {
            path: diffuse.to_path_buf(),
        })?;

        debug!(
            job_id = %job_id,
            format = ?format,
            palette = palette.len(),
            "Base image accepted as diffuse texture"
        );
        Ok(TextureSet::diffuse_only(diffuse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[tokio::test]
    async fn test_png_passes_through_as_diffuse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job_diffuse.png");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let set = PassthroughProcessor
            .process("job", &path, &["#FF0000".to_string()])
            .await
            .unwrap();
        assert_eq!(set, TextureSet::diffuse_only(&path));
        assert_eq!(set.paths(), vec![path.as_path()]);
    }

    #[tokio::test]
    async fn test_non_image_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job_diffuse.png");
        std::fs::write(&path, b"<html>not an image</html>").unwrap();

        let err = PassthroughProcessor.process("job", &path, &[]).await.unwrap_err();
        assert!(matches!(err, ProcessingError::UnrecognizedFormat { .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = PassthroughProcessor
            .process("job", Path::new("/nonexistent/x.png"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::ReadImage { .. }));
    }

    #[test]
    fn test_paths_include_optional_channels() {
        let set = TextureSet {
            diffuse: PathBuf::from("/w/a_diffuse.png"),
            normal: None,
            mask: Some(PathBuf::from("/w/a_mask.png")),
        };
        assert_eq!(
            set.paths(),
            vec![Path::new("/w/a_diffuse.png"), Path::new("/w/a_mask.png")]
        );
    }
}
