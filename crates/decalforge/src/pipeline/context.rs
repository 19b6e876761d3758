use std::path::PathBuf;

use crate::descriptor::ConfigBlob;
use crate::job::Job;
use crate::texture::TextureSet;

pub struct PipelineContext {
    // Input
    pub job: Job,

    // Generate step results
    pub provider: Option<String>,
    pub image_url: Option<String>,

    // Fetch step result
    pub diffuse_path: Option<PathBuf>,

    // Texture step result
    pub textures: Option<TextureSet>,

    // Config step result
    pub config: Option<ConfigBlob>,

    // Package step result
    pub archive_path: Option<PathBuf>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            provider: None,
            image_url: None,
            diffuse_path: None,
            textures: None,
            config: None,
            archive_path: None,
        }
    }
}
