//! Decal descriptor JSON consumed by the game-side texture loader.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SerializationError;
use crate::texture::TextureSet;

/// Body model the descriptor targets (Octane).
pub const OCTANE_BODY_ID: u32 = 23;

/// Stock body texture shipped with the target model.
pub const STOCK_BODY_TEXTURE: &str = "body.png";

const SKIN_ID_MODULUS: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChassisTextures {
    #[serde(rename = "Diffuse")]
    pub diffuse: String,
    #[serde(rename = "Masks")]
    pub masks: String,
    #[serde(rename = "Normal")]
    pub normal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyTextures {
    #[serde(rename = "Diffuse")]
    pub diffuse: String,
    #[serde(rename = "1_Diffuse_Skin")]
    pub diffuse_skin: String,
    #[serde(rename = "2_Diffuse_Skin_Mask")]
    pub diffuse_skin_mask: String,
    #[serde(rename = "CurvaturePack")]
    pub curvature_pack: String,
    #[serde(rename = "F1DetailNormal")]
    pub f1_detail_normal: String,
    #[serde(rename = "BodyMasks")]
    pub body_masks: String,
    #[serde(rename = "F2DetailNormal")]
    pub f2_detail_normal: String,
    #[serde(rename = "Normal")]
    pub normal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecalEntry {
    #[serde(rename = "BodyID")]
    pub body_id: u32,
    #[serde(rename = "SkinID")]
    pub skin_id: u32,
    #[serde(rename = "Chassis")]
    pub chassis: ChassisTextures,
    #[serde(rename = "Body")]
    pub body: BodyTextures,
}

/// Top-level descriptor: one entry keyed by the literal prompt.
pub type DecalDescriptor = BTreeMap<String, DecalEntry>;

/// A serialized descriptor ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlob {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Numeric skin id derived from the job id, always below 100000.
///
/// Ids starting with eight hex digits (UUIDs) use that prefix. Anything else
/// is hashed with FNV-1a.
pub fn skin_id(job_id: &str) -> u32 {
    let prefix = job_id.get(..8).filter(|p| p.chars().all(|c| c.is_ascii_hexdigit()));
    let raw = match prefix.and_then(|p| u32::from_str_radix(p, 16).ok()) {
        Some(value) => u64::from(value),
        None => fnv1a_64(job_id.as_bytes()),
    };
    (raw % SKIN_ID_MODULUS) as u32
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

fn basename(path: &Path) -> Result<String, SerializationError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| SerializationError::TextureName(path.to_path_buf()))
}

fn optional_basename(path: Option<&Path>) -> Result<String, SerializationError> {
    path.map(basename).transpose().map(Option::unwrap_or_default)
}

pub fn build_descriptor(
    job_id: &str,
    prompt: &str,
    textures: &TextureSet,
) -> Result<DecalDescriptor, SerializationError> {
    let diffuse = basename(&textures.diffuse)?;
    let normal = optional_basename(textures.normal.as_deref())?;
    let mask = optional_basename(textures.mask.as_deref())?;

    let entry = DecalEntry {
        body_id: OCTANE_BODY_ID,
        skin_id: skin_id(job_id),
        chassis: ChassisTextures {
            diffuse: diffuse.clone(),
            masks: mask.clone(),
            normal: normal.clone(),
        },
        body: BodyTextures {
            diffuse: STOCK_BODY_TEXTURE.to_string(),
            diffuse_skin: diffuse,
            diffuse_skin_mask: mask,
            curvature_pack: String::new(),
            f1_detail_normal: String::new(),
            body_masks: String::new(),
            f2_detail_normal: String::new(),
            normal,
        },
    };

    let mut descriptor = DecalDescriptor::new();
    descriptor.insert(prompt.to_string(), entry);
    Ok(descriptor)
}

pub trait ConfigEmitter: Send + Sync {
    fn emit(
        &self,
        job_id: &str,
        prompt: &str,
        textures: &TextureSet,
    ) -> Result<ConfigBlob, SerializationError>;
}

/// Emits pretty-printed JSON as `{job_id}_config.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonConfigEmitter;

impl ConfigEmitter for JsonConfigEmitter {
    fn emit(
        &self,
        job_id: &str,
        prompt: &str,
        textures: &TextureSet,
    ) -> Result<ConfigBlob, SerializationError> {
        let descriptor = build_descriptor(job_id, prompt, textures)?;
        let bytes = serde_json::to_vec_pretty(&descriptor)?;
        Ok(ConfigBlob {
            file_name: format!("{}_config.json", job_id),
            bytes,
        })
    }
}
