use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::model::{JobStatus, NewJob};

/// Largest palette a submission may carry.
pub const MAX_COLORS: usize = 5;

/// User id recorded when the caller supplies none.
pub const ANONYMOUS_USER: &str = "anonymous";

/// A decal generation request as received from the API layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub colors: Vec<String>,
    #[serde(default)]
    pub reference_images: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, colors: &[&str]) -> Self {
        Self {
            prompt: prompt.into(),
            colors: colors.iter().map(|c| c.to_string()).collect(),
            reference_images: Vec::new(),
            user_id: None,
        }
    }

    pub fn with_reference_images(mut self, images: Vec<String>) -> Self {
        self.reference_images = images;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Checks the request and normalizes its palette.
    pub fn validate(self) -> Result<NewJob, ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        if self.colors.is_empty() {
            return Err(ValidationError::NoColors);
        }
        if self.colors.len() > MAX_COLORS {
            return Err(ValidationError::TooManyColors {
                count: self.colors.len(),
                max: MAX_COLORS,
            });
        }

        let colors = self
            .colors
            .iter()
            .map(|c| normalize_color(c).ok_or_else(|| ValidationError::InvalidColor(c.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(index) = self
            .reference_images
            .iter()
            .position(|r| r.trim().is_empty())
        {
            return Err(ValidationError::EmptyReferenceImage(index));
        }

        let user_id = self
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());

        Ok(NewJob {
            prompt: self.prompt,
            colors,
            reference_images: self.reference_images,
            user_id,
        })
    }
}

/// Normalizes `#RGB` / `#RRGGBB` (case-insensitive) to upper-case `#RRGGBB`.
pub fn normalize_color(value: &str) -> Option<String> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            Some(format!("#{}", expanded.to_ascii_uppercase()))
        }
        6 => Some(format!("#{}", hex.to_ascii_uppercase())),
        _ => None,
    }
}

/// Returned immediately by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// What a polling client may see about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}
