//! Generation Request / Response Contracts

use serde::{Deserialize, Serialize};

use crate::canvas::{closest_ratio, parse_size, AspectRatio, Rect};
use crate::hashing::seed_from_text;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    /// Display size such as `1024x768`; only used to pick an aspect ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            ..Self::default()
        }
    }

    /// Aspect ratio from the explicit tag, else the closest match to
    /// `size`, else 1:1. Unknown tags fall back the same way.
    pub fn resolve_aspect_ratio(&self) -> AspectRatio {
        if let Some(ratio) = self.aspect_ratio.as_deref().and_then(|t| t.parse().ok()) {
            return ratio;
        }
        match self.size.as_deref().and_then(parse_size) {
            Some((w, h)) => closest_ratio(w as f64, h as f64),
            None => AspectRatio::default(),
        }
    }

    /// Explicit seed, or one derived from the prompt.
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| seed_from_text(&self.prompt))
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub width: f64,
    pub height: f64,
    pub view_box: String,
    pub palette: Vec<String>,
    pub description: String,
    pub seed: u64,
    pub generation_id: String,
    /// Tier that produced the artifact, `None` on complete failure.
    pub tier: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub svg: String,
    pub meta: ResponseMeta,
    pub layers: Vec<LayerSummary>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl GenerationResponse {
    pub fn is_complete_failure(&self) -> bool {
        self.meta.tier.is_none()
    }
}
