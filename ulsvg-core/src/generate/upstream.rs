//! Upstream Generator Seam
//!
//! The natural-language generator is opaque: it returns a document or fails
//! with a message. Failure messages drive error classification.

use async_trait::async_trait;
use thiserror::Error;

use crate::document::UnifiedLayeredDocument;
use crate::request::GenerationRequest;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GenerationFailure {
    pub message: String,
}

impl GenerationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<serde_json::Error> for GenerationFailure {
    fn from(e: serde_json::Error) -> Self {
        GenerationFailure::new(format!("JSON parse error: {}", e))
    }
}

/// Upstream natural-language-to-document generator.
///
/// `feedback` carries validation hints from an earlier attempt on the same
/// request, meant to be replayed into the model prompt.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate_document(
        &self,
        request: &GenerationRequest,
        feedback: Option<&str>,
    ) -> Result<UnifiedLayeredDocument, GenerationFailure>;

    /// Legacy layered SVG markup, converted by the legacy parser.
    async fn generate_layered_svg(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<String, GenerationFailure> {
        Err(GenerationFailure::new("API error: layered SVG generation is not supported"))
    }
}

/// Stand-in when no upstream is configured. Every call fails with a network
/// error so requests fall through to the local tiers.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl DocumentGenerator for OfflineGenerator {
    async fn generate_document(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<UnifiedLayeredDocument, GenerationFailure> {
        Err(GenerationFailure::new("Network error: upstream generator not configured"))
    }

    async fn generate_layered_svg(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<String, GenerationFailure> {
        Err(GenerationFailure::new("Network error: upstream generator not configured"))
    }
}
