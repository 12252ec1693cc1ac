//! Document Generators
//!
//! The upstream seam plus the local tiers the orchestrator falls back to.

pub mod basic;
pub mod legacy;
pub mod rule_based;
pub mod shapes;
pub mod upstream;

pub use basic::{basic_shapes_document, BasicShape};
pub use legacy::{convert_legacy_svg, parse_legacy_svg, LegacyParseError};
pub use rule_based::{Palette, RuleBasedDocument, RuleBasedGenerator, ShapeKind};
pub use upstream::{DocumentGenerator, GenerationFailure, OfflineGenerator};

/// Lowercased alphanumeric words of a prompt.
pub(crate) fn prompt_words(prompt: &str) -> Vec<String> {
    prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
