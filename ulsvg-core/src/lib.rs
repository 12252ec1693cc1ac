//! ULSVG Core - Unified-Layered SVG Engine
//!
//! Layout, validation and resilient generation for layered vector documents.
//!
//! # Guarantees
//! 1. Coordinates live on a canonical canvas whose longer side is 512
//! 2. Regions and anchors resolve deterministically to pixels
//! 3. Validation findings are data, never errors
//! 4. Auto-fix is idempotent
//! 5. Generation always yields a renderable artifact

pub mod cache;
pub mod canvas;
pub mod config;
pub mod document;
pub mod generate;
pub mod hashing;
pub mod layers;
pub mod mapper;
pub mod orchestrator;
pub mod regions;
pub mod render;
pub mod request;
pub mod validation;

pub use cache::{CacheStore, MemoryCache, SharedCache};
pub use canvas::{AspectRatio, CanvasConfig, Point, Rect};
pub use config::{ConfigError, EngineConfig};
pub use document::{LayoutSpecification, PathCommand, PathStyle, UnifiedLayer, UnifiedLayeredDocument, UnifiedPath};
pub use generate::{DocumentGenerator, GenerationFailure, OfflineGenerator};
pub use layers::{LayerAnalysis, LayerAnalyzer};
pub use mapper::{CoordinateMapper, PositionResult};
pub use orchestrator::{
    classify_error, execute_with_retry, ErrorClass, FeatureFlags, GenerationOrchestrator, RetryPolicy, Tier,
    TierFailure,
};
pub use regions::{Anchor, LayoutError, RegionResolver};
pub use render::render_document;
pub use request::{GenerationRequest, GenerationResponse};
pub use validation::{DocumentValidator, ValidateOptions, ValidationIssue, ValidationReport};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
