//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ulsvg_core::{
    canvas::{clamp_coordinates, AspectRatio, CANONICAL_MAX},
    document::SizeSpec,
    generate::rule_based::RuleBasedGenerator,
    hashing::canonical_json,
    layers::LayerAnalyzer,
    orchestrator::{ClassifiedError, ErrorClass},
    regions::STANDARD_REGIONS,
    CoordinateMapper, DocumentGenerator, DocumentValidator, GenerationFailure, GenerationOrchestrator,
    GenerationRequest, LayoutSpecification, PathCommand, PathStyle, RegionResolver, RetryPolicy, Tier,
    UnifiedLayer, UnifiedLayeredDocument, UnifiedPath, ValidateOptions,
};

fn sample_document() -> UnifiedLayeredDocument {
    UnifiedLayeredDocument::new(
        AspectRatio::Square,
        vec![UnifiedLayer::new(
            "bg",
            "Background",
            vec![UnifiedPath::new(
                "bg_fill",
                PathStyle::filled("#ffffff"),
                vec![
                    PathCommand::move_to(0.0, 0.0),
                    PathCommand::line_to(512.0, 0.0),
                    PathCommand::line_to(512.0, 512.0),
                    PathCommand::close(),
                ],
            )],
        )
        .with_layout(LayoutSpecification::new("full_canvas", "center"))],
    )
}

// --- Test Generators ---

/// Fails every call with the same message.
struct AlwaysFails {
    message: &'static str,
    calls: AtomicU32,
}

impl AlwaysFails {
    fn new(message: &'static str) -> Self {
        Self { message, calls: AtomicU32::new(0) }
    }
}

#[async_trait]
impl DocumentGenerator for AlwaysFails {
    async fn generate_document(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<UnifiedLayeredDocument, GenerationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GenerationFailure::new(self.message))
    }

    async fn generate_layered_svg(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<String, GenerationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GenerationFailure::new(self.message))
    }
}

/// Network failures for the first `failures` calls, then a valid document.
struct Flaky {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl DocumentGenerator for Flaky {
    async fn generate_document(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<UnifiedLayeredDocument, GenerationFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(GenerationFailure::new("Network error: connection reset"))
        } else {
            Ok(sample_document())
        }
    }
}

/// Never answers within any reasonable timeout.
struct Hanging;

#[async_trait]
impl DocumentGenerator for Hanging {
    async fn generate_document(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<UnifiedLayeredDocument, GenerationFailure> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(sample_document())
    }

    async fn generate_layered_svg(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<String, GenerationFailure> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(GenerationFailure::new("unreachable"))
    }
}

/// Returns an invalid unified document, then valid legacy markup, and
/// records the feedback it was handed.
struct NeedsCorrection {
    feedback_seen: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl DocumentGenerator for NeedsCorrection {
    async fn generate_document(
        &self,
        _request: &GenerationRequest,
        _feedback: Option<&str>,
    ) -> Result<UnifiedLayeredDocument, GenerationFailure> {
        Ok(UnifiedLayeredDocument::new(AspectRatio::Square, vec![]))
    }

    async fn generate_layered_svg(
        &self,
        _request: &GenerationRequest,
        feedback: Option<&str>,
    ) -> Result<String, GenerationFailure> {
        if let Ok(mut seen) = self.feedback_seen.lock() {
            seen.push(feedback.map(str::to_string));
        }
        Ok(r##"<svg viewBox="0 0 100 100"><g id="sun" data-label="Sun subject"><circle cx="50" cy="50" r="20" fill="#ffcc00"/></g></svg>"##.to_string())
    }
}

// --- Layout Properties ---

#[test]
fn invariant_standard_regions_inside_unit_square() {
    for (name, r) in STANDARD_REGIONS.iter() {
        assert!(r.x >= 0.0 && r.y >= 0.0, "{}", name);
        assert!(r.x + r.width <= 1.01, "{}", name);
        assert!(r.y + r.height <= 1.01, "{}", name);
    }
}

#[test]
fn invariant_normalized_pixel_round_trip() {
    for ratio in AspectRatio::ALL {
        let resolver = RegionResolver::new(ratio);
        for i in 0..=10 {
            for j in 0..=10 {
                let (x, y) = (i as f64 / 10.0, j as f64 / 10.0);
                let p = resolver.normalized_to_pixel(x, y);
                let back = resolver.pixel_to_normalized(p.x, p.y);
                assert!((back.x - x).abs() < 1e-5 && (back.y - y).abs() < 1e-5);
            }
        }
    }
}

#[test]
fn invariant_region_bounds_survive_ratio_change() {
    let mut resolver = RegionResolver::new(AspectRatio::Square);
    let before = resolver.region_bounds("top_right");
    let pixels_before = resolver.pixel_bounds("top_right").unwrap();

    resolver.update_aspect_ratio(AspectRatio::Widescreen);

    assert_eq!(resolver.region_bounds("top_right"), before);
    assert_ne!(resolver.pixel_bounds("top_right").unwrap(), pixels_before);
}

#[test]
fn invariant_clamp_stays_on_canvas() {
    let samples = [-1e9, -1.0, 0.0, 100.0, 511.9, 512.0, 800.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN];
    for ratio in AspectRatio::ALL {
        let (w, h) = ratio.dimensions();
        for x in samples {
            for y in samples {
                let (cx, cy) = clamp_coordinates(x, y, ratio);
                assert!((0.0..=w).contains(&cx), "{:?} x={} -> {}", ratio, x, cx);
                assert!((0.0..=h).contains(&cy), "{:?} y={} -> {}", ratio, y, cy);
            }
        }
    }
}

#[test]
fn invariant_center_region_pixels() {
    let bounds = RegionResolver::new(AspectRatio::Square).pixel_bounds("center").unwrap();
    assert!((bounds.x - 168.96).abs() < 1e-6);
    assert!((bounds.y - 168.96).abs() < 1e-6);
    assert!((bounds.width - 174.08).abs() < 1e-6);
    assert!((bounds.height - 174.08).abs() < 1e-6);
}

#[test]
fn invariant_relative_size_centered() {
    let mapper = CoordinateMapper::new(RegionResolver::new(AspectRatio::Square));
    let spec = LayoutSpecification::new("center", "center").with_size(SizeSpec::relative(0.6));
    let result = mapper.calculate_position(&spec).unwrap();
    let c = result.bounds.center();
    assert!((c.x - 256.0).abs() < 1e-6 && (c.y - 256.0).abs() < 1e-6);
    assert!((result.bounds.width - 0.6 * 174.08).abs() < 1e-6);
}

// --- Validation Properties ---

#[test]
fn invariant_auto_fix_clamps_coordinates() {
    let mut doc = sample_document();
    doc.layers[0].paths[0].commands = vec![
        PathCommand::move_to(-40.0, 900.0),
        PathCommand::cubic_to(600.0, 10.0, 20.0, 1e6, 513.0, 512.5),
        PathCommand::close(),
    ];

    let report = DocumentValidator::new().validate(&doc, ValidateOptions::auto_fix());

    assert!(report.auto_fix_applied);
    let fixed = report.fixed_document.as_ref().unwrap();
    for cmd in fixed.layers.iter().flat_map(|l| l.paths.iter()).flat_map(|p| p.commands.iter()) {
        assert!(cmd.coords.iter().all(|c| (0.0..=CANONICAL_MAX).contains(c)));
    }
}

#[test]
fn invariant_auto_fix_idempotent() {
    let mut doc = sample_document();
    doc.layers[0].paths[0].id = String::new();
    doc.layers[0].paths[0].commands[1] = PathCommand::line_to(700.0, -3.0);

    let validator = DocumentValidator::new();
    let once = validator.validate(&doc, ValidateOptions::auto_fix());
    let fixed = once.effective_document(&doc).clone();
    let twice = validator.validate(&fixed, ValidateOptions::auto_fix());

    assert!(once.success);
    assert!(!twice.auto_fix_applied);
    assert_eq!(twice.effective_document(&fixed), &fixed);
}

#[test]
fn invariant_duplicate_layer_ids_rejected() {
    let layer = sample_document().layers.remove(0);
    let mut other = layer.clone();
    other.id = "dup".to_string();
    let mut first = layer;
    first.id = "dup".to_string();

    let result = LayerAnalyzer::new().validate_layers(&[first, other]);

    assert!(!result.valid);
    assert!(result.errors.iter().any(|e| e.contains("Duplicate layer ID: dup")));
}

#[test]
fn invariant_canonical_json_deterministic() {
    use serde_json::json;

    let obj1 = json!({"z": 1, "a": 2, "m": {"b": 1, "a": 2}});
    let obj2 = json!({"a": 2, "m": {"a": 2, "b": 1}, "z": 1});

    // Must be identical despite different input ordering
    assert_eq!(canonical_json(&obj1).unwrap(), canonical_json(&obj2).unwrap());
}

// --- Generation Properties ---

#[test]
fn invariant_rule_based_deterministic() {
    let mut request = GenerationRequest::new("a house on a hill");
    request.seed = Some(1234);
    request.palette = Some(vec!["#112233".into(), "#445566".into()]);

    let generator = RuleBasedGenerator::new();
    let a = generator.generate(&request, AspectRatio::Photo).unwrap();
    let b = generator.generate(&request, AspectRatio::Photo).unwrap();

    assert_eq!(
        a.document.to_canonical_json().unwrap(),
        b.document.to_canonical_json().unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn invariant_retry_stops_on_fatal_error() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::default().with_max_attempts(5);
    let start = tokio::time::Instant::now();

    let result: Result<((), u32), _> = ulsvg_core::execute_with_retry(Tier::UnifiedLayered, &policy, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(ClassifiedError::classify("API error: unauthorized")) }
    })
    .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.class, ErrorClass::ApiError);
    assert_eq!(failure.attempts, 1);
    assert!(failure.delays.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn invariant_retry_backs_off_on_recoverable_error() {
    let policy = RetryPolicy::default().with_max_attempts(3);

    let result: Result<((), u32), _> = ulsvg_core::execute_with_retry(Tier::RuleBased, &policy, |n| async move {
        Err(ClassifiedError::classify(format!("strange failure #{}", n)))
    })
    .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.class, ErrorClass::Unknown);
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.delays, vec![Duration::from_millis(1000), Duration::from_millis(2000)]);
    assert_eq!(failure.message, "strange failure #3");
}

#[tokio::test(start_paused = true)]
async fn invariant_orchestrator_never_fails() {
    let generator = Arc::new(AlwaysFails::new("API error: upstream exploded"));
    let orchestrator = GenerationOrchestrator::new(generator.clone());

    // Only the first tier allowed: complete failure, still a response
    let mut request = GenerationRequest::new("anything at all");
    request.fallback_enabled = Some(false);
    let response = orchestrator.handle_generation_with_fallbacks(&request).await;

    assert!(response.is_complete_failure());
    assert!(response.svg.contains("Generation failed"));
    assert!(response.svg.starts_with("<svg"));
    assert!(!response.errors.is_empty());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    // Full chain: the basic-shapes tier always answers
    let response = orchestrator
        .handle_generation_with_fallbacks(&GenerationRequest::new("anything at all"))
        .await;
    assert_eq!(response.meta.tier.as_deref(), Some("basic-shapes"));
    assert!(response.errors.is_empty());
    assert!(response.warnings.iter().any(|w| w.contains("unified-layered failed")));
    assert!(response.warnings.iter().any(|w| w.contains("rule-based failed")));
}

#[tokio::test(start_paused = true)]
async fn invariant_recoverable_upstream_retried() {
    let generator = Arc::new(Flaky { failures: 2, calls: AtomicU32::new(0) });
    let orchestrator = GenerationOrchestrator::new(generator.clone());
    let mut request = GenerationRequest::new("white square");
    request.max_retries = Some(3);
    let start = tokio::time::Instant::now();

    let response = orchestrator.handle_generation_with_fallbacks(&request).await;

    assert_eq!(response.meta.tier.as_deref(), Some("unified-layered"));
    assert_eq!(response.meta.attempts, 3);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= Duration::from_millis(3000));
    assert_eq!(response.layers[0].id, "bg");
    assert_eq!(orchestrator.error_summary().total, 0);
}

#[tokio::test(start_paused = true)]
async fn invariant_timeouts_are_recoverable_then_advance() {
    let orchestrator = GenerationOrchestrator::new(Arc::new(Hanging));
    let mut request = GenerationRequest::new("a sun");
    request.timeout_ms = Some(50);
    request.max_retries = Some(2);

    let response = orchestrator.handle_generation_with_fallbacks(&request).await;

    assert_eq!(response.meta.tier.as_deref(), Some("rule-based"));
    assert_eq!(response.meta.attempts, 5);
    assert!(response.warnings.iter().any(|w| w.contains("[Timeout]")));
    let summary = orchestrator.error_summary();
    assert_eq!(summary.by_class.get("Timeout"), Some(&2));
    assert_eq!(summary.by_tier.get("layered-only"), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn invariant_validation_feedback_replayed() {
    let generator = Arc::new(NeedsCorrection { feedback_seen: Mutex::new(vec![]) });
    let orchestrator = GenerationOrchestrator::new(generator.clone());

    let response = orchestrator
        .handle_generation_with_fallbacks(&GenerationRequest::new("sun"))
        .await;

    assert_eq!(response.meta.tier.as_deref(), Some("layered-only"));
    assert_eq!(response.layers[0].id, "sun");
    assert_eq!(response.layers[0].kind, "subject");
    let seen = generator.feedback_seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].as_deref().unwrap_or_default().contains("CRITICAL"));
}

#[tokio::test(start_paused = true)]
async fn invariant_same_seed_same_artifact() {
    let orchestrator = GenerationOrchestrator::new(Arc::new(AlwaysFails::new("API error: offline")));
    let mut request = GenerationRequest::new("a tall tree");
    request.aspect_ratio = Some("9:16".into());
    request.seed = Some(99);

    let a = orchestrator.handle_generation_with_fallbacks(&request).await;
    let b = orchestrator.handle_generation_with_fallbacks(&request).await;

    assert_eq!(a.svg, b.svg);
    assert_eq!(a.meta.width, 288.0);
    assert_eq!(a.meta.height, 512.0);
    assert_ne!(a.meta.generation_id, b.meta.generation_id);
}

#[cfg(feature = "test-hooks")]
#[tokio::test(start_paused = true)]
async fn invariant_generation_validates_output() {
    use ulsvg_core::validation::get_validation_call_count;

    let orchestrator = GenerationOrchestrator::new(Arc::new(AlwaysFails::new("API error: offline")));
    let before = get_validation_call_count();

    let response = orchestrator
        .handle_generation_with_fallbacks(&GenerationRequest::new("star"))
        .await;

    assert_eq!(response.meta.tier.as_deref(), Some("rule-based"));
    assert!(get_validation_call_count() > before);
}
