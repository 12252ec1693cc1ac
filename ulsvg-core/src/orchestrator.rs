//! Generation Orchestrator - Tiered Fallback with Retry
//!
//! Tiers run strictly in order, never in parallel:
//! `unified-layered → layered-only → rule-based → basic-shapes`.
//! Each tier attempt returns an explicit `Result`; the error class decides
//! between retrying with backoff and advancing to the next tier. The
//! basic-shapes tier cannot fail, and the orchestrator never returns an
//! error to its caller.
//!
//! A timeout only stops waiting on the in-flight upstream call. Whatever
//! side effects that call already started are not rolled back, so a
//! non-idempotent upstream may see the same request more than once.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cache::SharedCache;
use crate::canvas::AspectRatio;
use crate::config::{EngineConfig, RetryConfig};
use crate::document::UnifiedLayeredDocument;
use crate::generate::{
    basic_shapes_document, convert_legacy_svg, DocumentGenerator, GenerationFailure, RuleBasedGenerator,
};
use crate::layers::{layer_purpose, LayerAnalyzer};
use crate::render::{placeholder_svg, render_document};
use crate::request::{GenerationRequest, GenerationResponse, LayerSummary, ResponseMeta};
use crate::validation::{document_ratio, model_feedback_text, DocumentValidator, ValidateOptions};

// --- Tiers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    UnifiedLayered,
    LayeredOnly,
    RuleBased,
    BasicShapes,
}

impl Tier {
    pub const ORDER: [Tier; 4] = [Tier::UnifiedLayered, Tier::LayeredOnly, Tier::RuleBased, Tier::BasicShapes];

    pub fn name(self) -> &'static str {
        match self {
            Tier::UnifiedLayered => "unified-layered",
            Tier::LayeredOnly => "layered-only",
            Tier::RuleBased => "rule-based",
            Tier::BasicShapes => "basic-shapes",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// --- Error Classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorClass {
    ApiError,
    Timeout,
    RateLimit,
    JsonParse,
    Validation,
    Coordinate,
    Layout,
    Network,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Retry,
    Advance,
}

impl ErrorClass {
    /// What a tier does after an attempt fails with this class.
    pub fn transition(self) -> Transition {
        match self {
            ErrorClass::Timeout | ErrorClass::RateLimit | ErrorClass::Network | ErrorClass::Unknown => {
                Transition::Retry
            }
            ErrorClass::ApiError
            | ErrorClass::JsonParse
            | ErrorClass::Validation
            | ErrorClass::Coordinate
            | ErrorClass::Layout => Transition::Advance,
        }
    }

    pub fn is_recoverable(self) -> bool {
        self.transition() == Transition::Retry
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Checked in order; the first class with a matching keyword wins.
const CLASSIFICATION_RULES: [(ErrorClass, &[&str]); 8] = [
    (ErrorClass::Timeout, &["timeout", "timed out", "etimedout", "deadline"]),
    (ErrorClass::RateLimit, &["rate limit", "ratelimit", "too many requests", "429"]),
    (ErrorClass::Network, &["network", "econnrefused", "econnreset", "enotfound", "connection", "socket", "fetch failed"]),
    (ErrorClass::Validation, &["validation", "invalid document", "schema"]),
    (ErrorClass::Coordinate, &["coordinate", "out of bounds"]),
    (ErrorClass::Layout, &["layout", "region", "anchor"]),
    (ErrorClass::JsonParse, &["json", "parse", "unexpected token", "syntax"]),
    (ErrorClass::ApiError, &["api", "status code", "unauthorized", "forbidden", "bad request", "quota"]),
];

pub fn classify_error(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(class, _)| *class)
        .unwrap_or(ErrorClass::Unknown)
}

/// A failed attempt, with its class already decided.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub message: String,
    /// Correction hints for the next upstream call, from validation.
    pub feedback: Option<String>,
}

impl ClassifiedError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            feedback: None,
        }
    }

    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify_error(&message), message)
    }
}

impl From<GenerationFailure> for ClassifiedError {
    fn from(failure: GenerationFailure) -> Self {
        ClassifiedError::classify(failure.message)
    }
}

/// A tier gave up: either a fatal class or attempts exhausted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{tier} failed after {attempts} attempt(s) [{class}]: {message}")]
pub struct TierFailure {
    pub tier: Tier,
    pub class: ErrorClass,
    pub message: String,
    pub attempts: u32,
    /// Backoff sleeps taken between attempts.
    pub delays: Vec<Duration>,
    pub feedback: Option<String>,
}

// --- Retry ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            timeout: config.timeout(),
        }
    }

    /// Config defaults with the request's own overrides applied.
    pub fn for_request(config: &RetryConfig, request: &GenerationRequest) -> Self {
        let mut policy = Self::from_config(config);
        if let Some(n) = request.max_retries {
            policy.max_attempts = n;
        }
        if let Some(ms) = request.timeout_ms {
            policy.timeout = Duration::from_millis(ms);
        }
        policy
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Sleep before attempt `failed_attempt + 1`: `min(base·2^(n−1), max)`.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs `attempt` until it succeeds, fails with a non-recoverable class, or
/// the policy's attempts run out. Each call is raced against the policy
/// timeout. `attempt` receives the 1-based attempt number.
///
/// Returns the value and the number of attempts used.
pub async fn execute_with_retry<T, F, Fut>(
    tier: Tier,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<(T, u32), TierFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClassifiedError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = vec![];
    let mut n = 0;
    loop {
        n += 1;
        let outcome = match tokio::time::timeout(policy.timeout, attempt(n)).await {
            Ok(result) => result,
            Err(_) => Err(ClassifiedError::new(
                ErrorClass::Timeout,
                format!("Timeout: attempt {} exceeded {} ms", n, policy.timeout.as_millis()),
            )),
        };
        let err = match outcome {
            Ok(value) => return Ok((value, n)),
            Err(err) => err,
        };

        if !err.class.is_recoverable() || n >= max_attempts {
            return Err(TierFailure {
                tier,
                class: err.class,
                message: err.message,
                attempts: n,
                delays,
                feedback: err.feedback,
            });
        }
        let delay = policy.backoff_delay(n);
        warn!(
            "{} attempt {}/{} failed [{}]: {}; retrying in {:?}",
            tier, n, max_attempts, err.class, err.message, delay
        );
        delays.push(delay);
        tokio::time::sleep(delay).await;
    }
}

// --- Error Log ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub generation_id: String,
    pub tier: Tier,
    pub class: ErrorClass,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total: usize,
    pub by_class: BTreeMap<String, usize>,
    pub by_tier: BTreeMap<String, usize>,
    pub most_recent: Option<DateTime<Utc>>,
}

/// Bounded log of tier failures. The oldest entry goes first when full.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    capacity: usize,
    entries: VecDeque<ErrorLogEntry>,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn record(&mut self, entry: ErrorLogEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ErrorLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn error_summary(&self) -> ErrorSummary {
        let mut summary = ErrorSummary {
            total: self.entries.len(),
            ..ErrorSummary::default()
        };
        for entry in &self.entries {
            *summary.by_class.entry(entry.class.to_string()).or_default() += 1;
            *summary.by_tier.entry(entry.tier.to_string()).or_default() += 1;
        }
        summary.most_recent = self.entries.back().map(|e| e.timestamp);
        summary
    }
}

// --- Feature Flags ---

/// Flag gating the unified-layered tier.
pub const UNIFIED_LAYERED_FLAG: &str = "unified_layered_generation";

pub trait FeatureFlags: Send + Sync {
    fn is_enabled(&self, flag: &str, user_id: Option<&str>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllEnabled;

impl FeatureFlags for AllEnabled {
    fn is_enabled(&self, _flag: &str, _user_id: Option<&str>) -> bool {
        true
    }
}

// --- Orchestrator ---

/// A validated document ready to become a response.
struct TierOutput {
    document: UnifiedLayeredDocument,
    palette: Vec<String>,
    description: String,
    warnings: Vec<String>,
}

pub struct GenerationOrchestrator {
    generator: Arc<dyn DocumentGenerator>,
    validator: DocumentValidator,
    rule_based: RuleBasedGenerator,
    flags: Arc<dyn FeatureFlags>,
    config: EngineConfig,
    error_log: Mutex<ErrorLog>,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn DocumentGenerator>) -> Self {
        Self::with_config(generator, EngineConfig::default())
    }

    pub fn with_config(generator: Arc<dyn DocumentGenerator>, config: EngineConfig) -> Self {
        Self {
            generator,
            validator: DocumentValidator::with_thresholds(config.validation.clone()),
            rule_based: RuleBasedGenerator::new(),
            flags: Arc::new(AllEnabled),
            error_log: Mutex::new(ErrorLog::new(config.orchestrator.error_log_capacity)),
            config,
        }
    }

    pub fn with_feature_flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = flags;
        self
    }

    /// Memoizes validation reports in `cache`.
    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.validator = self.validator.with_cache(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn error_summary(&self) -> ErrorSummary {
        match self.error_log.lock() {
            Ok(log) => log.error_summary(),
            Err(poisoned) => poisoned.into_inner().error_summary(),
        }
    }

    /// Most recent log entries, newest last.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorLogEntry> {
        let log = match self.error_log.lock() {
            Ok(log) => log,
            Err(poisoned) => poisoned.into_inner(),
        };
        let skip = log.len().saturating_sub(limit);
        log.entries().skip(skip).cloned().collect()
    }

    fn record_failure(&self, generation_id: &str, failure: &TierFailure) {
        let entry = ErrorLogEntry {
            timestamp: Utc::now(),
            generation_id: generation_id.to_string(),
            tier: failure.tier,
            class: failure.class,
            message: failure.message.clone(),
            attempts: failure.attempts,
        };
        match self.error_log.lock() {
            Ok(mut log) => log.record(entry),
            Err(poisoned) => poisoned.into_inner().record(entry),
        }
    }

    /// Tiers this request may use, in order.
    pub fn tiers_for(&self, request: &GenerationRequest) -> Vec<Tier> {
        let unified = self.flags.is_enabled(UNIFIED_LAYERED_FLAG, request.user_id.as_deref());
        let mut tiers: Vec<Tier> = Tier::ORDER
            .into_iter()
            .filter(|t| *t != Tier::UnifiedLayered || unified)
            .collect();
        if !request.fallback_enabled() {
            tiers.truncate(1);
        }
        tiers
    }

    /// Always produces a response: the first tier to succeed, or a
    /// placeholder carrying every failure when all tiers fail.
    pub async fn handle_generation_with_fallbacks(&self, request: &GenerationRequest) -> GenerationResponse {
        let generation_id = Uuid::new_v4().to_string();
        let ratio = request.resolve_aspect_ratio();
        let policy = RetryPolicy::for_request(&self.config.retry, request);
        let mut warnings: Vec<String> = vec![];
        let mut failures: Vec<String> = vec![];
        let mut feedback: Option<String> = None;
        let mut total_attempts = 0;

        info!("generation {} started (ratio {}, seed {})", generation_id, ratio, request.effective_seed());

        for tier in self.tiers_for(request) {
            debug!("generation {} trying tier {}", generation_id, tier);
            let result = match tier {
                Tier::UnifiedLayered => self.run_unified(request, ratio, &policy, feedback.as_deref()).await,
                Tier::LayeredOnly => self.run_layered_only(request, ratio, &policy, feedback.as_deref()).await,
                Tier::RuleBased => self.run_rule_based(request, ratio, &policy).await,
                Tier::BasicShapes => Ok((self.run_basic(request, ratio), 1)),
            };
            match result {
                Ok((output, attempts)) => {
                    total_attempts += attempts;
                    info!(
                        "generation {} succeeded on tier {} after {} attempt(s)",
                        generation_id, tier, total_attempts
                    );
                    if tier != Tier::UnifiedLayered {
                        warnings.push(format!("Fell back to {} generation", tier));
                    }
                    warnings.extend(output.warnings.iter().cloned());
                    return self.build_response(request, tier, total_attempts, output, generation_id, warnings);
                }
                Err(failure) => {
                    total_attempts += failure.attempts;
                    warn!("generation {}: {}", generation_id, failure);
                    self.record_failure(&generation_id, &failure);
                    let line = failure.to_string();
                    warnings.push(line.clone());
                    failures.push(line);
                    if failure.feedback.is_some() {
                        feedback = failure.feedback;
                    }
                }
            }
        }

        warn!("generation {}: every tier failed", generation_id);
        failures.push("All generation tiers failed".to_string());
        self.placeholder_response(request, ratio, total_attempts, generation_id, warnings, failures)
    }

    /// Validates with auto-fix; any remaining error fails the attempt with
    /// feedback for the next upstream call.
    fn accept(&self, document: UnifiedLayeredDocument) -> Result<(UnifiedLayeredDocument, Vec<String>), ClassifiedError> {
        let report = self.validator.validate(&document, ValidateOptions::auto_fix());
        if report.has_errors() {
            let mut err = ClassifiedError::new(
                ErrorClass::Validation,
                format!("Validation failed: {}", report.error_summary()),
            );
            err.feedback = Some(model_feedback_text(&report));
            return Err(err);
        }
        let mut notes: Vec<String> = report.warnings.iter().map(|w| w.message.clone()).collect();
        if report.auto_fix_applied {
            notes.push("Document was auto-fixed".to_string());
        }
        let document = report.fixed_document.unwrap_or(document);
        Ok((document, notes))
    }

    async fn run_unified(
        &self,
        request: &GenerationRequest,
        ratio: AspectRatio,
        policy: &RetryPolicy,
        feedback: Option<&str>,
    ) -> Result<(TierOutput, u32), TierFailure> {
        execute_with_retry(Tier::UnifiedLayered, policy, move |_| async move {
            let document = self.generator.generate_document(request, feedback).await?;
            let (document, warnings) = self.accept(document)?;
            Ok::<_, ClassifiedError>(self.upstream_output(document, warnings, ratio))
        })
        .await
    }

    async fn run_layered_only(
        &self,
        request: &GenerationRequest,
        ratio: AspectRatio,
        policy: &RetryPolicy,
        feedback: Option<&str>,
    ) -> Result<(TierOutput, u32), TierFailure> {
        execute_with_retry(Tier::LayeredOnly, policy, move |_| async move {
            let markup = self.generator.generate_layered_svg(request, feedback).await?;
            let document = convert_legacy_svg(&markup, ratio)
                .map_err(|e| ClassifiedError::new(ErrorClass::JsonParse, format!("Parse error: {}", e)))?;
            let (document, warnings) = self.accept(document)?;
            Ok::<_, ClassifiedError>(self.upstream_output(document, warnings, ratio))
        })
        .await
    }

    async fn run_rule_based(
        &self,
        request: &GenerationRequest,
        ratio: AspectRatio,
        policy: &RetryPolicy,
    ) -> Result<(TierOutput, u32), TierFailure> {
        let policy = policy.with_max_attempts(self.config.orchestrator.rule_based_retries);
        execute_with_retry(Tier::RuleBased, &policy, move |_| async move {
            let out = self.rule_based.generate(request, ratio)?;
            let (document, warnings) = self.accept(out.document)?;
            Ok::<_, ClassifiedError>(TierOutput {
                document,
                palette: out.palette.colors(),
                description: out.description,
                warnings,
            })
        })
        .await
    }

    fn run_basic(&self, request: &GenerationRequest, ratio: AspectRatio) -> TierOutput {
        let (document, palette) = basic_shapes_document(request, ratio);
        let report = self.validator.validate(&document, ValidateOptions::auto_fix());
        let mut warnings: Vec<String> = report.errors.iter().map(|e| e.message.clone()).collect();
        warnings.extend(report.warnings.iter().map(|w| w.message.clone()));
        TierOutput {
            document: report.fixed_document.unwrap_or(document),
            palette,
            description: format!("Basic shape for \"{}\"", request.prompt),
            warnings,
        }
    }

    fn upstream_output(&self, document: UnifiedLayeredDocument, warnings: Vec<String>, ratio: AspectRatio) -> TierOutput {
        let palette = document_palette(&document);
        let description = format!("{} layer(s) on a {} canvas", document.layers.len(), ratio);
        TierOutput {
            document,
            palette,
            description,
            warnings,
        }
    }

    fn build_response(
        &self,
        request: &GenerationRequest,
        tier: Tier,
        attempts: u32,
        output: TierOutput,
        generation_id: String,
        warnings: Vec<String>,
    ) -> GenerationResponse {
        let doc = &output.document;
        let canvas = document_ratio(doc).config();
        let mut analyzer = LayerAnalyzer::with_thresholds(self.config.layers.clone());
        let layers = doc
            .layers
            .iter()
            .map(|layer| {
                let analysis = analyzer.analyze_layer(layer, doc.canvas.width, doc.canvas.height);
                LayerSummary {
                    id: layer.id.clone(),
                    label: layer.label.clone(),
                    kind: layer_purpose(layer).unwrap_or("shape").to_string(),
                    bounds: analysis.bounds,
                }
            })
            .collect();

        GenerationResponse {
            svg: render_document(doc),
            meta: ResponseMeta {
                width: doc.canvas.width,
                height: doc.canvas.height,
                view_box: canvas.view_box,
                palette: output.palette,
                description: output.description,
                seed: request.effective_seed(),
                generation_id,
                tier: Some(tier.to_string()),
                attempts,
            },
            layers,
            warnings,
            errors: vec![],
        }
    }

    fn placeholder_response(
        &self,
        request: &GenerationRequest,
        ratio: AspectRatio,
        attempts: u32,
        generation_id: String,
        warnings: Vec<String>,
        errors: Vec<String>,
    ) -> GenerationResponse {
        let canvas = ratio.config();
        let message = errors.first().cloned().unwrap_or_default();
        GenerationResponse {
            svg: placeholder_svg(&canvas, &message),
            meta: ResponseMeta {
                width: canvas.width,
                height: canvas.height,
                view_box: canvas.view_box.clone(),
                palette: vec![],
                description: "Generation failed".to_string(),
                seed: request.effective_seed(),
                generation_id,
                tier: None,
                attempts,
            },
            layers: vec![],
            warnings,
            errors,
        }
    }
}

/// Distinct fill and stroke colors in document order.
fn document_palette(doc: &UnifiedLayeredDocument) -> Vec<String> {
    let mut colors: Vec<String> = vec![];
    let styles = doc.layers.iter().flat_map(|l| l.paths.iter()).map(|p| &p.style);
    for style in styles {
        for color in [&style.fill, &style.stroke].into_iter().flatten() {
            if color != "none" && !colors.contains(color) {
                colors.push(color.clone());
            }
        }
    }
    colors
}
