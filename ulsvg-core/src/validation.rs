//! Document Validation - Passes, Auto-Fix and Model Feedback
//!
//! Passes produce structured issues; the validator collects them into one
//! report without short-circuiting. Issues are data, never errors.

use chrono::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::cache::{self, SharedCache};
use crate::canvas::{AspectRatio, Rect, CANONICAL_MAX};
use crate::config::ValidationThresholds;
use crate::document::{LayoutSpecification, PathStyle, UnifiedLayeredDocument, DOCUMENT_VERSION};
use crate::hashing::cache_key;
use crate::mapper::resolve_size;
use crate::regions::{check_bounds, is_standard_region, Anchor, RegionResolver};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Structure,
    Style,
    Layout,
    Performance,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueCategory::Structure => "structure",
            IssueCategory::Style => "style",
            IssueCategory::Layout => "layout",
            IssueCategory::Performance => "performance",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// The auto-fix pass can repair this issue mechanically.
    #[serde(default)]
    pub auto_fixable: bool,
}

impl ValidationIssue {
    fn error(category: IssueCategory, message: String) -> Self {
        Self {
            category,
            severity: IssueSeverity::Error,
            message,
            location: None,
            remediation: None,
            auto_fixable: false,
        }
    }

    fn warning(category: IssueCategory, message: String) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            ..Self::error(category, message)
        }
    }

    fn at(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }

    fn remedy(mut self, text: &str) -> Self {
        self.remediation = Some(text.to_string());
        self
    }

    fn fixable(mut self) -> Self {
        self.auto_fixable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateRange {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStatistics {
    pub layer_count: usize,
    pub path_count: usize,
    pub command_count: usize,
    pub regions_used: Vec<String>,
    pub anchors_used: Vec<String>,
    pub coordinate_range: Option<CoordinateRange>,
}

/// Produced fresh by every validation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub success: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub statistics: ValidationStatistics,
    pub auto_fix_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_document: Option<UnifiedLayeredDocument>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Document the report describes: the fixed one if auto-fix ran.
    pub fn effective_document<'a>(
        &'a self,
        original: &'a UnifiedLayeredDocument,
    ) -> &'a UnifiedLayeredDocument {
        self.fixed_document.as_ref().unwrap_or(original)
    }

    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.category, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOptions {
    pub auto_fix: bool,
}

impl ValidateOptions {
    pub fn auto_fix() -> Self {
        Self { auto_fix: true }
    }
}

/// Everything a pass may look at.
pub struct PassContext<'a> {
    pub document: &'a UnifiedLayeredDocument,
    pub resolver: RegionResolver,
    pub thresholds: &'a ValidationThresholds,
}

impl<'a> PassContext<'a> {
    fn new(document: &'a UnifiedLayeredDocument, thresholds: &'a ValidationThresholds) -> Self {
        let mut resolver = RegionResolver::new(document.aspect_ratio().unwrap_or_default());
        // invalid declarations are reported by the layout pass
        for region in document.custom_regions() {
            let _ = resolver.add_custom_region(
                &region.name,
                Rect::new(region.x, region.y, region.width, region.height),
            );
        }
        Self {
            document,
            resolver,
            thresholds,
        }
    }
}

/// One validation pass - produces issues.
pub trait ValidationPass: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &PassContext<'_>) -> Vec<ValidationIssue>;
}

// --- Concrete Passes ---

pub struct StructuralPass;

impl ValidationPass for StructuralPass {
    fn name(&self) -> &'static str { "structure" }

    fn check(&self, ctx: &PassContext<'_>) -> Vec<ValidationIssue> {
        use IssueCategory::Structure;
        let doc = ctx.document;
        let mut issues = vec![];

        if doc.version != DOCUMENT_VERSION {
            issues.push(
                ValidationIssue::error(
                    Structure,
                    format!("Unsupported version '{}', expected '{}'", doc.version, DOCUMENT_VERSION),
                )
                .remedy("Set \"version\" to \"unified-layered-1.0\""),
            );
        }

        let max = ctx.thresholds.max_canvas_dimension;
        for (axis, value) in [("width", doc.canvas.width), ("height", doc.canvas.height)] {
            if !(value > 0.0) || !value.is_finite() {
                issues.push(
                    ValidationIssue::error(Structure, format!("Canvas {} must be positive, got {}", axis, value))
                        .at("canvas".into()),
                );
            } else if value > max {
                issues.push(
                    ValidationIssue::error(Structure, format!("Canvas {} {} exceeds maximum {}", axis, value, max))
                        .at("canvas".into()),
                );
            }
        }

        match doc.aspect_ratio() {
            None => issues.push(
                ValidationIssue::error(
                    Structure,
                    format!("Unsupported aspect ratio '{}'", doc.canvas.aspect_ratio),
                )
                .at("canvas.aspectRatio".into())
                .remedy("Use one of 1:1, 4:3, 16:9, 3:2, 2:3, 9:16"),
            ),
            Some(ratio) => {
                let (w, h) = ratio.dimensions();
                if doc.canvas.width != w || doc.canvas.height != h {
                    issues.push(
                        ValidationIssue::warning(
                            Structure,
                            format!(
                                "Canvas {}x{} differs from canonical {}x{} for {}",
                                doc.canvas.width, doc.canvas.height, w, h, ratio
                            ),
                        )
                        .at("canvas".into()),
                    );
                }
            }
        }

        if doc.layers.is_empty() {
            issues.push(
                ValidationIssue::error(Structure, "Document must contain at least one layer".into())
                    .remedy("Add a layer with at least one path"),
            );
        }

        let mut layer_ids = HashSet::new();
        for (li, layer) in doc.layers.iter().enumerate() {
            let loc = format!("layers[{}]", li);
            if layer.id.trim().is_empty() {
                issues.push(
                    ValidationIssue::error(Structure, format!("Layer {} has an empty id", li))
                        .at(loc.clone())
                        .remedy("Give every layer a unique, non-empty id")
                        .fixable(),
                );
            } else if !layer_ids.insert(layer.id.as_str()) {
                issues.push(
                    ValidationIssue::error(Structure, format!("Duplicate layer id '{}'", layer.id))
                        .at(loc.clone())
                        .remedy("Layer ids must be unique within the document"),
                );
            }
            if layer.paths.is_empty() {
                issues.push(
                    ValidationIssue::error(Structure, format!("Layer '{}' has no paths", layer.id))
                        .at(loc.clone())
                        .remedy("Every layer needs at least one path"),
                );
            }

            let mut path_ids = HashSet::new();
            for (pi, path) in layer.paths.iter().enumerate() {
                let ploc = format!("{}.paths[{}]", loc, pi);
                if path.id.trim().is_empty() {
                    issues.push(
                        ValidationIssue::error(
                            Structure,
                            format!("Path {} in layer '{}' has an empty id", pi, layer.id),
                        )
                        .at(ploc.clone())
                        .remedy("Give every path an id unique within its layer")
                        .fixable(),
                    );
                } else if !path_ids.insert(path.id.as_str()) {
                    issues.push(
                        ValidationIssue::error(
                            Structure,
                            format!("Duplicate path id '{}' in layer '{}'", path.id, layer.id),
                        )
                        .at(ploc.clone()),
                    );
                }
                if path.commands.is_empty() {
                    issues.push(
                        ValidationIssue::error(Structure, format!("Path '{}' has no commands", path.id))
                            .at(ploc)
                            .remedy("Every path needs at least one command, starting with M"),
                    );
                }
            }
        }

        issues
    }
}

pub struct StylePass;

/// `#RRGGBB`, strictly.
pub fn is_hex_color(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}

fn is_valid_paint(value: &Option<String>) -> bool {
    match value.as_deref() {
        None | Some("none") => true,
        Some(v) => is_hex_color(v),
    }
}

const LINECAPS: [&str; 3] = ["butt", "round", "square"];
const LINEJOINS: [&str; 3] = ["miter", "round", "bevel"];

impl StylePass {
    fn check_style(style: &PathStyle, path_id: &str, loc: &str, issues: &mut Vec<ValidationIssue>) {
        use IssueCategory::Style;
        for (prop, value) in [("fill", &style.fill), ("stroke", &style.stroke)] {
            if !is_valid_paint(value) {
                issues.push(
                    ValidationIssue::error(
                        Style,
                        format!(
                            "Path '{}' has invalid {} color '{}'",
                            path_id,
                            prop,
                            value.as_deref().unwrap_or_default()
                        ),
                    )
                    .at(format!("{}.style.{}", loc, prop))
                    .remedy("Colors must be #RRGGBB hex or \"none\""),
                );
            }
        }
        if let Some(width) = style.stroke_width {
            if !(width >= 0.0) || !width.is_finite() {
                issues.push(
                    ValidationIssue::error(
                        Style,
                        format!("Path '{}' has negative strokeWidth {}", path_id, width),
                    )
                    .at(format!("{}.style.strokeWidth", loc))
                    .remedy("strokeWidth must be zero or positive"),
                );
            }
        }
        if let Some(opacity) = style.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                issues.push(
                    ValidationIssue::error(
                        Style,
                        format!("Path '{}' has opacity {} outside [0, 1]", path_id, opacity),
                    )
                    .at(format!("{}.style.opacity", loc))
                    .remedy("opacity must be between 0 and 1"),
                );
            }
        }
        if let Some(cap) = style.stroke_linecap.as_deref() {
            if !LINECAPS.contains(&cap) {
                issues.push(
                    ValidationIssue::warning(Style, format!("Path '{}' has unknown strokeLinecap '{}'", path_id, cap))
                        .at(format!("{}.style.strokeLinecap", loc)),
                );
            }
        }
        if let Some(join) = style.stroke_linejoin.as_deref() {
            if !LINEJOINS.contains(&join) {
                issues.push(
                    ValidationIssue::warning(Style, format!("Path '{}' has unknown strokeLinejoin '{}'", path_id, join))
                        .at(format!("{}.style.strokeLinejoin", loc)),
                );
            }
        }
    }
}

impl ValidationPass for StylePass {
    fn name(&self) -> &'static str { "style" }

    fn check(&self, ctx: &PassContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = vec![];
        for (li, layer) in ctx.document.layers.iter().enumerate() {
            for (pi, path) in layer.paths.iter().enumerate() {
                let loc = format!("layers[{}].paths[{}]", li, pi);
                Self::check_style(&path.style, &path.id, &loc, &mut issues);
            }
        }
        issues
    }
}

pub struct LayoutPass;

impl LayoutPass {
    fn check_spec(
        spec: &LayoutSpecification,
        owner: &str,
        loc: &str,
        ctx: &PassContext<'_>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        use IssueCategory::Layout;
        let known_region = ctx.resolver.has_region(&spec.region);
        if !known_region {
            issues.push(
                ValidationIssue::error(Layout, format!("{} references unknown region '{}'", owner, spec.region))
                    .at(format!("{}.layout.region", loc))
                    .remedy("Use a standard region (e.g. center, top_left, full_canvas) or declare it in layout.customRegions"),
            );
        }
        if spec.anchor.parse::<Anchor>().is_err() {
            issues.push(
                ValidationIssue::error(Layout, format!("{} uses unknown anchor '{}'", owner, spec.anchor))
                    .at(format!("{}.layout.anchor", loc))
                    .remedy("Anchors are top_left, top_center, top_right, middle_left, center, middle_right, bottom_left, bottom_center, bottom_right"),
            );
        }
        for (axis, v) in [("x", spec.offset.x), ("y", spec.offset.y)] {
            if !(-1.0..=1.0).contains(&v) {
                issues.push(
                    ValidationIssue::error(Layout, format!("{} offset.{} = {} is outside [-1, 1]", owner, axis, v))
                        .at(format!("{}.layout.offset", loc))
                        .remedy("Offsets are fractions of the region size between -1 and 1"),
                );
            }
        }
        if let Some(size) = &spec.size {
            let bounds = ctx
                .resolver
                .pixel_bounds(&spec.region)
                .unwrap_or_else(|_| Rect::new(0.0, 0.0, 1.0, 1.0));
            if let Err(e) = resolve_size(size, &bounds) {
                issues.push(
                    ValidationIssue::error(Layout, format!("{}: {}", owner, e))
                        .at(format!("{}.layout.size", loc))
                        .remedy("Set exactly one of absolute, relative or aspect_constrained"),
                );
            }
        }
        if let Some(repeat) = &spec.repeat {
            if repeat.grid.is_some() && repeat.radial.is_some() {
                issues.push(
                    ValidationIssue::error(Layout, format!("{} repeat sets both grid and radial", owner))
                        .at(format!("{}.layout.repeat", loc)),
                );
            }
            let max = ctx.thresholds.max_repeat_instances;
            let counts = [
                repeat.grid.as_ref().map(|g| ("grid", g.count.instances().unwrap_or(u64::MAX))),
                repeat.radial.as_ref().map(|r| ("radial", u64::from(r.count))),
            ];
            for (kind, count) in counts.into_iter().flatten() {
                if count > max {
                    issues.push(
                        ValidationIssue::error(
                            Layout,
                            format!("{} {} repeat expands to {} instances (limit {})", owner, kind, count, max),
                        )
                        .at(format!("{}.layout.repeat.{}", loc, kind))
                        .remedy("Reduce the repeat count or split the pattern across layers"),
                    );
                }
            }
        }
    }
}

impl ValidationPass for LayoutPass {
    fn name(&self) -> &'static str { "layout" }

    fn check(&self, ctx: &PassContext<'_>) -> Vec<ValidationIssue> {
        use IssueCategory::Layout;
        let mut issues = vec![];

        if let Some(layout) = &ctx.document.layout {
            let mut names = HashSet::new();
            for (i, region) in layout.custom_regions.iter().enumerate() {
                let loc = format!("layout.customRegions[{}]", i);
                if region.name.trim().is_empty() {
                    issues.push(ValidationIssue::error(Layout, format!("Custom region {} has an empty name", i)).at(loc));
                    continue;
                }
                if is_standard_region(&region.name) {
                    issues.push(
                        ValidationIssue::error(
                            Layout,
                            format!("Custom region '{}' shadows a standard region", region.name),
                        )
                        .at(loc.clone()),
                    );
                }
                if !names.insert(region.name.as_str()) {
                    issues.push(
                        ValidationIssue::error(Layout, format!("Custom region '{}' is declared twice", region.name))
                            .at(loc.clone()),
                    );
                }
                let bounds = Rect::new(region.x, region.y, region.width, region.height);
                if let Err(e) = check_bounds(&region.name, &bounds) {
                    issues.push(ValidationIssue::error(Layout, e.to_string()).at(loc));
                }
            }
            if let Some(anchor) = &layout.global_anchor {
                if anchor.parse::<Anchor>().is_err() {
                    issues.push(
                        ValidationIssue::error(Layout, format!("Unknown global anchor '{}'", anchor))
                            .at("layout.globalAnchor".into()),
                    );
                }
            }
        }

        for (li, layer) in ctx.document.layers.iter().enumerate() {
            let loc = format!("layers[{}]", li);
            if let Some(spec) = &layer.layout {
                Self::check_spec(spec, &format!("Layer '{}'", layer.id), &loc, ctx, &mut issues);
            }
            for (pi, path) in layer.paths.iter().enumerate() {
                if let Some(spec) = &path.layout {
                    let ploc = format!("{}.paths[{}]", loc, pi);
                    Self::check_spec(spec, &format!("Path '{}'", path.id), &ploc, ctx, &mut issues);
                }
            }
        }
        issues
    }
}

pub struct CommandPass;

impl ValidationPass for CommandPass {
    fn name(&self) -> &'static str { "commands" }

    fn check(&self, ctx: &PassContext<'_>) -> Vec<ValidationIssue> {
        use IssueCategory::{Layout, Structure};
        let mut issues = vec![];
        for (li, layer) in ctx.document.layers.iter().enumerate() {
            for (pi, path) in layer.paths.iter().enumerate() {
                let loc = format!("layers[{}].paths[{}]", li, pi);
                if let Some(first) = path.commands.first() {
                    if first.cmd != "M" {
                        issues.push(
                            ValidationIssue::warning(
                                Structure,
                                format!("Path '{}' starts with '{}' instead of 'M'", path.id, first.cmd),
                            )
                            .at(loc.clone())
                            .remedy("Begin every path with a move-to (M) command"),
                        );
                    }
                }
                for (ci, cmd) in path.commands.iter().enumerate() {
                    let cloc = format!("{}.commands[{}]", loc, ci);
                    let Some(kind) = cmd.kind() else {
                        issues.push(
                            ValidationIssue::error(
                                Structure,
                                format!("Path '{}' command {} has unknown type '{}'", path.id, ci, cmd.cmd),
                            )
                            .at(cloc)
                            .remedy("Only M, L, C, Q and Z commands are supported"),
                        );
                        continue;
                    };
                    if cmd.coords.len() != kind.arity() {
                        issues.push(
                            ValidationIssue::error(
                                Structure,
                                format!(
                                    "Path '{}' command {} ({}) needs {} coordinates, got {}",
                                    path.id,
                                    ci,
                                    cmd.cmd,
                                    kind.arity(),
                                    cmd.coords.len()
                                ),
                            )
                            .at(cloc.clone())
                            .remedy("M/L take 2 numbers, Q takes 4, C takes 6, Z takes none"),
                        );
                    }
                    if cmd.coords.iter().any(|c| !c.is_finite()) {
                        issues.push(
                            ValidationIssue::error(
                                Structure,
                                format!("Path '{}' command {} has a non-finite coordinate", path.id, ci),
                            )
                            .at(cloc.clone()),
                        );
                    } else if let Some(bad) = cmd.coords.iter().find(|c| !(0.0..=CANONICAL_MAX).contains(*c)) {
                        issues.push(
                            ValidationIssue::warning(
                                Layout,
                                format!(
                                    "Path '{}' command {} coordinate {} is outside [0, {}]",
                                    path.id, ci, bad, CANONICAL_MAX
                                ),
                            )
                            .at(cloc)
                            .remedy("Keep all coordinates inside the 512px canonical canvas")
                            .fixable(),
                        );
                    }
                }
            }
        }
        issues
    }
}

pub struct PerformancePass;

impl ValidationPass for PerformancePass {
    fn name(&self) -> &'static str { "performance" }

    fn check(&self, ctx: &PassContext<'_>) -> Vec<ValidationIssue> {
        use IssueCategory::Performance;
        let t = ctx.thresholds;
        let doc = ctx.document;
        let mut issues = vec![];
        if doc.layers.len() > t.max_layers {
            issues.push(
                ValidationIssue::warning(
                    Performance,
                    format!("Document has {} layers (recommended at most {})", doc.layers.len(), t.max_layers),
                )
                .remedy("Merge layers that share a region and style"),
            );
        }
        for layer in &doc.layers {
            if layer.paths.len() > t.max_paths_per_layer {
                issues.push(
                    ValidationIssue::warning(
                        Performance,
                        format!(
                            "Layer '{}' has {} paths (recommended at most {})",
                            layer.id,
                            layer.paths.len(),
                            t.max_paths_per_layer
                        ),
                    )
                    .remedy("Split the layer or combine paths"),
                );
            }
            for path in &layer.paths {
                if path.commands.len() > t.max_commands_per_path {
                    issues.push(
                        ValidationIssue::warning(
                            Performance,
                            format!(
                                "Path '{}' has {} commands (recommended at most {})",
                                path.id,
                                path.commands.len(),
                                t.max_commands_per_path
                            ),
                        )
                        .remedy("Simplify the path geometry"),
                    );
                }
            }
        }
        issues
    }
}

/// Validator runs every pass and applies the auto-fix policy.
pub struct DocumentValidator {
    passes: Vec<Box<dyn ValidationPass>>,
    thresholds: ValidationThresholds,
    cache: Option<SharedCache>,
}

impl DocumentValidator {
    pub fn new() -> Self {
        Self::with_thresholds(ValidationThresholds::default())
    }

    pub fn with_thresholds(thresholds: ValidationThresholds) -> Self {
        Self {
            passes: vec![
                Box::new(StructuralPass),
                Box::new(StylePass),
                Box::new(LayoutPass),
                Box::new(CommandPass),
                Box::new(PerformancePass),
            ],
            thresholds,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn thresholds(&self) -> &ValidationThresholds {
        &self.thresholds
    }

    pub fn validate(&self, document: &UnifiedLayeredDocument, options: ValidateOptions) -> ValidationReport {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        let key = self
            .cache
            .as_ref()
            .and_then(|_| cache_key("validation", &(document, options)).ok());
        if let (Some(store), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache::get_json::<ValidationReport>(store.as_ref(), key) {
                debug!("validation cache hit");
                return hit;
            }
        }

        let report = self.run(document, options);

        if let (Some(store), Some(key)) = (&self.cache, &key) {
            match Duration::try_seconds(self.thresholds.cache_ttl_secs) {
                Some(ttl) => cache::set_json(store.as_ref(), key, &report, Some(ttl)),
                None => debug!("cache TTL {}s out of range, report not cached", self.thresholds.cache_ttl_secs),
            }
        }
        report
    }

    /// Parses and validates model output. Parse failures become a report.
    pub fn validate_json(&self, text: &str, options: ValidateOptions) -> ValidationReport {
        match UnifiedLayeredDocument::from_json(text) {
            Ok(doc) => self.validate(&doc, options),
            Err(e) => ValidationReport {
                success: false,
                errors: vec![ValidationIssue::error(
                    IssueCategory::Structure,
                    format!("Document is not valid JSON for the unified-layered schema: {}", e),
                )
                .remedy("Return a single JSON object matching the unified-layered-1.0 schema")],
                warnings: vec![],
                statistics: ValidationStatistics::default(),
                auto_fix_applied: false,
                fixed_document: None,
            },
        }
    }

    fn run(&self, document: &UnifiedLayeredDocument, options: ValidateOptions) -> ValidationReport {
        let issues = self.collect(document);
        let fixable = issues.iter().any(|i| i.auto_fixable);

        if options.auto_fix && fixable {
            let fixed = auto_fix(document);
            let issues = self.collect(&fixed);
            debug!("auto-fix applied, {} issues remain", issues.len());
            return build_report(issues, &fixed, true, Some(fixed.clone()));
        }
        build_report(issues, document, false, None)
    }

    fn collect(&self, document: &UnifiedLayeredDocument) -> Vec<ValidationIssue> {
        let ctx = PassContext::new(document, &self.thresholds);
        let mut all = vec![];
        for pass in &self.passes {
            let issues = pass.check(&ctx);
            if !issues.is_empty() {
                debug!("{} pass: {} issues", pass.name(), issues.len());
            }
            all.extend(issues);
        }
        all
    }
}

impl Default for DocumentValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn build_report(
    issues: Vec<ValidationIssue>,
    document: &UnifiedLayeredDocument,
    auto_fix_applied: bool,
    fixed_document: Option<UnifiedLayeredDocument>,
) -> ValidationReport {
    let (errors, warnings): (Vec<_>, Vec<_>) = issues
        .into_iter()
        .partition(|i| i.severity == IssueSeverity::Error);
    ValidationReport {
        success: errors.is_empty(),
        errors,
        warnings,
        statistics: statistics(document),
        auto_fix_applied,
        fixed_document,
    }
}

pub fn statistics(document: &UnifiedLayeredDocument) -> ValidationStatistics {
    let mut regions = BTreeSet::new();
    let mut anchors = BTreeSet::new();
    for spec in document.layout_specs() {
        regions.insert(spec.region.clone());
        anchors.insert(spec.anchor.clone());
    }

    let mut range: Option<CoordinateRange> = None;
    for cmd in document
        .layers
        .iter()
        .flat_map(|l| l.paths.iter())
        .flat_map(|p| p.commands.iter())
    {
        for pair in cmd.coords.chunks_exact(2) {
            let (x, y) = (pair[0], pair[1]);
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            range = Some(match range {
                None => CoordinateRange { min_x: x, min_y: y, max_x: x, max_y: y },
                Some(r) => CoordinateRange {
                    min_x: r.min_x.min(x),
                    min_y: r.min_y.min(y),
                    max_x: r.max_x.max(x),
                    max_y: r.max_y.max(y),
                },
            });
        }
    }

    ValidationStatistics {
        layer_count: document.layers.len(),
        path_count: document.path_count(),
        command_count: document.command_count(),
        regions_used: regions.into_iter().collect(),
        anchors_used: anchors.into_iter().collect(),
        coordinate_range: range,
    }
}

/// Mechanical repairs only: synthetic ids for empty ones and coordinate
/// clamping into the canonical canvas.
pub fn auto_fix(document: &UnifiedLayeredDocument) -> UnifiedLayeredDocument {
    let mut doc = document.clone();

    let mut layer_ids: HashSet<String> = doc
        .layers
        .iter()
        .filter(|l| !l.id.trim().is_empty())
        .map(|l| l.id.clone())
        .collect();
    let mut next_layer = 1usize;
    let mut next_path = 1usize;

    for layer in doc.layers.iter_mut() {
        if layer.id.trim().is_empty() {
            layer.id = next_free_id("layer", &mut next_layer, &layer_ids);
            layer_ids.insert(layer.id.clone());
        }
        let mut path_ids: HashSet<String> = layer
            .paths
            .iter()
            .filter(|p| !p.id.trim().is_empty())
            .map(|p| p.id.clone())
            .collect();
        for path in layer.paths.iter_mut() {
            if path.id.trim().is_empty() {
                path.id = next_free_id("path", &mut next_path, &path_ids);
                path_ids.insert(path.id.clone());
            }
            for cmd in path.commands.iter_mut() {
                for c in cmd.coords.iter_mut() {
                    if c.is_finite() {
                        *c = c.clamp(0.0, CANONICAL_MAX);
                    }
                }
            }
        }
    }
    doc
}

fn next_free_id(prefix: &str, counter: &mut usize, taken: &HashSet<String>) -> String {
    loop {
        let candidate = format!("{}_{}", prefix, counter);
        *counter += 1;
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
}

/// Plain-language correction hints for an upstream generator retry.
///
/// Order: errors grouped by category, then other warnings, then performance
/// recommendations.
pub fn generate_model_feedback(report: &ValidationReport) -> Vec<String> {
    let mut hints = vec![];
    for category in [IssueCategory::Structure, IssueCategory::Style, IssueCategory::Layout, IssueCategory::Performance] {
        for issue in report.errors.iter().filter(|e| e.category == category) {
            hints.push(format_hint("CRITICAL", issue));
        }
    }
    for issue in report
        .warnings
        .iter()
        .filter(|w| w.category != IssueCategory::Performance)
    {
        hints.push(format_hint("WARNING", issue));
    }
    for issue in report
        .warnings
        .iter()
        .filter(|w| w.category == IssueCategory::Performance)
    {
        hints.push(format_hint("RECOMMENDATION", issue));
    }
    hints
}

/// Feedback rendered as one prompt fragment.
pub fn model_feedback_text(report: &ValidationReport) -> String {
    let hints = generate_model_feedback(report);
    if hints.is_empty() {
        return "The previous document was valid.".to_string();
    }
    let mut text = String::from("The previous document had problems. Correct them and regenerate:\n");
    for (i, hint) in hints.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, hint));
    }
    text
}

fn format_hint(level: &str, issue: &ValidationIssue) -> String {
    match &issue.remediation {
        Some(fix) => format!("{} [{}] {}. {}.", level, issue.category, issue.message, fix),
        None => format!("{} [{}] {}.", level, issue.category, issue.message),
    }
}

/// Canonical canvas for a document, defaulting to 1:1.
pub fn document_ratio(document: &UnifiedLayeredDocument) -> AspectRatio {
    document.aspect_ratio().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        CustomRegion, DocumentLayout, PathCommand, SizeSpec, UnifiedLayer, UnifiedPath,
    };

    fn path(id: &str, commands: Vec<PathCommand>) -> UnifiedPath {
        UnifiedPath::new(id, PathStyle::filled("#ff0000"), commands)
    }

    fn square() -> Vec<PathCommand> {
        vec![
            PathCommand::move_to(10.0, 10.0),
            PathCommand::line_to(100.0, 10.0),
            PathCommand::line_to(100.0, 100.0),
            PathCommand::close(),
        ]
    }

    fn doc(layers: Vec<UnifiedLayer>) -> UnifiedLayeredDocument {
        UnifiedLayeredDocument::new(AspectRatio::Square, layers)
    }

    fn messages(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.message.as_str()).collect()
    }

    #[test]
    fn test_valid_document() {
        let d = doc(vec![UnifiedLayer::new("bg", "Background", vec![path("p", square())])
            .with_layout(LayoutSpecification::new("full_canvas", "center"))]);
        let report = DocumentValidator::new().validate(&d, ValidateOptions::default());
        assert!(report.success, "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.statistics.command_count, 4);
        assert_eq!(report.statistics.regions_used, vec!["full_canvas".to_string()]);
        let range = report.statistics.coordinate_range.unwrap();
        assert_eq!((range.min_x, range.max_x), (10.0, 100.0));
    }

    #[test]
    fn test_all_passes_run_without_short_circuit() {
        let mut bad = path("p", vec![PathCommand { cmd: "X".into(), coords: vec![] }]);
        bad.style.fill = Some("red".into());
        bad.style.opacity = Some(2.0);
        let mut d = doc(vec![UnifiedLayer::new("l", "L", vec![bad])
            .with_layout(LayoutSpecification::new("moon", "nowhere"))]);
        d.version = "1.0".into();
        let report = DocumentValidator::new().validate(&d, ValidateOptions::default());
        let cats: BTreeSet<_> = report.errors.iter().map(|e| e.category).collect();
        assert!(cats.contains(&IssueCategory::Structure));
        assert!(cats.contains(&IssueCategory::Style));
        assert!(cats.contains(&IssueCategory::Layout));
        assert!(!report.success);
    }

    #[test]
    fn test_hex_color_grammar() {
        assert!(is_hex_color("#A1b2C3"));
        assert!(!is_hex_color("#abc"));
        assert!(!is_hex_color("ff00ff0"));
        assert!(!is_hex_color("#gg0000"));
    }

    #[test]
    fn test_arity_and_first_command() {
        let d = doc(vec![UnifiedLayer::new(
            "l",
            "L",
            vec![path(
                "p",
                vec![
                    PathCommand { cmd: "L".into(), coords: vec![1.0, 1.0] },
                    PathCommand { cmd: "C".into(), coords: vec![1.0, 2.0, 3.0] },
                ],
            )],
        )]);
        let report = DocumentValidator::new().validate(&d, ValidateOptions::default());
        assert!(messages(&report.errors)[0].contains("needs 6 coordinates, got 3"));
        assert!(messages(&report.warnings).iter().any(|m| m.contains("instead of 'M'")));
    }

    #[test]
    fn test_auto_fix_ids_and_coordinates() {
        let d = doc(vec![
            UnifiedLayer::new("", "A", vec![path("", vec![PathCommand::move_to(-20.0, 900.0)])]),
            UnifiedLayer::new("layer_1", "B", vec![path("", square()), path("", square())]),
        ]);
        let report = DocumentValidator::new().validate(&d, ValidateOptions::auto_fix());
        assert!(report.auto_fix_applied);
        assert!(report.success, "{:?}", report.errors);
        let fixed = report.fixed_document.unwrap();
        assert_eq!(fixed.layers[0].id, "layer_2");
        assert_eq!(fixed.layers[0].paths[0].id, "path_1");
        assert_eq!(fixed.layers[1].paths[0].id, "path_2");
        assert_eq!(fixed.layers[1].paths[1].id, "path_3");
        assert_eq!(fixed.layers[0].paths[0].commands[0].coords, vec![0.0, 512.0]);
    }

    #[test]
    fn test_auto_fix_keeps_semantic_errors() {
        let mut p = path("", vec![PathCommand::move_to(600.0, 10.0)]);
        p.style.fill = Some("blue".into());
        let d = doc(vec![UnifiedLayer::new("l", "L", vec![p])]);
        let report = DocumentValidator::new().validate(&d, ValidateOptions::auto_fix());
        assert!(report.auto_fix_applied);
        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].category, IssueCategory::Style);
    }

    #[test]
    fn test_custom_region_declarations() {
        let mut d = doc(vec![UnifiedLayer::new("l", "L", vec![path("p", square())])
            .with_layout(LayoutSpecification::new("sky", "top_center"))]);
        d.layout = Some(DocumentLayout {
            custom_regions: vec![
                CustomRegion { name: "sky".into(), x: 0.0, y: 0.0, width: 1.0, height: 0.4 },
                CustomRegion { name: "center".into(), x: 0.0, y: 0.0, width: 0.5, height: 0.5 },
                CustomRegion { name: "wide".into(), x: 0.5, y: 0.0, width: 0.9, height: 0.5 },
            ],
            global_anchor: Some("center".into()),
        });
        let report = DocumentValidator::new().validate(&d, ValidateOptions::default());
        let msgs = messages(&report.errors);
        assert_eq!(msgs.len(), 2, "{:?}", msgs);
        assert!(msgs.iter().any(|m| m.contains("shadows a standard region")));
        assert!(msgs.iter().any(|m| m.contains("'wide'")));
    }

    #[test]
    fn test_conflicting_size_and_offset() {
        let mut size = SizeSpec::relative(0.5);
        size.aspect_constrained = Some(crate::document::AspectConstrainedSize { width: 10.0, aspect: 1.0 });
        let spec = LayoutSpecification::new("center", "center")
            .with_size(size)
            .with_offset(1.5, 0.0);
        let d = doc(vec![UnifiedLayer::new("l", "L", vec![path("p", square())]).with_layout(spec)]);
        let report = DocumentValidator::new().validate(&d, ValidateOptions::default());
        let msgs = messages(&report.errors);
        assert!(msgs.iter().any(|m| m.contains("mutually exclusive")));
        assert!(msgs.iter().any(|m| m.contains("offset.x")));
    }

    #[test]
    fn test_performance_only_warns() {
        let paths: Vec<_> = (0..21).map(|i| path(&format!("p{}", i), square())).collect();
        let d = doc(vec![UnifiedLayer::new("l", "L", paths)]);
        let report = DocumentValidator::new().validate(&d, ValidateOptions::default());
        assert!(report.success);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].category, IssueCategory::Performance);
    }

    #[test]
    fn test_feedback_order() {
        let mut p = path("p", vec![PathCommand::line_to(1.0, 1.0)]);
        p.style.stroke = Some("#12".into());
        let paths: Vec<_> = std::iter::once(p)
            .chain((0..21).map(|i| path(&format!("q{}", i), square())))
            .collect();
        let mut d = doc(vec![UnifiedLayer::new("l", "L", paths)]);
        d.version = "2".into();
        let report = DocumentValidator::new().validate(&d, ValidateOptions::default());
        let hints = generate_model_feedback(&report);
        assert!(hints[0].starts_with("CRITICAL [structure]"));
        assert!(hints[1].starts_with("CRITICAL [style]"));
        assert!(hints[2].starts_with("WARNING"));
        assert!(hints.last().unwrap().starts_with("RECOMMENDATION [performance]"));
        assert!(model_feedback_text(&report).contains("1. CRITICAL"));
    }

    #[test]
    fn test_invalid_json_reported() {
        let report = DocumentValidator::new().validate_json("{not json", ValidateOptions::default());
        assert!(!report.success);
        assert_eq!(report.errors[0].category, IssueCategory::Structure);
    }

    #[test]
    fn test_cached_report_identical() {
        let store = crate::cache::MemoryCache::shared();
        let validator = DocumentValidator::new().with_cache(store);
        let d = doc(vec![UnifiedLayer::new("l", "L", vec![path("", square())])]);
        let first = validator.validate(&d, ValidateOptions::auto_fix());
        let second = validator.validate(&d, ValidateOptions::auto_fix());
        assert_eq!(first, second);
    }

    #[test]
    fn test_oversized_repeat_reported() {
        use crate::document::{GridCount, GridRepeat, RadialRepeat, RepeatSpec};

        let mut spec = LayoutSpecification::new("center", "center");
        spec.repeat = Some(RepeatSpec {
            grid: Some(GridRepeat { count: GridCount::ColumnsRows([70000, 70000]), spacing: 1.0 }),
            radial: Some(RadialRepeat { count: 5000, radius: 10.0 }),
        });
        let d = doc(vec![UnifiedLayer::new("dots", "Dots", vec![path("p", square())]).with_layout(spec)]);
        let report = DocumentValidator::new().validate(&d, ValidateOptions::auto_fix());
        assert!(!report.success);
        let found = messages(&report.errors);
        assert!(found.iter().any(|m| m.contains("grid repeat expands to 4900000000 instances")), "{:?}", found);
        assert!(found.iter().any(|m| m.contains("radial repeat expands to 5000 instances")), "{:?}", found);
    }

    #[test]
    fn test_out_of_range_cache_ttl_skips_caching() {
        let store = crate::cache::MemoryCache::shared();
        let thresholds = ValidationThresholds {
            cache_ttl_secs: i64::MAX,
            ..ValidationThresholds::default()
        };
        let validator = DocumentValidator::with_thresholds(thresholds).with_cache(store.clone());
        let d = doc(vec![UnifiedLayer::new("l", "L", vec![path("p", square())])]);
        assert!(validator.validate(&d, ValidateOptions::default()).success);
        assert_eq!(store.cleanup().deleted_count, 0);
        let key = cache_key("validation", &(&d, ValidateOptions::default())).unwrap();
        assert!(store.get(&key).is_none());
    }
}
