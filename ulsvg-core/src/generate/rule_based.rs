//! Rule-Based Generation
//!
//! Keyword-matched templates drawn by pure geometry strategies. Output is a
//! function of prompt, palette, aspect ratio and seed only.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::canvas::{AspectRatio, CanvasConfig};
use crate::document::{LayoutSpecification, PathStyle, UnifiedLayer, UnifiedLayeredDocument, UnifiedPath};
use crate::generate::legacy::convert_legacy_svg;
use crate::generate::upstream::GenerationFailure;
use crate::generate::{prompt_words, shapes};
use crate::request::GenerationRequest;
use crate::validation::is_hex_color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Circle,
    Rect,
    Star,
    /// Drawn from layered markup instead of a geometry strategy.
    Generic,
}

#[derive(Debug, Clone, Copy)]
pub struct ShapeTemplate {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub kind: ShapeKind,
    /// Layered markup on a 100x100 view box; only for `Generic`.
    pub markup: Option<&'static str>,
}

impl ShapeTemplate {
    fn matches(&self, word: &str) -> bool {
        self.keywords
            .iter()
            .any(|kw| word == *kw || word.strip_suffix('s') == Some(*kw))
    }
}

const HOUSE_MARKUP: &str = r#"<svg viewBox="0 0 100 100">
  <g id="background" data-label="Background sky"><rect x="0" y="0" width="100" height="100" fill="{background}"/></g>
  <g id="ground" data-label="Ground background"><rect x="0" y="80" width="100" height="20" fill="{secondary}"/></g>
  <g id="house" data-label="House subject">
    <rect id="walls" x="30" y="50" width="40" height="30" fill="{primary}"/>
    <polygon id="roof" points="25,50 50,28 75,50" fill="{accent}"/>
    <rect id="door" x="45" y="64" width="10" height="16" fill="{secondary}"/>
  </g>
</svg>"#;

const TREE_MARKUP: &str = r#"<svg viewBox="0 0 100 100">
  <g id="background" data-label="Background sky"><rect x="0" y="0" width="100" height="100" fill="{background}"/></g>
  <g id="ground" data-label="Ground background"><rect x="0" y="82" width="100" height="18" fill="{secondary}"/></g>
  <g id="tree" data-label="Tree subject">
    <rect id="trunk" x="46" y="55" width="8" height="27" fill="{secondary}"/>
    <circle id="crown" cx="50" cy="42" r="20" fill="{primary}"/>
    <circle id="crown_left" cx="38" cy="50" r="11" fill="{primary}"/>
    <circle id="crown_right" cx="62" cy="50" r="11" fill="{primary}"/>
  </g>
</svg>"#;

const MOUNTAIN_MARKUP: &str = r##"<svg viewBox="0 0 100 100">
  <g id="background" data-label="Background sky"><rect x="0" y="0" width="100" height="100" fill="{background}"/></g>
  <g id="sun" data-label="Sun decoration"><circle cx="78" cy="22" r="9" fill="{accent}"/></g>
  <g id="mountains" data-label="Mountains subject">
    <polygon id="far_peak" points="45,85 72,35 100,85" fill="{secondary}"/>
    <polygon id="near_peak" points="0,85 30,28 62,85" fill="{primary}"/>
    <polygon id="snow" points="24,40 30,28 36,40" fill="#ffffff"/>
  </g>
  <g id="ground" data-label="Ground background"><rect x="0" y="85" width="100" height="15" fill="{secondary}"/></g>
</svg>"##;

pub static TEMPLATES: [ShapeTemplate; 7] = [
    ShapeTemplate { name: "sun", keywords: &["sun", "sunset", "sunrise"], kind: ShapeKind::Circle, markup: None },
    ShapeTemplate { name: "circle", keywords: &["circle", "ball", "moon", "dot", "planet", "orb"], kind: ShapeKind::Circle, markup: None },
    ShapeTemplate { name: "square", keywords: &["square", "box", "rectangle", "block", "cube"], kind: ShapeKind::Rect, markup: None },
    ShapeTemplate { name: "star", keywords: &["star", "sparkle"], kind: ShapeKind::Star, markup: None },
    ShapeTemplate { name: "house", keywords: &["house", "home", "cabin", "cottage"], kind: ShapeKind::Generic, markup: Some(HOUSE_MARKUP) },
    ShapeTemplate { name: "tree", keywords: &["tree", "forest", "oak", "pine"], kind: ShapeKind::Generic, markup: Some(TREE_MARKUP) },
    ShapeTemplate { name: "mountain", keywords: &["mountain", "hill", "peak", "landscape"], kind: ShapeKind::Generic, markup: Some(MOUNTAIN_MARKUP) },
];

/// Template for the first word in the prompt that names one.
pub fn match_template(prompt: &str) -> Option<&'static ShapeTemplate> {
    prompt_words(prompt)
        .iter()
        .find_map(|word| TEMPLATES.iter().find(|t| t.matches(word)))
}

// --- Palette ---

const PRESET_PALETTES: [[&str; 4]; 5] = [
    // background, primary, secondary, accent
    ["#fef3c7", "#f59e0b", "#b45309", "#ef4444"],
    ["#e0f2fe", "#0284c7", "#075985", "#facc15"],
    ["#ecfdf5", "#10b981", "#065f46", "#f97316"],
    ["#f5f3ff", "#8b5cf6", "#4c1d95", "#ec4899"],
    ["#f8fafc", "#334155", "#64748b", "#0ea5e9"],
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub background: String,
    pub primary: String,
    pub secondary: String,
    pub accent: String,
}

impl Palette {
    /// Requested `#RRGGBB` colors fill primary, secondary and accent in
    /// order (cycling), with a fourth used as background. Without any valid
    /// requested color a preset is picked from the seeded generator.
    pub fn resolve(requested: Option<&[String]>, rng: &mut StdRng) -> Palette {
        let valid: Vec<String> = requested
            .unwrap_or_default()
            .iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| is_hex_color(c))
            .collect();
        if valid.is_empty() {
            let [background, primary, secondary, accent] = PRESET_PALETTES[rng.random_range(0..PRESET_PALETTES.len())];
            return Palette {
                background: background.to_string(),
                primary: primary.to_string(),
                secondary: secondary.to_string(),
                accent: accent.to_string(),
            };
        }
        let n = valid.len();
        Palette {
            background: if n >= 4 { valid[3].clone() } else { "#f8fafc".to_string() },
            primary: valid[0].clone(),
            secondary: valid[1 % n].clone(),
            accent: valid[2 % n].clone(),
        }
    }

    pub fn colors(&self) -> Vec<String> {
        vec![
            self.primary.clone(),
            self.secondary.clone(),
            self.accent.clone(),
            self.background.clone(),
        ]
    }

    fn fill(&self, markup: &str) -> String {
        markup
            .replace("{background}", &self.background)
            .replace("{primary}", &self.primary)
            .replace("{secondary}", &self.secondary)
            .replace("{accent}", &self.accent)
    }
}

// --- Strategies ---

type ShapeStrategy = fn(&CanvasConfig, &Palette, &mut StdRng) -> Vec<UnifiedLayer>;

fn strategy(kind: ShapeKind) -> Option<ShapeStrategy> {
    match kind {
        ShapeKind::Circle => Some(circle_layers),
        ShapeKind::Rect => Some(rect_layers),
        ShapeKind::Star => Some(star_layers),
        ShapeKind::Generic => None,
    }
}

fn background_layer(canvas: &CanvasConfig, palette: &Palette) -> UnifiedLayer {
    UnifiedLayer::new(
        "background",
        "Background",
        vec![UnifiedPath::new(
            "background_fill",
            PathStyle::filled(&palette.background),
            shapes::rect(0.0, 0.0, canvas.width, canvas.height),
        )],
    )
    .with_layout(LayoutSpecification::new("full_canvas", "center"))
}

fn translucent(color: &str, opacity: f64) -> PathStyle {
    PathStyle {
        opacity: Some(opacity),
        ..PathStyle::filled(color)
    }
}

fn circle_layers(canvas: &CanvasConfig, palette: &Palette, rng: &mut StdRng) -> Vec<UnifiedLayer> {
    let (cx, cy) = (canvas.width / 2.0, canvas.height / 2.0);
    let r = canvas.width.min(canvas.height) * rng.random_range(0.22..0.32);
    let glow = r * rng.random_range(1.15..1.3);
    vec![
        background_layer(canvas, palette),
        UnifiedLayer::new(
            "glow",
            "Glow decoration",
            vec![UnifiedPath::new("glow_ring", translucent(&palette.accent, 0.3), shapes::circle(cx, cy, glow))],
        )
        .with_layout(LayoutSpecification::new("center", "center")),
        UnifiedLayer::new(
            "subject",
            "Main subject",
            vec![
                UnifiedPath::new("subject_disc", PathStyle::filled(&palette.primary), shapes::circle(cx, cy, r)),
                UnifiedPath::new(
                    "subject_highlight",
                    translucent(&palette.secondary, 0.5),
                    shapes::circle(cx - r * 0.35, cy - r * 0.35, r * 0.25),
                ),
            ],
        )
        .with_layout(LayoutSpecification::new("center", "center")),
    ]
}

fn rect_layers(canvas: &CanvasConfig, palette: &Palette, rng: &mut StdRng) -> Vec<UnifiedLayer> {
    let side = canvas.width.min(canvas.height) * rng.random_range(0.4..0.6);
    let (x, y) = ((canvas.width - side) / 2.0, (canvas.height - side) / 2.0);
    let shift = side * 0.06;
    vec![
        background_layer(canvas, palette),
        UnifiedLayer::new(
            "shadow",
            "Shadow decoration",
            vec![UnifiedPath::new(
                "shadow_rect",
                translucent(&palette.secondary, 0.3),
                shapes::rect(x + shift, y + shift, side, side),
            )],
        )
        .with_layout(LayoutSpecification::new("center", "center")),
        UnifiedLayer::new(
            "subject",
            "Main subject",
            vec![UnifiedPath::new("subject_rect", PathStyle::filled(&palette.primary), shapes::rect(x, y, side, side))],
        )
        .with_layout(LayoutSpecification::new("center", "center")),
    ]
}

fn star_layers(canvas: &CanvasConfig, palette: &Palette, rng: &mut StdRng) -> Vec<UnifiedLayer> {
    let (cx, cy) = (canvas.width / 2.0, canvas.height / 2.0);
    let outer = canvas.width.min(canvas.height) * rng.random_range(0.3..0.38);
    let points = rng.random_range(5..=7);
    let star = shapes::star_points(cx, cy, outer, outer * 0.45, points);
    let inner = shapes::star_points(cx, cy, outer * 0.5, outer * 0.22, points);
    vec![
        background_layer(canvas, palette),
        UnifiedLayer::new(
            "subject",
            "Main subject",
            vec![
                UnifiedPath::new("star_body", PathStyle::filled(&palette.primary), shapes::polygon(&star)),
                UnifiedPath::new("star_core", PathStyle::filled(&palette.accent), shapes::polygon(&inner)),
            ],
        )
        .with_layout(LayoutSpecification::new("center", "center")),
    ]
}

// --- Generator ---

#[derive(Debug, Clone, PartialEq)]
pub struct RuleBasedDocument {
    pub document: UnifiedLayeredDocument,
    pub palette: Palette,
    pub template: &'static str,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedGenerator;

impl RuleBasedGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(
        &self,
        request: &GenerationRequest,
        ratio: AspectRatio,
    ) -> Result<RuleBasedDocument, GenerationFailure> {
        let template = match_template(&request.prompt).ok_or_else(|| {
            GenerationFailure::new("Validation failed: no rule-based template matches the prompt")
        })?;
        let mut rng = StdRng::seed_from_u64(request.effective_seed());
        let palette = Palette::resolve(request.palette.as_deref(), &mut rng);
        let canvas = ratio.config();

        let document = match (strategy(template.kind), template.markup) {
            (Some(draw), _) => UnifiedLayeredDocument::new(ratio, draw(&canvas, &palette, &mut rng)).rounded(),
            (None, Some(markup)) => convert_legacy_svg(&palette.fill(markup), ratio)
                .map_err(|e| GenerationFailure::new(format!("Validation failed: template '{}': {}", template.name, e)))?,
            (None, None) => {
                return Err(GenerationFailure::new(format!(
                    "Validation failed: template '{}' has no drawing",
                    template.name
                )))
            }
        };

        Ok(RuleBasedDocument {
            document,
            palette,
            template: template.name,
            description: format!("Rule-based {} composition", template.name),
        })
    }
}
