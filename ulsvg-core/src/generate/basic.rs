//! Basic shapes, the last generation tier. Infallible.

use serde::{Deserialize, Serialize};

use crate::canvas::AspectRatio;
use crate::document::{LayoutSpecification, PathStyle, UnifiedLayer, UnifiedLayeredDocument, UnifiedPath};
use crate::generate::{prompt_words, shapes};
use crate::request::GenerationRequest;
use crate::validation::is_hex_color;

pub const DEFAULT_SHAPE_COLOR: &str = "#3b82f6";
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasicShape {
    Circle,
    Square,
    Triangle,
    Star,
}

impl BasicShape {
    const KEYWORDS: [(BasicShape, &'static [&'static str]); 4] = [
        (BasicShape::Circle, &["circle", "round", "ball", "sun", "moon", "dot"]),
        (BasicShape::Square, &["square", "box", "rectangle", "block"]),
        (BasicShape::Triangle, &["triangle", "pyramid", "mountain", "roof"]),
        (BasicShape::Star, &["star", "sparkle"]),
    ];

    /// First shape named in the prompt; circle when none is.
    pub fn from_prompt(prompt: &str) -> Self {
        prompt_words(prompt)
            .iter()
            .find_map(|word| {
                Self::KEYWORDS
                    .iter()
                    .find(|(_, kws)| kws.iter().any(|kw| word == kw || word.strip_suffix('s') == Some(*kw)))
                    .map(|(shape, _)| *shape)
            })
            .unwrap_or(BasicShape::Circle)
    }

    pub fn name(self) -> &'static str {
        match self {
            BasicShape::Circle => "circle",
            BasicShape::Square => "square",
            BasicShape::Triangle => "triangle",
            BasicShape::Star => "star",
        }
    }
}

/// Single centered shape over a plain background.
pub fn basic_shapes_document(request: &GenerationRequest, ratio: AspectRatio) -> (UnifiedLayeredDocument, Vec<String>) {
    let color = request
        .palette
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .find(|c| is_hex_color(c))
        .unwrap_or_else(|| DEFAULT_SHAPE_COLOR.to_string());
    let shape = BasicShape::from_prompt(&request.prompt);

    let canvas = ratio.config();
    let (w, h) = (canvas.width, canvas.height);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let size = w.min(h) * 0.3;
    let commands = match shape {
        BasicShape::Circle => shapes::circle(cx, cy, size),
        BasicShape::Square => shapes::rect(cx - size, cy - size, size * 2.0, size * 2.0),
        BasicShape::Triangle => shapes::polygon(&shapes::regular_polygon(cx, cy, size, 3)),
        BasicShape::Star => shapes::polygon(&shapes::star_points(cx, cy, size, size * 0.45, 5)),
    };

    let layers = vec![
        UnifiedLayer::new(
            "background",
            "Background",
            vec![UnifiedPath::new(
                "background_fill",
                PathStyle::filled(DEFAULT_BACKGROUND),
                shapes::rect(0.0, 0.0, w, h),
            )],
        )
        .with_layout(LayoutSpecification::new("full_canvas", "center")),
        UnifiedLayer::new(
            "basic_shape",
            "Main subject",
            vec![UnifiedPath::new(&format!("{}_shape", shape.name()), PathStyle::filled(&color), commands)],
        )
        .with_layout(LayoutSpecification::new("center", "center")),
    ];
    let palette = vec![color, DEFAULT_BACKGROUND.to_string()];
    (UnifiedLayeredDocument::new(ratio, layers).rounded(), palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{DocumentValidator, ValidateOptions};

    #[test]
    fn test_shape_selection() {
        assert_eq!(BasicShape::from_prompt("Two triangles"), BasicShape::Triangle);
        assert_eq!(BasicShape::from_prompt("a box and a star"), BasicShape::Square);
        assert_eq!(BasicShape::from_prompt("quantum entanglement"), BasicShape::Circle);
    }

    #[test]
    fn test_always_valid() {
        let validator = DocumentValidator::new();
        for prompt in ["", "star", "square", "triangle", "???"] {
            for ratio in AspectRatio::ALL {
                let (doc, palette) = basic_shapes_document(&GenerationRequest::new(prompt), ratio);
                assert_eq!(palette[0], DEFAULT_SHAPE_COLOR);
                let report = validator.validate(&doc, ValidateOptions::default());
                assert!(report.success, "{}: {}", prompt, report.error_summary());
            }
        }
    }

    #[test]
    fn test_palette_color_used() {
        let mut req = GenerationRequest::new("circle");
        req.palette = Some(vec!["nope".into(), "#ABCDEF".into()]);
        let (doc, _) = basic_shapes_document(&req, AspectRatio::Square);
        assert_eq!(doc.layers[1].paths[0].style.fill.as_deref(), Some("#abcdef"));
    }
}
