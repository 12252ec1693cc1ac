//! Unified-Layered Document Model
//!
//! Wire format: camelCase JSON, version literal `unified-layered-1.0`,
//! coordinates rounded to 2 decimals on canonical serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canvas::AspectRatio;

pub const DOCUMENT_VERSION: &str = "unified-layered-1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedLayeredDocument {
    pub version: String,
    pub canvas: CanvasSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<DocumentLayout>,
    #[serde(default)]
    pub layers: Vec<UnifiedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSpec {
    pub width: f64,
    pub height: f64,
    pub aspect_ratio: String,
}

impl CanvasSpec {
    pub fn for_ratio(ratio: AspectRatio) -> Self {
        let (width, height) = ratio.dimensions();
        Self {
            width,
            height,
            aspect_ratio: ratio.tag().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLayout {
    #[serde(default)]
    pub custom_regions: Vec<CustomRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_anchor: Option<String>,
}

/// A document-declared region, normalized to the unit square.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRegion {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedLayer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutSpecification>,
    #[serde(default)]
    pub paths: Vec<UnifiedPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedPath {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub style: PathStyle,
    #[serde(default)]
    pub commands: Vec<PathCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutSpecification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_linecap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_linejoin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

impl PathStyle {
    pub fn filled(color: &str) -> Self {
        Self {
            fill: Some(color.to_string()),
            ..Self::default()
        }
    }

    pub fn stroked(color: &str, width: f64) -> Self {
        Self {
            fill: Some("none".to_string()),
            stroke: Some(color.to_string()),
            stroke_width: Some(width),
            stroke_linecap: Some("round".to_string()),
            stroke_linejoin: Some("round".to_string()),
            ..Self::default()
        }
    }
}

/// Raw command as it appears on the wire. `cmd` is kept as text so that
/// unknown tags survive deserialization and reach the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathCommand {
    pub cmd: String,
    #[serde(default)]
    pub coords: Vec<f64>,
}

impl PathCommand {
    pub fn new(kind: CommandKind, coords: Vec<f64>) -> Self {
        Self {
            cmd: kind.tag().to_string(),
            coords,
        }
    }

    pub fn move_to(x: f64, y: f64) -> Self {
        Self::new(CommandKind::MoveTo, vec![x, y])
    }

    pub fn line_to(x: f64, y: f64) -> Self {
        Self::new(CommandKind::LineTo, vec![x, y])
    }

    pub fn cubic_to(x1: f64, y1: f64, x2: f64, y2: f64, x: f64, y: f64) -> Self {
        Self::new(CommandKind::CubicTo, vec![x1, y1, x2, y2, x, y])
    }

    pub fn quad_to(x1: f64, y1: f64, x: f64, y: f64) -> Self {
        Self::new(CommandKind::QuadTo, vec![x1, y1, x, y])
    }

    pub fn close() -> Self {
        Self::new(CommandKind::Close, vec![])
    }

    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::parse(&self.cmd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    MoveTo,
    LineTo,
    CubicTo,
    QuadTo,
    Close,
}

impl CommandKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "M" => Some(CommandKind::MoveTo),
            "L" => Some(CommandKind::LineTo),
            "C" => Some(CommandKind::CubicTo),
            "Q" => Some(CommandKind::QuadTo),
            "Z" => Some(CommandKind::Close),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            CommandKind::MoveTo => "M",
            CommandKind::LineTo => "L",
            CommandKind::CubicTo => "C",
            CommandKind::QuadTo => "Q",
            CommandKind::Close => "Z",
        }
    }

    /// Number of coordinates the command carries.
    pub fn arity(self) -> usize {
        match self {
            CommandKind::MoveTo | CommandKind::LineTo => 2,
            CommandKind::QuadTo => 4,
            CommandKind::CubicTo => 6,
            CommandKind::Close => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSpecification {
    pub region: String,
    #[serde(default = "default_anchor")]
    pub anchor: String,
    #[serde(default)]
    pub offset: Offset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
}

fn default_anchor() -> String {
    "center".to_string()
}

impl LayoutSpecification {
    pub fn new(region: &str, anchor: &str) -> Self {
        Self {
            region: region.to_string(),
            anchor: anchor.to_string(),
            offset: Offset::default(),
            size: None,
            repeat: None,
            z_index: None,
        }
    }

    pub fn with_size(mut self, size: SizeSpec) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.offset = Offset { x, y };
        self
    }
}

/// Fraction of the region's width/height, each in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// At most one variant may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute: Option<AbsoluteSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_constrained: Option<AspectConstrainedSize>,
}

impl SizeSpec {
    pub fn relative(fraction: f64) -> Self {
        Self {
            relative: Some(fraction),
            ..Self::default()
        }
    }

    pub fn absolute(width: f64, height: f64) -> Self {
        Self {
            absolute: Some(AbsoluteSize { width, height }),
            ..Self::default()
        }
    }

    pub fn aspect_constrained(width: f64, aspect: f64) -> Self {
        Self {
            aspect_constrained: Some(AspectConstrainedSize { width, aspect }),
            ..Self::default()
        }
    }

    /// Names of the variants that are set.
    pub fn variants(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.absolute.is_some() {
            set.push("absolute");
        }
        if self.relative.is_some() {
            set.push("relative");
        }
        if self.aspect_constrained.is_some() {
            set.push("aspect_constrained");
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectConstrainedSize {
    pub width: f64,
    pub aspect: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepeatSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridRepeat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radial: Option<RadialRepeat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRepeat {
    pub count: GridCount,
    #[serde(default)]
    pub spacing: f64,
}

/// `3` means three columns in one row; `[3, 2]` means three columns, two rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridCount {
    Uniform(u32),
    ColumnsRows([u32; 2]),
}

impl GridCount {
    pub fn columns_rows(self) -> (u32, u32) {
        match self {
            GridCount::Uniform(n) => (n, 1),
            GridCount::ColumnsRows([c, r]) => (c, r),
        }
    }

    /// Total cells, `None` if the product overflows.
    pub fn instances(self) -> Option<u64> {
        let (cols, rows) = self.columns_rows();
        u64::from(cols).checked_mul(u64::from(rows))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialRepeat {
    pub count: u32,
    pub radius: f64,
}

impl UnifiedLayeredDocument {
    pub fn new(ratio: AspectRatio, layers: Vec<UnifiedLayer>) -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            canvas: CanvasSpec::for_ratio(ratio),
            layout: None,
            layers,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Parsed aspect ratio tag, if it is one of the canonical six.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        self.canvas.aspect_ratio.parse().ok()
    }

    pub fn custom_regions(&self) -> &[CustomRegion] {
        self.layout
            .as_ref()
            .map(|l| l.custom_regions.as_slice())
            .unwrap_or(&[])
    }

    pub fn path_count(&self) -> usize {
        self.layers.iter().map(|l| l.paths.len()).sum()
    }

    pub fn command_count(&self) -> usize {
        self.layers.iter().map(UnifiedLayer::command_count).sum()
    }

    /// Layout specifications of all layers and paths, in document order.
    pub fn layout_specs(&self) -> Vec<&LayoutSpecification> {
        self.layers.iter().flat_map(UnifiedLayer::layout_specs).collect()
    }

    /// Copy with every coordinate rounded to 2 decimal places.
    pub fn rounded(&self) -> Self {
        let mut doc = self.clone();
        for cmd in doc
            .layers
            .iter_mut()
            .flat_map(|l| l.paths.iter_mut())
            .flat_map(|p| p.commands.iter_mut())
        {
            for c in cmd.coords.iter_mut() {
                *c = round2(*c);
            }
        }
        doc
    }

    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.rounded())
    }

    pub fn to_canonical_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.rounded())
    }
}

impl UnifiedLayer {
    pub fn new(id: &str, label: &str, paths: Vec<UnifiedPath>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            layout: None,
            paths,
        }
    }

    pub fn with_layout(mut self, layout: LayoutSpecification) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn command_count(&self) -> usize {
        self.paths.iter().map(|p| p.commands.len()).sum()
    }

    pub fn layout_specs(&self) -> impl Iterator<Item = &LayoutSpecification> {
        self.layout
            .iter()
            .chain(self.paths.iter().filter_map(|p| p.layout.as_ref()))
    }

    /// Distinct regions referenced by the layer and its paths, sorted.
    pub fn regions(&self) -> BTreeSet<String> {
        self.layout_specs().map(|s| s.region.clone()).collect()
    }

    pub fn anchors(&self) -> BTreeSet<String> {
        self.layout_specs().map(|s| s.anchor.clone()).collect()
    }

    /// Placement region of the layer itself.
    pub fn primary_region(&self) -> Option<&str> {
        self.layout.as_ref().map(|l| l.region.as_str())
    }
}

impl UnifiedPath {
    pub fn new(id: &str, style: PathStyle, commands: Vec<PathCommand>) -> Self {
        Self {
            id: id.to_string(),
            style,
            commands,
            layout: None,
        }
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
