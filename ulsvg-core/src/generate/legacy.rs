//! Legacy Layered SVG - Parsing and Conversion
//!
//! Older generators emit flat layered markup: one top-level `<g>` per layer
//! holding basic shapes and paths. This module reads that subset of SVG and
//! converts it into a unified document on the canonical canvas.
//!
//! Supported: `circle`, `ellipse`, `rect`, `polygon`, `polyline`, `line`,
//! `path` (M L H V C S Q T A Z, absolute and relative). Presentation
//! attributes and inline `style` cascade from groups. Content under `defs`
//! and similar non-rendered containers is skipped. Arcs are flattened to
//! their chord.

use std::collections::HashSet;

use thiserror::Error;

use crate::canvas::{AspectRatio, CanvasConfig, Point, Rect};
use crate::document::{
    LayoutSpecification, PathCommand, PathStyle, UnifiedLayer, UnifiedLayeredDocument, UnifiedPath,
};
use crate::generate::shapes;
use crate::regions::RegionResolver;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LegacyParseError {
    #[error("Unexpected end of markup at byte {0}")]
    UnexpectedEof(usize),

    #[error("Malformed markup at byte {pos}: {reason}")]
    Malformed { pos: usize, reason: String },

    #[error("Missing <svg> root element")]
    MissingRoot,

    #[error("Mismatched closing tag: expected </{expected}>, found </{found}>")]
    UnbalancedTag { expected: String, found: String },

    #[error("Invalid number '{value}' for attribute '{attribute}'")]
    InvalidNumber { attribute: String, value: String },

    #[error("Invalid path data: {0}")]
    InvalidPathData(String),

    #[error("No drawable shapes found")]
    Empty,
}

// --- Parsed Model ---

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Circle { cx: f64, cy: f64, r: f64 },
    Ellipse { cx: f64, cy: f64, rx: f64, ry: f64 },
    Rect { x: f64, y: f64, width: f64, height: f64 },
    Polygon { points: Vec<Point>, closed: bool },
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },
    Path(Vec<PathCommand>),
}

impl Primitive {
    /// Absolute commands in source coordinates.
    pub fn commands(&self) -> Vec<PathCommand> {
        match self {
            Primitive::Circle { cx, cy, r } => shapes::circle(*cx, *cy, *r),
            Primitive::Ellipse { cx, cy, rx, ry } => shapes::ellipse(*cx, *cy, *rx, *ry),
            Primitive::Rect { x, y, width, height } => shapes::rect(*x, *y, *width, *height),
            Primitive::Polygon { points, closed: true } => shapes::polygon(points),
            Primitive::Polygon { points, closed: false } => shapes::polyline(points),
            Primitive::Line { x1, y1, x2, y2 } => {
                vec![PathCommand::move_to(*x1, *y1), PathCommand::line_to(*x2, *y2)]
            }
            Primitive::Path(commands) => commands.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyShape {
    pub id: Option<String>,
    pub primitive: Primitive,
    pub style: PathStyle,
}

/// A top-level `<g>`, or a run of shapes sitting directly under the root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyGroup {
    pub id: Option<String>,
    pub label: Option<String>,
    pub shapes: Vec<LegacyShape>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacySvg {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub view_box: Option<Rect>,
    pub groups: Vec<LegacyGroup>,
}

impl LegacySvg {
    pub fn shape_count(&self) -> usize {
        self.groups.iter().map(|g| g.shapes.len()).sum()
    }

    /// Coordinate box the markup is drawn in, if it declares one.
    pub fn source_box(&self) -> Option<Rect> {
        if let Some(vb) = self.view_box {
            return Some(vb);
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some(Rect::new(0.0, 0.0, w, h)),
            _ => None,
        }
    }
}

// --- Tokenizer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    Close(String),
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next_token(&mut self) -> Result<Option<Token>, LegacyParseError> {
        loop {
            let Some(offset) = self.rest().find('<') else {
                self.pos = self.src.len();
                return Ok(None);
            };
            self.pos += offset;
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.skip_past("]]>")?;
            } else if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with("<!") {
                self.skip_past(">")?;
            } else if rest.starts_with("</") {
                self.pos += 2;
                let name = self.read_name();
                self.skip_ws();
                self.expect('>')?;
                return Ok(Some(Token::Close(name)));
            } else {
                self.pos += 1;
                return self.read_open_tag().map(Some);
            }
        }
    }

    fn skip_past(&mut self, end: &str) -> Result<(), LegacyParseError> {
        match self.rest().find(end) {
            Some(i) => {
                self.pos += i + end.len();
                Ok(())
            }
            None => Err(LegacyParseError::UnexpectedEof(self.src.len())),
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn read_name(&mut self) -> String {
        let rest = self.rest();
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(rest.len());
        self.pos += end;
        rest[..end].to_string()
    }

    fn expect(&mut self, expected: char) -> Result<(), LegacyParseError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(c) => Err(self.malformed(format!("expected '{}', found '{}'", expected, c))),
            None => Err(LegacyParseError::UnexpectedEof(self.pos)),
        }
    }

    fn malformed(&self, reason: String) -> LegacyParseError {
        LegacyParseError::Malformed { pos: self.pos, reason }
    }

    fn read_open_tag(&mut self) -> Result<Token, LegacyParseError> {
        let name = self.read_name();
        if name.is_empty() {
            return Err(self.malformed("empty tag name".to_string()));
        }
        let mut attrs = vec![];
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(Token::Open { name, attrs, self_closing: true });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(Token::Open { name, attrs, self_closing: false });
            }
            let Some(c) = self.peek() else {
                return Err(LegacyParseError::UnexpectedEof(self.pos));
            };
            let attr = self.read_name();
            if attr.is_empty() {
                return Err(self.malformed(format!("unexpected character '{}'", c)));
            }
            self.skip_ws();
            if self.peek() != Some('=') {
                attrs.push((attr, String::new()));
                continue;
            }
            self.pos += 1;
            self.skip_ws();
            let quote = match self.peek() {
                Some(q @ ('"' | '\'')) => q,
                Some(c) => return Err(self.malformed(format!("unquoted value for '{}' at '{}'", attr, c))),
                None => return Err(LegacyParseError::UnexpectedEof(self.pos)),
            };
            self.pos += 1;
            let rest = self.rest();
            let end = rest
                .find(quote)
                .ok_or(LegacyParseError::UnexpectedEof(self.src.len()))?;
            attrs.push((attr, decode_entities(&rest[..end])));
            self.pos += end + 1;
        }
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// --- Tree Building ---

/// Containers whose content never renders directly.
const NON_RENDERED: [&str; 12] = [
    "defs",
    "clipPath",
    "mask",
    "symbol",
    "pattern",
    "marker",
    "linearGradient",
    "radialGradient",
    "title",
    "desc",
    "metadata",
    "style",
];

struct Frame {
    name: String,
    style: PathStyle,
    skip: bool,
}

fn local_name(name: &str) -> &str {
    name.strip_prefix("svg:").unwrap_or(name)
}

fn attr(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
}

fn label_attr(attrs: &[(String, String)]) -> Option<String> {
    ["data-label", "inkscape:label", "aria-label"]
        .iter()
        .find_map(|name| attr(attrs, name))
        .filter(|label| !label.trim().is_empty())
}

pub fn parse_legacy_svg(markup: &str) -> Result<LegacySvg, LegacyParseError> {
    let mut tokens = Tokenizer::new(markup);
    let (root_attrs, root_self_closing) = match tokens.next_token()? {
        Some(Token::Open { name, attrs, self_closing }) if local_name(&name) == "svg" => (attrs, self_closing),
        _ => return Err(LegacyParseError::MissingRoot),
    };

    let mut svg = LegacySvg {
        width: optional_number(&root_attrs, "width")?,
        height: optional_number(&root_attrs, "height")?,
        view_box: attr(&root_attrs, "viewBox").map(|vb| parse_view_box(&vb)).transpose()?,
        groups: vec![],
    };
    if root_self_closing {
        return Ok(svg);
    }

    let mut stack = vec![Frame {
        name: "svg".to_string(),
        style: apply_presentation(&PathStyle::default(), &root_attrs)?,
        skip: false,
    }];
    let mut open_group: Option<usize> = None;
    let mut loose_group: Option<usize> = None;

    loop {
        let Some(token) = tokens.next_token()? else {
            return Err(LegacyParseError::UnexpectedEof(markup.len()));
        };
        match token {
            Token::Close(name) => {
                let frame = stack.pop().ok_or(LegacyParseError::MissingRoot)?;
                if local_name(&frame.name) != local_name(&name) {
                    return Err(LegacyParseError::UnbalancedTag { expected: frame.name, found: name });
                }
                match stack.len() {
                    0 => break,
                    1 => open_group = None,
                    _ => {}
                }
            }
            Token::Open { name, attrs, self_closing } => {
                let parent = stack.last().ok_or(LegacyParseError::MissingRoot)?;
                let kind = local_name(&name);
                let skip = parent.skip || NON_RENDERED.contains(&kind);
                let style = apply_presentation(&parent.style, &attrs)?;
                let top_level = stack.len() == 1;

                if !skip {
                    if kind == "g" {
                        if top_level && !self_closing {
                            svg.groups.push(LegacyGroup {
                                id: attr(&attrs, "id"),
                                label: label_attr(&attrs),
                                shapes: vec![],
                            });
                            open_group = Some(svg.groups.len() - 1);
                            loose_group = None;
                        }
                    } else if let Some(primitive) = parse_primitive(kind, &attrs)? {
                        let index = match (open_group, loose_group) {
                            (Some(i), _) | (None, Some(i)) => i,
                            (None, None) => {
                                svg.groups.push(LegacyGroup::default());
                                loose_group = Some(svg.groups.len() - 1);
                                svg.groups.len() - 1
                            }
                        };
                        svg.groups[index].shapes.push(LegacyShape {
                            id: attr(&attrs, "id"),
                            primitive,
                            style: style.clone(),
                        });
                    }
                }
                if !self_closing {
                    stack.push(Frame { name, style, skip });
                }
            }
        }
    }
    Ok(svg)
}

fn parse_view_box(text: &str) -> Result<Rect, LegacyParseError> {
    let nums = parse_number_list("viewBox", text)?;
    match nums[..] {
        [x, y, w, h] if w > 0.0 && h > 0.0 => Ok(Rect::new(x, y, w, h)),
        _ => Err(LegacyParseError::InvalidNumber {
            attribute: "viewBox".to_string(),
            value: text.to_string(),
        }),
    }
}

fn parse_primitive(kind: &str, attrs: &[(String, String)]) -> Result<Option<Primitive>, LegacyParseError> {
    let num = |name: &str| -> Result<f64, LegacyParseError> {
        Ok(optional_number(attrs, name)?.unwrap_or(0.0))
    };
    let primitive = match kind {
        "circle" => {
            let r = num("r")?;
            (r > 0.0).then_some(Primitive::Circle { cx: num("cx")?, cy: num("cy")?, r })
        }
        "ellipse" => {
            let (rx, ry) = (num("rx")?, num("ry")?);
            (rx > 0.0 && ry > 0.0).then_some(Primitive::Ellipse { cx: num("cx")?, cy: num("cy")?, rx, ry })
        }
        "rect" => {
            let (width, height) = (num("width")?, num("height")?);
            (width > 0.0 && height > 0.0).then_some(Primitive::Rect { x: num("x")?, y: num("y")?, width, height })
        }
        "polygon" | "polyline" => {
            let coords = parse_number_list("points", &attr(attrs, "points").unwrap_or_default())?;
            let points: Vec<Point> = coords.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect();
            (points.len() >= 2).then_some(Primitive::Polygon { points, closed: kind == "polygon" })
        }
        "line" => Some(Primitive::Line {
            x1: num("x1")?,
            y1: num("y1")?,
            x2: num("x2")?,
            y2: num("y2")?,
        }),
        "path" => {
            let commands = parse_path_data(&attr(attrs, "d").unwrap_or_default())?;
            (!commands.is_empty()).then_some(Primitive::Path(commands))
        }
        _ => None,
    };
    Ok(primitive)
}

// --- Styles ---

fn apply_presentation(parent: &PathStyle, attrs: &[(String, String)]) -> Result<PathStyle, LegacyParseError> {
    let mut style = parent.clone();
    let mut own_opacity = None;
    let inline = attr(attrs, "style").map(|s| parse_inline_style(&s)).unwrap_or_default();
    let declared = attrs
        .iter()
        .chain(inline.iter())
        .map(|(k, v)| (k.as_str(), v.as_str()));
    for (name, value) in declared {
        match name {
            "fill" => style.fill = Some(normalize_color(value)),
            "stroke" => style.stroke = Some(normalize_color(value)),
            "stroke-width" => style.stroke_width = Some(parse_number(name, value)?),
            "stroke-linecap" => style.stroke_linecap = Some(value.trim().to_string()),
            "stroke-linejoin" => style.stroke_linejoin = Some(value.trim().to_string()),
            "opacity" => own_opacity = Some(parse_number(name, value)?),
            _ => {}
        }
    }
    // group opacity composites onto children
    if let Some(o) = own_opacity {
        style.opacity = Some(parent.opacity.unwrap_or(1.0) * o.clamp(0.0, 1.0));
    }
    Ok(style)
}

fn parse_inline_style(text: &str) -> Vec<(String, String)> {
    text.split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

const NAMED_COLORS: [(&str, &str); 14] = [
    ("black", "#000000"),
    ("white", "#ffffff"),
    ("red", "#ff0000"),
    ("green", "#008000"),
    ("blue", "#0000ff"),
    ("yellow", "#ffff00"),
    ("orange", "#ffa500"),
    ("purple", "#800080"),
    ("gray", "#808080"),
    ("grey", "#808080"),
    ("brown", "#a52a2a"),
    ("pink", "#ffc0cb"),
    ("navy", "#000080"),
    ("gold", "#ffd700"),
];

/// `#rgb` and common names become `#rrggbb`; anything unrecognized passes
/// through for validation to report.
pub fn normalize_color(value: &str) -> String {
    let v = value.trim().to_ascii_lowercase();
    if v == "none" || v == "transparent" {
        return "none".to_string();
    }
    if let Some(hex) = v.strip_prefix('#') {
        if hex.chars().all(|c| c.is_ascii_hexdigit()) {
            match hex.len() {
                3 => return hex.chars().fold(String::from("#"), |mut s, c| {
                    s.push(c);
                    s.push(c);
                    s
                }),
                6 => return v,
                _ => {}
            }
        }
    }
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == v)
        .map(|(_, hex)| hex.to_string())
        .unwrap_or_else(|| value.trim().to_string())
}

// --- Numbers and Path Data ---

fn optional_number(attrs: &[(String, String)], name: &str) -> Result<Option<f64>, LegacyParseError> {
    attr(attrs, name).map(|v| parse_number(name, &v)).transpose()
}

fn parse_number(attribute: &str, value: &str) -> Result<f64, LegacyParseError> {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix("px").unwrap_or(trimmed);
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(LegacyParseError::InvalidNumber {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PathToken {
    Command(char),
    Number(f64),
}

fn lex_path(d: &str) -> Result<Vec<PathToken>, LegacyParseError> {
    let bytes = d.as_bytes();
    let mut tokens = vec![];
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() || b == b',' {
            i += 1;
        } else if b.is_ascii_alphabetic() {
            tokens.push(PathToken::Command(b as char));
            i += 1;
        } else if b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+') {
            let start = i;
            if matches!(b, b'-' | b'+') {
                i += 1;
            }
            let mut seen_dot = false;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || (bytes[i] == b'.' && !seen_dot)) {
                seen_dot |= bytes[i] == b'.';
                i += 1;
            }
            if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
                let mut j = i + 1;
                if j < bytes.len() && matches!(bytes[j], b'-' | b'+') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    i = j;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text = &d[start..i];
            let value = text
                .parse::<f64>()
                .map_err(|_| LegacyParseError::InvalidPathData(format!("bad number '{}'", text)))?;
            tokens.push(PathToken::Number(value));
        } else {
            return Err(LegacyParseError::InvalidPathData(format!(
                "unexpected character '{}'",
                d[i..].chars().next().unwrap_or('?')
            )));
        }
    }
    Ok(tokens)
}

fn parse_number_list(attribute: &str, text: &str) -> Result<Vec<f64>, LegacyParseError> {
    lex_path(text)
        .ok()
        .and_then(|tokens| {
            tokens
                .into_iter()
                .map(|t| match t {
                    PathToken::Number(n) => Some(n),
                    PathToken::Command(_) => None,
                })
                .collect()
        })
        .ok_or_else(|| LegacyParseError::InvalidNumber {
            attribute: attribute.to_string(),
            value: text.to_string(),
        })
}

fn reflect(control: Option<(f64, f64)>, cur: (f64, f64)) -> (f64, f64) {
    match control {
        Some((x, y)) => (2.0 * cur.0 - x, 2.0 * cur.1 - y),
        None => cur,
    }
}

/// Path data to absolute commands.
pub fn parse_path_data(d: &str) -> Result<Vec<PathCommand>, LegacyParseError> {
    let tokens = lex_path(d)?;
    let mut out = vec![];
    let mut cur = (0.0, 0.0);
    let mut start = (0.0, 0.0);
    let mut last_cubic: Option<(f64, f64)> = None;
    let mut last_quad: Option<(f64, f64)> = None;
    let mut prev: Option<char> = None;
    let mut i = 0;

    while i < tokens.len() {
        let c = match tokens[i] {
            PathToken::Command(c) => {
                i += 1;
                c
            }
            PathToken::Number(_) => match prev {
                Some('M') => 'L',
                Some('m') => 'l',
                Some('Z' | 'z') | None => {
                    return Err(LegacyParseError::InvalidPathData(
                        "numbers without a command".to_string(),
                    ))
                }
                Some(p) => p,
            },
        };
        let arity = match c.to_ascii_uppercase() {
            'M' | 'L' | 'T' => 2,
            'H' | 'V' => 1,
            'C' => 6,
            'S' | 'Q' => 4,
            'A' => 7,
            'Z' => 0,
            other => {
                return Err(LegacyParseError::InvalidPathData(format!("unsupported command '{}'", other)))
            }
        };
        let mut args = [0.0f64; 7];
        for slot in args.iter_mut().take(arity) {
            match tokens.get(i) {
                Some(PathToken::Number(n)) => *slot = *n,
                _ => {
                    return Err(LegacyParseError::InvalidPathData(format!(
                        "command '{}' expects {} numbers",
                        c, arity
                    )))
                }
            }
            i += 1;
        }

        let rel = c.is_ascii_lowercase();
        let pt = |x: f64, y: f64| if rel { (cur.0 + x, cur.1 + y) } else { (x, y) };
        let upper = c.to_ascii_uppercase();
        let (mut next_cubic, mut next_quad) = (None, None);
        match upper {
            'M' => {
                cur = pt(args[0], args[1]);
                start = cur;
                out.push(PathCommand::move_to(cur.0, cur.1));
            }
            'L' | 'H' | 'V' | 'A' => {
                let p = match upper {
                    'H' => (if rel { cur.0 + args[0] } else { args[0] }, cur.1),
                    'V' => (cur.0, if rel { cur.1 + args[0] } else { args[0] }),
                    'A' => pt(args[5], args[6]),
                    _ => pt(args[0], args[1]),
                };
                cur = p;
                out.push(PathCommand::line_to(p.0, p.1));
            }
            'C' | 'S' => {
                let (c1, c2, p) = if upper == 'C' {
                    (pt(args[0], args[1]), pt(args[2], args[3]), pt(args[4], args[5]))
                } else {
                    (reflect(last_cubic, cur), pt(args[0], args[1]), pt(args[2], args[3]))
                };
                out.push(PathCommand::cubic_to(c1.0, c1.1, c2.0, c2.1, p.0, p.1));
                next_cubic = Some(c2);
                cur = p;
            }
            'Q' | 'T' => {
                let (c1, p) = if upper == 'Q' {
                    (pt(args[0], args[1]), pt(args[2], args[3]))
                } else {
                    (reflect(last_quad, cur), pt(args[0], args[1]))
                };
                out.push(PathCommand::quad_to(c1.0, c1.1, p.0, p.1));
                next_quad = Some(c1);
                cur = p;
            }
            _ => {
                out.push(PathCommand::close());
                cur = start;
            }
        }
        last_cubic = next_cubic;
        last_quad = next_quad;
        prev = Some(c);
    }
    Ok(out)
}

// --- Conversion ---

/// Parse legacy markup and convert it onto the canonical canvas for `ratio`.
pub fn convert_legacy_svg(markup: &str, ratio: AspectRatio) -> Result<UnifiedLayeredDocument, LegacyParseError> {
    let svg = parse_legacy_svg(markup)?;
    to_unified_document(&svg, ratio)
}

pub fn to_unified_document(svg: &LegacySvg, ratio: AspectRatio) -> Result<UnifiedLayeredDocument, LegacyParseError> {
    let canvas = ratio.config();
    let source = svg
        .source_box()
        .unwrap_or(Rect::new(0.0, 0.0, canvas.width, canvas.height));
    let (sx, sy) = (canvas.width / source.width, canvas.height / source.height);
    let stroke_scale = (sx + sy) / 2.0;
    let resolver = RegionResolver::new(ratio);

    let mut layer_ids = HashSet::new();
    let mut layers = vec![];
    for (gi, group) in svg.groups.iter().enumerate() {
        if group.shapes.is_empty() {
            continue;
        }
        let layer_id = unique_id(
            group.id.clone().unwrap_or_else(|| format!("layer_{}", gi + 1)),
            &mut layer_ids,
        );
        let label = group
            .label
            .clone()
            .or_else(|| group.id.as_deref().map(humanize))
            .unwrap_or_else(|| format!("Layer {}", layers.len() + 1));

        let mut path_ids = HashSet::new();
        let mut paths = Vec::with_capacity(group.shapes.len());
        for (si, shape) in group.shapes.iter().enumerate() {
            let id = unique_id(
                shape.id.clone().unwrap_or_else(|| format!("{}_path_{}", layer_id, si + 1)),
                &mut path_ids,
            );
            let mut commands = shape.primitive.commands();
            for cmd in commands.iter_mut() {
                for (k, c) in cmd.coords.iter_mut().enumerate() {
                    *c = if k % 2 == 0 { (*c - source.x) * sx } else { (*c - source.y) * sy };
                }
            }
            let mut style = shape.style.clone();
            style.stroke_width = style.stroke_width.map(|w| w * stroke_scale);
            paths.push(UnifiedPath::new(&id, style, commands));
        }
        let layout = infer_layout(&resolver, &canvas, &paths);
        layers.push(UnifiedLayer::new(&layer_id, &label, paths).with_layout(layout));
    }
    if layers.is_empty() {
        return Err(LegacyParseError::Empty);
    }
    Ok(UnifiedLayeredDocument::new(ratio, layers).rounded())
}

/// Region whose box holds the layer's center, or `full_canvas` for layers
/// covering most of the canvas.
fn infer_layout(resolver: &RegionResolver, canvas: &CanvasConfig, paths: &[UnifiedPath]) -> LayoutSpecification {
    let bounds = command_bounds(paths.iter().flat_map(|p| p.commands.iter()));
    let region = match bounds {
        Some(b) if b.area() >= 0.8 * canvas.width * canvas.height => "full_canvas".to_string(),
        Some(b) => {
            let c = b.center();
            resolver
                .find_region_at_pixel(c.x, c.y)
                .unwrap_or_else(|| "center".to_string())
        }
        None => "center".to_string(),
    };
    LayoutSpecification::new(&region, "center")
}

fn command_bounds<'a>(commands: impl Iterator<Item = &'a PathCommand>) -> Option<Rect> {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for cmd in commands {
        for pair in cmd.coords.chunks_exact(2) {
            min = (min.0.min(pair[0]), min.1.min(pair[1]));
            max = (max.0.max(pair[0]), max.1.max(pair[1]));
        }
    }
    min.0
        .is_finite()
        .then(|| Rect::new(min.0, min.1, max.0 - min.0, max.1 - min.1))
}

fn unique_id(candidate: String, used: &mut HashSet<String>) -> String {
    let mut id = candidate.clone();
    let mut n = 2;
    while used.contains(&id) {
        id = format!("{}_{}", candidate, n);
        n += 1;
    }
    used.insert(id.clone());
    id
}

fn humanize(id: &str) -> String {
    let spaced = id.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUSE: &str = r##"<?xml version="1.0"?>
<!-- exported -->
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1024 1024" width="1024" height="1024">
  <g id="sky_bg" fill="#88CCFF">
    <rect x="0" y="0" width="1024" height="1024"/>
  </g>
  <g id="house" data-label="The house" stroke="black" stroke-width="4">
    <rect id="walls" x="312" y="512" width="400" height="300" fill="#a52"/>
    <g opacity="0.5"><polygon points="312,512 512,312 712,512" fill="red"/></g>
  </g>
  <defs><circle r="10"/></defs>
</svg>"##;

    #[test]
    fn test_parse_groups_and_inheritance() {
        let svg = parse_legacy_svg(HOUSE).unwrap();
        assert_eq!(svg.groups.len(), 2);
        assert_eq!(svg.shape_count(), 3);

        let house = &svg.groups[1];
        assert_eq!(house.label.as_deref(), Some("The house"));
        assert_eq!(house.shapes[0].style.fill.as_deref(), Some("#aa5522"));
        assert_eq!(house.shapes[0].style.stroke.as_deref(), Some("#000000"));
        assert_eq!(house.shapes[1].style.opacity, Some(0.5));
        assert_eq!(house.shapes[1].style.fill.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn test_convert_scales_view_box() {
        let doc = convert_legacy_svg(HOUSE, AspectRatio::Square).unwrap();
        assert_eq!(doc.layers.len(), 2);
        assert_eq!(doc.layers[0].id, "sky_bg");
        assert_eq!(doc.layers[0].label, "Sky bg");
        assert_eq!(doc.layers[0].primary_region(), Some("full_canvas"));

        let walls = &doc.layers[1].paths[0];
        assert_eq!(walls.id, "walls");
        assert_eq!(walls.commands[0].coords, vec![156.0, 256.0]);
        assert_eq!(walls.style.stroke_width, Some(2.0));
        assert_eq!(doc.layers[1].paths[1].id, "house_path_2");
    }

    #[test]
    fn test_loose_shapes_form_implicit_layer() {
        let markup = r#"<svg width="512" height="512"><circle cx="256" cy="256" r="40"/><line x1="236" y1="256" x2="276" y2="256"/></svg>"#;
        let doc = convert_legacy_svg(markup, AspectRatio::Square).unwrap();
        assert_eq!(doc.layers.len(), 1);
        assert_eq!(doc.layers[0].id, "layer_1");
        assert_eq!(doc.layers[0].paths.len(), 2);
        assert_eq!(doc.layers[0].primary_region(), Some("center"));
    }

    #[test]
    fn test_path_data_relative_and_implicit() {
        let cmds = parse_path_data("M10 10 l5-5 5,5 H40 v10 z").unwrap();
        let coords: Vec<Vec<f64>> = cmds.iter().map(|c| c.coords.clone()).collect();
        assert_eq!(
            coords,
            vec![
                vec![10.0, 10.0],
                vec![15.0, 5.0],
                vec![20.0, 10.0],
                vec![40.0, 10.0],
                vec![40.0, 20.0],
                vec![],
            ]
        );
        assert_eq!(cmds[5].cmd, "Z");
    }

    #[test]
    fn test_path_data_smooth_curves() {
        let cmds = parse_path_data("M0 0 C10 0 20 10 20 20 S30 40 40 40").unwrap();
        assert_eq!(cmds[2].coords, vec![20.0, 30.0, 30.0, 40.0, 40.0, 40.0]);
        let quads = parse_path_data("M0 0 Q10 10 20 0 T40 0").unwrap();
        assert_eq!(quads[2].coords, vec![30.0, -10.0, 40.0, 0.0]);
    }

    #[test]
    fn test_compact_numbers() {
        let cmds = parse_path_data("M.5.5L1e1-2").unwrap();
        assert_eq!(cmds[0].coords, vec![0.5, 0.5]);
        assert_eq!(cmds[1].coords, vec![10.0, -2.0]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_legacy_svg("<g></g>"), Err(LegacyParseError::MissingRoot));
        assert!(matches!(
            parse_legacy_svg("<svg><g></svg>"),
            Err(LegacyParseError::UnbalancedTag { .. })
        ));
        assert!(matches!(
            parse_legacy_svg(r#"<svg><circle r="big"/></svg>"#),
            Err(LegacyParseError::InvalidNumber { .. })
        ));
        assert!(matches!(parse_legacy_svg("<svg><g>"), Err(LegacyParseError::UnexpectedEof(_))));
        assert!(parse_path_data("M0 0 X1 1").is_err());
        assert_eq!(
            convert_legacy_svg("<svg></svg>", AspectRatio::Square),
            Err(LegacyParseError::Empty)
        );
    }

    #[test]
    fn test_color_normalization() {
        assert_eq!(normalize_color("#ABC"), "#aabbcc");
        assert_eq!(normalize_color("Navy"), "#000080");
        assert_eq!(normalize_color("transparent"), "none");
        assert_eq!(normalize_color("url(#g)"), "url(#g)");
    }
}
