//! SVG Rendering
//!
//! Serializes a unified-layered document to SVG markup, one `<g>` per layer.

use std::fmt::Write;

use crate::canvas::CanvasConfig;
use crate::document::{PathCommand, PathStyle, UnifiedLayeredDocument};

pub fn render_document(doc: &UnifiedLayeredDocument) -> String {
    let (w, h) = (doc.canvas.width, doc.canvas.height);
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = fmt_num(w),
        h = fmt_num(h)
    );
    for layer in &doc.layers {
        let _ = write!(
            svg,
            r#"<g id="{}" data-label="{}">"#,
            escape_attr(&layer.id),
            escape_attr(&layer.label)
        );
        for path in &layer.paths {
            let _ = write!(
                svg,
                r#"<path id="{}" d="{}"{}/>"#,
                escape_attr(&path.id),
                path_data(&path.commands),
                style_attrs(&path.style)
            );
        }
        svg.push_str("</g>");
    }
    svg.push_str("</svg>");
    svg
}

/// `d` attribute for a command list. Unknown commands are skipped.
pub fn path_data(commands: &[PathCommand]) -> String {
    let mut parts = Vec::with_capacity(commands.len());
    for cmd in commands {
        let Some(kind) = cmd.kind() else { continue };
        if cmd.coords.is_empty() {
            parts.push(kind.tag().to_string());
        } else {
            let coords: Vec<String> = cmd.coords.iter().map(|c| fmt_num(*c)).collect();
            parts.push(format!("{} {}", kind.tag(), coords.join(" ")));
        }
    }
    parts.join(" ")
}

fn style_attrs(style: &PathStyle) -> String {
    let mut out = String::new();
    // SVG defaults fill to black; keep that explicit
    let fill = style.fill.as_deref().unwrap_or("#000000");
    let _ = write!(out, r#" fill="{}""#, escape_attr(fill));
    if let Some(stroke) = &style.stroke {
        let _ = write!(out, r#" stroke="{}""#, escape_attr(stroke));
    }
    if let Some(width) = style.stroke_width {
        let _ = write!(out, r#" stroke-width="{}""#, fmt_num(width));
    }
    if let Some(cap) = &style.stroke_linecap {
        let _ = write!(out, r#" stroke-linecap="{}""#, escape_attr(cap));
    }
    if let Some(join) = &style.stroke_linejoin {
        let _ = write!(out, r#" stroke-linejoin="{}""#, escape_attr(join));
    }
    if let Some(opacity) = style.opacity {
        let _ = write!(out, r#" opacity="{}""#, fmt_num(opacity));
    }
    out
}

/// Rendered stand-in for a request every tier failed on.
pub fn placeholder_svg(canvas: &CanvasConfig, message: &str) -> String {
    let (w, h) = (fmt_num(canvas.width), fmt_num(canvas.height));
    let cx = fmt_num(canvas.width / 2.0);
    let cy = fmt_num(canvas.height / 2.0);
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r##"<rect x="0" y="0" width="{w}" height="{h}" fill="#f3f4f6"/>"##,
            r##"<rect x="8" y="8" width="{iw}" height="{ih}" fill="none" stroke="#9ca3af" stroke-width="2" stroke-dasharray="8 6"/>"##,
            r##"<text x="{cx}" y="{cy}" text-anchor="middle" font-family="sans-serif" font-size="18" fill="#4b5563">Generation failed</text>"##,
            r##"<text x="{cx}" y="{cy2}" text-anchor="middle" font-family="sans-serif" font-size="11" fill="#6b7280">{msg}</text>"##,
            "</svg>"
        ),
        w = w,
        h = h,
        iw = fmt_num((canvas.width - 16.0).max(0.0)),
        ih = fmt_num((canvas.height - 16.0).max(0.0)),
        cx = cx,
        cy = cy,
        cy2 = fmt_num(canvas.height / 2.0 + 22.0),
        msg = escape_text(&truncate(message, 80)),
    )
}

/// At most 2 decimals, no trailing zeros.
pub fn fmt_num(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    let s = format!("{:.2}", rounded);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_text(value: &str) -> String {
    escape_attr(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::AspectRatio;
    use crate::document::{UnifiedLayer, UnifiedPath};

    #[test]
    fn test_number_formatting() {
        assert_eq!(fmt_num(512.0), "512");
        assert_eq!(fmt_num(1.5), "1.5");
        assert_eq!(fmt_num(1.23456), "1.23");
        assert_eq!(fmt_num(-0.001), "0");
    }

    #[test]
    fn test_render_layers_and_paths() {
        let doc = UnifiedLayeredDocument::new(
            AspectRatio::Widescreen,
            vec![UnifiedLayer::new(
                "bg",
                "Sky & sea",
                vec![UnifiedPath::new(
                    "p1",
                    PathStyle::filled("#112233"),
                    vec![PathCommand::move_to(0.0, 0.0), PathCommand::line_to(10.5, 3.0), PathCommand::close()],
                )],
            )],
        );
        let svg = render_document(&doc);
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="512" height="288" viewBox="0 0 512 288">"#));
        assert!(svg.contains(r#"<g id="bg" data-label="Sky &amp; sea">"#));
        assert!(svg.contains(r##"<path id="p1" d="M 0 0 L 10.5 3 Z" fill="#112233"/>"##));
        assert!(svg.ends_with("</g></svg>"));
    }

    #[test]
    fn test_placeholder_escapes_message() {
        let svg = placeholder_svg(&AspectRatio::Square.config(), "bad <input>");
        assert!(svg.contains("Generation failed"));
        assert!(svg.contains("bad &lt;input&gt;"));
        assert!(svg.contains(r#"viewBox="0 0 512 512""#));
    }
}
