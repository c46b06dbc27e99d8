//! SVG emission.

use std::fmt::Write;

use super::Theme;
use super::layout::{Layout, Placement};
use super::parser::{Edge, Flowchart, LinkStyle, Shape};
use crate::editor::escape_html;

/// Emit standalone SVG markup. `id` scopes marker definitions to this render.
pub fn emit(chart: &Flowchart, layout: &Layout, theme: &Theme, id: &str) -> String {
    let mut svg = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" id="{id}" class="flowchart" width="{w:.0}" height="{h:.0}" viewBox="0 0 {w:.0} {h:.0}" role="img" font-family="{font}" font-size="{size}">"#,
        id = id,
        w = layout.width,
        h = layout.height,
        font = theme.font_family,
        size = theme.font_size,
    );
    let _ = writeln!(
        svg,
        r#"<defs><marker id="{id}-arrow" viewBox="0 0 10 10" refX="9" refY="5" markerWidth="8" markerHeight="8" orient="auto-start-reverse"><path d="M 0 0 L 10 5 L 0 10 z" fill="{stroke}"/></marker></defs>"#,
        id = id,
        stroke = theme.stroke,
    );

    for edge in &chart.edges {
        emit_edge(&mut svg, edge, layout, theme, id);
    }

    for (node, place) in chart.nodes.iter().zip(&layout.nodes) {
        let (x, y, w, h) = (place.x, place.y, place.width, place.height);
        let _ = write!(svg, r#"<g class="node" id="{}-{}">"#, id, escape_html(&node.id));
        match node.shape {
            Shape::Rect | Shape::Round => {
                let radius = if node.shape == Shape::Round { h / 2.0 } else { 0.0 };
                let _ = write!(
                    svg,
                    r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" rx="{:.1}" fill="{}" stroke="{}"/>"#,
                    x - w / 2.0,
                    y - h / 2.0,
                    w,
                    h,
                    radius,
                    theme.fill,
                    theme.stroke
                );
            }
            Shape::Decision => {
                let _ = write!(
                    svg,
                    r#"<polygon points="{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} {:.1},{:.1}" fill="{}" stroke="{}"/>"#,
                    x,
                    y - h / 2.0,
                    x + w / 2.0,
                    y,
                    x,
                    y + h / 2.0,
                    x - w / 2.0,
                    y,
                    theme.fill,
                    theme.stroke
                );
            }
        }
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" dominant-baseline="central">{}</text></g>"#,
            x,
            y,
            escape_html(&node.label)
        );
    }

    svg.push_str("</svg>");
    svg
}

fn emit_edge(svg: &mut String, edge: &Edge, layout: &Layout, theme: &Theme, id: &str) {
    let from = layout.nodes[edge.from];
    let to = layout.nodes[edge.to];

    let (dash, width) = match edge.style {
        LinkStyle::Dotted => (r#" stroke-dasharray="3 3""#, 1.5),
        LinkStyle::Thick => ("", 3.0),
        LinkStyle::Arrow | LinkStyle::Open => ("", 1.5),
    };
    let marker = if edge.style.has_arrowhead() {
        format!(r#" marker-end="url(#{}-arrow)""#, id)
    } else {
        String::new()
    };

    let (mid_x, mid_y) = if edge.from == edge.to {
        // Self link: loop out of the right side
        let (x, y) = (from.x + from.width / 2.0, from.y);
        let _ = writeln!(
            svg,
            r#"<path class="edge" d="M {:.1} {:.1} C {:.1} {:.1}, {:.1} {:.1}, {:.1} {:.1}" fill="none" stroke="{}" stroke-width="{}"{}{}/>"#,
            x,
            y - 8.0,
            x + 36.0,
            y - 30.0,
            x + 36.0,
            y + 30.0,
            x,
            y + 8.0,
            theme.stroke,
            width,
            dash,
            marker
        );
        (x + 30.0, y)
    } else {
        let (x1, y1) = boundary(from, to.x - from.x, to.y - from.y);
        let (x2, y2) = boundary(to, from.x - to.x, from.y - to.y);
        let _ = writeln!(
            svg,
            r#"<line class="edge" x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{}"{}{}/>"#,
            x1, y1, x2, y2, theme.stroke, width, dash, marker
        );
        ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
    };

    if let Some(label) = &edge.label {
        let _ = writeln!(
            svg,
            r#"<text class="edge-label" x="{:.1}" y="{:.1}" text-anchor="middle" dominant-baseline="central">{}</text>"#,
            mid_x,
            mid_y,
            escape_html(label)
        );
    }
}

/// Point where the ray from the center of `place` along `(dx, dy)` leaves its box.
fn boundary(place: Placement, dx: f64, dy: f64) -> (f64, f64) {
    let (hw, hh) = (place.width / 2.0, place.height / 2.0);
    if dx == 0.0 && dy == 0.0 {
        return (place.x, place.y);
    }
    let tx = if dx == 0.0 { f64::INFINITY } else { hw / dx.abs() };
    let ty = if dy == 0.0 { f64::INFINITY } else { hh / dy.abs() };
    let t = tx.min(ty);
    (place.x + dx * t, place.y + dy * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::layout::layout;

    fn render(text: &str, id: &str) -> String {
        let theme = Theme::default();
        let chart = Flowchart::parse(text).unwrap();
        let layout = layout(&chart, &theme);
        emit(&chart, &layout, &theme, id)
    }

    #[test]
    fn test_svg_structure() {
        let svg = render("graph TD; A[Start]-->|go|B{x < y}", "mermaid-svg-test");
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" id=\"mermaid-svg-test\""));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("<marker id=\"mermaid-svg-test-arrow\""));
        assert!(svg.contains("marker-end=\"url(#mermaid-svg-test-arrow)\""));
        assert!(svg.contains(">Start</text>"));
        assert!(svg.contains(">go</text>"));
        assert!(svg.contains("<polygon"));
        assert!(svg.contains("x &lt; y"));
    }

    #[test]
    fn test_link_styles() {
        let svg = render("graph LR; A---B; B-.->C; C==>C", "d");
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("stroke-width=\"3\""));
        // Self link is drawn as a curve
        assert!(svg.contains("<path class=\"edge\""));
        // The open link has no arrowhead; dotted and thick do
        assert_eq!(svg.matches("marker-end=").count(), 2);
    }

    #[test]
    fn test_boundary_clips_to_box() {
        let place = Placement {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 40.0,
        };
        assert_eq!(boundary(place, 0.0, 10.0), (0.0, 20.0));
        assert_eq!(boundary(place, -10.0, 0.0), (-50.0, 0.0));
        assert_eq!(boundary(place, 0.0, 0.0), (0.0, 0.0));
    }
}
