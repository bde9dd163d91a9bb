use std::collections::{HashMap, HashSet};
use std::fmt::Write as FmtWrite;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::node_style;
use crate::graph::DisplayedLink;
use crate::layout::{Point, label_anchor, self_loop};
use crate::schema::RelationKind;
use crate::state::AppState;
use crate::utils::escape_html;
use crate::*;

const STYLE_BLOCK: &str = r#"
    .edge { fill: none; stroke: #64748b; stroke-width: 1.6; }
    .edge.association { stroke-dasharray: 6 4; }
    .edge.selected { stroke: #e11d48; stroke-width: 3; }
    .edge-label rect { fill: #ffffff; fill-opacity: 0.92; stroke: #cbd5e1; }
    .edge-label text { fill: #334155; font-size: 11px; }
    .node circle { stroke: #1e293b; stroke-width: 1.5; }
    .node text { fill: #0f172a; font-size: 12px; font-weight: 600; }
    .node.selected circle { stroke: #e11d48; stroke-width: 4; }
    .highlighted circle, .edge.highlighted { stroke-width: 3; }
    .dimmed { opacity: 0.25; }
"#;

/// Bounds of everything drawn, used to size the viewBox.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl Bounds {
    fn empty() -> Self {
        Self {
            min_x: f32::MAX,
            min_y: f32::MAX,
            max_x: f32::MIN,
            max_y: f32::MIN,
        }
    }

    fn include(&mut self, center: Point, half_width: f32, half_height: f32) {
        self.min_x = self.min_x.min(center.x - half_width);
        self.max_x = self.max_x.max(center.x + half_width);
        self.min_y = self.min_y.min(center.y - half_height);
        self.max_y = self.max_y.max(center.y + half_height);
    }

    fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }
}

fn measure_label_box(text: &str) -> (f32, f32) {
    let width = (EDGE_LABEL_CHAR_WIDTH * text.chars().count() as f32
        + EDGE_LABEL_HORIZONTAL_PADDING)
        .max(EDGE_LABEL_MIN_WIDTH);
    (width, EDGE_LABEL_HEIGHT)
}

fn edge_label_text(link: &DisplayedLink) -> String {
    if link.is_array {
        format!("{}[]", link.property)
    } else {
        link.property.clone()
    }
}

fn node_label_position(center: Point) -> Point {
    Point::new(center.x, center.y + NODE_RADIUS + NODE_LABEL_GAP)
}

/// Hover overlay: which nodes and links stay highlighted.
struct Emphasis<'a> {
    hovered: Option<&'a str>,
    neighborhood: HashSet<&'a str>,
}

impl<'a> Emphasis<'a> {
    fn new(state: &'a AppState) -> Self {
        let hovered = state.hover.as_deref();
        let neighborhood = hovered
            .map(|id| state.displayed.neighborhood(id))
            .unwrap_or_default();
        Self {
            hovered,
            neighborhood,
        }
    }

    fn node_class(&self, id: &str) -> &'static str {
        match self.hovered {
            None => "",
            Some(_) if self.neighborhood.contains(id) => " highlighted",
            Some(_) => " dimmed",
        }
    }

    fn link_class(&self, link: &DisplayedLink) -> &'static str {
        match self.hovered {
            None => "",
            Some(hovered) if link.touches(hovered) => " highlighted",
            Some(_) => " dimmed",
        }
    }
}

/// Renders the displayed graph of `state` as a standalone SVG document.
pub fn render_svg(state: &AppState, background: &str) -> Result<String> {
    let mut positions: HashMap<&str, Point> = HashMap::new();
    for id in state.displayed.nodes() {
        let point = state
            .layout
            .position(id)
            .ok_or_else(|| anyhow!("missing layout for node '{id}'"))?;
        positions.insert(id.as_str(), point);
    }
    if positions.is_empty() {
        bail!("nothing is displayed");
    }

    let mut bounds = Bounds::empty();
    for id in state.displayed.nodes() {
        let center = positions[id.as_str()];
        bounds.include(center, NODE_RADIUS, NODE_RADIUS);
        let name = state.model.get(id).map(|node| node.name.as_str()).unwrap_or(id);
        let half_text = NODE_LABEL_CHAR_WIDTH * name.chars().count() as f32 / 2.0;
        bounds.include(node_label_position(center), half_text, NODE_LABEL_GAP);
    }
    for link in state.displayed.links() {
        let (Some(&source), Some(&target)) = (
            positions.get(link.source.as_str()),
            positions.get(link.target.as_str()),
        ) else {
            continue;
        };
        let anchor = label_anchor(source, target, link.is_self_loop());
        if link.is_self_loop() {
            bounds.include(anchor, SELF_LOOP_RADIUS, 0.0);
        }
        if state.settings.labels {
            let (width, height) = measure_label_box(&edge_label_text(link));
            bounds.include(anchor, width / 2.0, height / 2.0);
        }
    }
    if !bounds.is_valid() {
        bail!("unable to compute graph bounds");
    }

    let width = bounds.max_x - bounds.min_x + LAYOUT_MARGIN * 2.0;
    let height = bounds.max_y - bounds.min_y + LAYOUT_MARGIN * 2.0;
    let origin_x = bounds.min_x - LAYOUT_MARGIN;
    let origin_y = bounds.min_y - LAYOUT_MARGIN;
    let emphasis = Emphasis::new(state);

    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" class="schema-graph" data-schema="{}" width="{:.0}" height="{:.0}" viewBox="{:.1} {:.1} {:.1} {:.1}" font-family="Inter, system-ui, sans-serif">
  <style>{}</style>
  <defs>
    <marker id="arrow" markerWidth="10" markerHeight="10" refX="8" refY="5" orient="auto" markerUnits="userSpaceOnUse">
      <path d="M1,1 L9,5 L1,9 z" fill="context-stroke" />
    </marker>
  </defs>
  <rect class="background" x="{:.1}" y="{:.1}" width="100%" height="100%" fill="{}" />
"##,
        escape_html(state.schema_name()),
        width,
        height,
        origin_x,
        origin_y,
        width,
        height,
        STYLE_BLOCK,
        origin_x,
        origin_y,
        escape_html(background)
    )?;

    let selected_link = state.selected_link();
    for link in state.displayed.links() {
        let (Some(&source), Some(&target)) = (
            positions.get(link.source.as_str()),
            positions.get(link.target.as_str()),
        ) else {
            continue;
        };

        let kind_class = match link.kind {
            RelationKind::Composition => "composition",
            RelationKind::Association => "association",
        };
        let selected_class = if selected_link == Some(link.id.as_str()) {
            " selected"
        } else {
            ""
        };

        if link.is_self_loop() {
            let arc = self_loop(source);
            write!(
                svg,
                "  <path class=\"edge {}{}{}\" data-link=\"{}\" d=\"M{:.1},{:.1} A{:.1},{:.1} 0 1 1 {:.1},{:.1}\" marker-end=\"url(#arrow)\" />\n",
                kind_class,
                selected_class,
                emphasis.link_class(link),
                escape_html(&link.id),
                arc.start.x,
                arc.start.y,
                arc.radius,
                arc.radius,
                arc.end.x,
                arc.end.y
            )?;
        } else {
            let (start, end) = trim_to_circles(source, target);
            write!(
                svg,
                "  <line class=\"edge {}{}{}\" data-link=\"{}\" x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" marker-end=\"url(#arrow)\" />\n",
                kind_class,
                selected_class,
                emphasis.link_class(link),
                escape_html(&link.id),
                start.x,
                start.y,
                end.x,
                end.y
            )?;
        }

        if state.settings.labels {
            let anchor = label_anchor(source, target, link.is_self_loop());
            let text = edge_label_text(link);
            let (box_width, box_height) = measure_label_box(&text);
            write!(
                svg,
                "  <g class=\"edge-label{}\" data-link=\"{}\" pointer-events=\"none\">\n    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"4\" ry=\"4\" />\n    <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n  </g>\n",
                emphasis.link_class(link),
                escape_html(&link.id),
                anchor.x - box_width / 2.0,
                anchor.y - box_height / 2.0,
                box_width,
                box_height,
                anchor.x,
                anchor.y,
                escape_html(&text)
            )?;
        }
    }

    let selected_node = state.selected_node();
    for id in state.displayed.nodes() {
        let Some(node) = state.model.get(id) else {
            continue;
        };
        let center = positions[id.as_str()];
        let (fill, _) = node_style(&node.ums_type);
        let selected_class = if selected_node == Some(id.as_str()) {
            " selected"
        } else {
            ""
        };
        let label = node_label_position(center);

        write!(
            svg,
            "  <g class=\"node {}{}{}\" data-node=\"{}\">\n    <title>{}</title>\n    <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"{:.1}\" fill=\"{}\" />\n    <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n  </g>\n",
            escape_html(node.ums_type.as_str()),
            selected_class,
            emphasis.node_class(id),
            escape_html(id),
            escape_html(node.description.as_deref().unwrap_or(&node.name)),
            center.x,
            center.y,
            NODE_RADIUS,
            fill,
            label.x,
            label.y,
            escape_html(&node.name)
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Pulls both ends of a straight edge back to the node circles.
fn trim_to_circles(source: Point, target: Point) -> (Point, Point) {
    let dx = target.x - source.x;
    let dy = target.y - source.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length <= NODE_RADIUS * 2.0 {
        return (source, target);
    }
    let (ux, uy) = (dx / length, dy / length);
    (
        Point::new(source.x + ux * NODE_RADIUS, source.y + uy * NODE_RADIUS),
        Point::new(
            target.x - ux * (NODE_RADIUS + ARROW_GAP),
            target.y - uy * (NODE_RADIUS + ARROW_GAP),
        ),
    )
}

/// `{timestamp}_ord-schema-{schema}.svg`, with `:` replaced so the name is
/// valid on every filesystem.
pub fn export_file_name(schema: &str, now: DateTime<Utc>) -> String {
    let timestamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    format!("{timestamp}_ord-schema-{}.svg", schema.to_lowercase())
}

#[cfg(feature = "png")]
pub fn render_png(svg: &str, scale: f32) -> Result<Vec<u8>> {
    use tiny_skia::{Pixmap, Transform};

    if scale <= 0.0 {
        bail!("scale must be greater than zero when rendering PNG output");
    }

    let mut options = resvg::usvg::Options::default();
    options.font_family = "Inter".to_string();
    options.fontdb_mut().load_system_fonts();

    let tree = resvg::usvg::Tree::from_str(svg, &options)
        .map_err(|err| anyhow!("failed to parse generated SVG for PNG export: {err}"))?;

    let size = tree.size().to_int_size();
    let scaled_width = (size.width() as f32 * scale).ceil();
    let scaled_height = (size.height() as f32 * scale).ceil();

    if !scaled_width.is_finite() || !scaled_height.is_finite() {
        bail!("scaled dimensions are not finite; try a smaller scale factor");
    }
    if scaled_width < 1.0 || scaled_height < 1.0 {
        bail!("scaled dimensions collapsed below 1px; try a larger scale factor");
    }
    if scaled_width > u32::MAX as f32 || scaled_height > u32::MAX as f32 {
        bail!("scaled dimensions exceed supported limits; try a smaller scale factor");
    }

    let (width, height) = (scaled_width as u32, scaled_height as u32);
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("failed to allocate {width}x{height} surface for PNG export"))?;

    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|err| anyhow!("failed to encode PNG output: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::state::ViewSettings;
    use chrono::TimeZone;
    use serde_json::json;

    fn state() -> AppState {
        AppState::from_document(
            &json!({
                "properties": {
                    "packages": { "type": "array", "items": { "$ref": "#/definitions/Package" } }
                },
                "definitions": {
                    "Package": {
                        "title": "Package <b>",
                        "properties": {
                            "parent": { "type": "string", "x-association-target": ["#/definitions/Package/ordId"] }
                        }
                    }
                }
            }),
            "Document",
            ViewSettings {
                depth: 2,
                ..ViewSettings::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn renders_nodes_edges_and_labels() {
        let svg = render_svg(&state(), "white").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<style>"));
        assert!(svg.contains("data-node=\"Package\""));
        assert!(svg.contains("data-link=\"Document-Package-packages\""));
        assert!(svg.contains(">packages[]</text>"));
        assert!(svg.contains("Package &lt;b&gt;"));
        assert!(!svg.contains("Package <b>"));
    }

    #[test]
    fn self_loops_render_as_arcs() {
        let svg = render_svg(&state(), "white").unwrap();
        let loop_line = svg
            .lines()
            .find(|line| line.contains("data-link=\"Package-Package-parent\"") && line.contains("<path"))
            .expect("self loop should be drawn as a path");
        assert!(loop_line.contains(" A"));
        assert!(loop_line.contains("association"));
    }

    #[test]
    fn labels_can_be_hidden() {
        let mut state = state();
        state.dispatch(Command::SetLabels { labels: false });
        let svg = render_svg(&state, "white").unwrap();
        assert!(!svg.contains("<g class=\"edge-label"));
    }

    #[test]
    fn marks_selection_and_hover() {
        let mut state = state();
        state.dispatch(Command::SelectNode { id: "Package".into() });
        state.dispatch(Command::Hover { id: Some("Document".into()) });
        let svg = render_svg(&state, "white").unwrap();
        assert!(svg.contains("class=\"node default selected highlighted\" data-node=\"Package\""));
        assert!(svg.contains("class=\"node root highlighted\" data-node=\"Document\""));
        assert!(svg.contains("edge association dimmed"));
    }

    #[test]
    fn export_name_uses_timestamp_and_lowercase_schema() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
        assert_eq!(
            export_file_name("Configuration", now),
            "2024-05-17T08-30-00.000Z_ord-schema-configuration.svg"
        );
    }

    #[cfg(feature = "png")]
    #[test]
    fn png_output_has_png_header() {
        let svg = render_svg(&state(), "white").unwrap();
        let png = render_png(&svg, 1.0).unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    }
}
