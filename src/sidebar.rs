//! Detail panes for the current selection.
//!
//! Everything is produced as an HTML fragment that the host swaps into its
//! sidebar container. Interactive elements carry a `data-command` attribute
//! holding a serialized [`Command`], so the host only has to post it back.

use std::fmt::Write as FmtWrite;

use anyhow::Result;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};
use serde_json::Value;
use url::Url;

use crate::command::Command;
use crate::config::{node_style, schema_source};
use crate::graph::{DisplayedLink, LinkKey};
use crate::schema::{Node, RelationKind, SchemaModel, parse_definition_ref};
use crate::state::{AppState, LoadFailure, Selection};
use crate::utils::{COPY_LABEL, clipboard_payload, copy_feedback, escape_html};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tooltip {
    pub id: String,
    pub text: String,
}

/// Tooltips created by the last repaint. Creating a new set always destroys
/// the previous one first, so handles never pile up across repaints.
#[derive(Debug, Default)]
pub struct TooltipRegistry {
    next: u64,
    live: Vec<Tooltip>,
}

impl TooltipRegistry {
    pub fn create(&mut self, text: &str) -> String {
        self.next += 1;
        let id = format!("tooltip-{}", self.next);
        self.live.push(Tooltip {
            id: id.clone(),
            text: text.to_string(),
        });
        id
    }

    /// Returns how many handles were released.
    pub fn destroy_all(&mut self) -> usize {
        let released = self.live.len();
        self.live.clear();
        released
    }

    pub fn live(&self) -> &[Tooltip] {
        &self.live
    }
}

#[derive(Debug, Default)]
pub struct Sidebar {
    tooltips: TooltipRegistry,
}

impl Sidebar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tooltips(&self) -> &TooltipRegistry {
        &self.tooltips
    }

    pub fn render(&mut self, state: &AppState) -> Result<String> {
        let released = self.tooltips.destroy_all();
        tracing::trace!(released, "released sidebar tooltips");

        let mut html = String::new();
        if let Some(failure) = &state.load_error {
            render_error(&mut html, failure)?;
        }

        match &state.selection {
            Selection::Node(id) => match state.model.get(id) {
                Some(node) => self.render_node(&mut html, state, node)?,
                None => render_empty(&mut html, state)?,
            },
            Selection::Link(_) => match state.selected_displayed_link() {
                Some(link) => render_link(&mut html, state, link)?,
                None => render_empty(&mut html, state)?,
            },
            Selection::None => render_empty(&mut html, state)?,
        }

        if !self.tooltips.live().is_empty() {
            html.push_str("<div class=\"tooltips\">\n");
            for tooltip in self.tooltips.live() {
                writeln!(
                    html,
                    "  <div class=\"tooltip\" role=\"tooltip\" id=\"{}\" hidden>{}</div>",
                    tooltip.id,
                    escape_html(&tooltip.text)
                )?;
            }
            html.push_str("</div>\n");
        }
        Ok(html)
    }

    fn render_node(&mut self, html: &mut String, state: &AppState, node: &Node) -> Result<()> {
        let model = &state.model;
        let (color, label) = node_style(&node.ums_type);
        let docs = schema_source(model.root_id()).docs_url;
        let docs_url = if node.is_root() {
            docs.to_string()
        } else {
            format!("{docs}#{}", node.id.to_lowercase())
        };

        writeln!(
            html,
            "<section class=\"pane node-pane\" data-node=\"{}\">\n  <header>\n    <h2>{}</h2>\n    <span class=\"badge\" style=\"background:{}\">{}</span>\n    <a class=\"docs\" href=\"{}\" target=\"_blank\" rel=\"noopener\">Documentation</a>\n  </header>",
            escape_html(&node.id),
            escape_html(&node.name),
            color,
            escape_html(label),
            escape_html(&docs_url)
        )?;

        if let Some(description) = &node.description {
            writeln!(
                html,
                "  <div class=\"description\">{}</div>",
                markdown_to_html(description, model)
            )?;
        }

        if !node.relations.is_empty() {
            html.push_str("  <h3>Relations</h3>\n  <ul class=\"relations forward\">\n");
            for relation in &node.relations {
                let displayed = state.displayed.contains_link(&LinkKey {
                    source: node.id.clone(),
                    target: relation.target.clone(),
                    property: relation.property.clone(),
                });
                let add = command_attr(&Command::AddRelation {
                    source: node.id.clone(),
                    target: relation.target.clone(),
                    property: relation.property.clone(),
                })?;
                let show = command_attr(&Command::ShowRelation {
                    source: node.id.clone(),
                    target: relation.target.clone(),
                    property: relation.property.clone(),
                })?;
                writeln!(
                    html,
                    "    <li class=\"relation {}{}\"><button class=\"relation-target\" data-command=\"{}\">{}</button> <button class=\"relation-property\" data-command=\"{}\">{}{}</button>{}</li>",
                    relation.kind.as_str(),
                    if displayed { " displayed" } else { "" },
                    add,
                    escape_html(&relation.target),
                    show,
                    escape_html(&relation.property),
                    if relation.is_array { "[]" } else { "" },
                    relation
                        .via
                        .as_deref()
                        .map(|via| format!(" <span class=\"via\">via {}</span>", escape_html(via)))
                        .unwrap_or_default()
                )?;
            }
            html.push_str("  </ul>\n");
        }

        let incoming: Vec<_> = model.incoming(&node.id).collect();
        if !incoming.is_empty() {
            html.push_str("  <h3>Referenced by</h3>\n  <ul class=\"relations reverse\">\n");
            for (source, relation) in incoming {
                let displayed = state.displayed.contains_link(&LinkKey {
                    source: source.id.clone(),
                    target: node.id.clone(),
                    property: relation.property.clone(),
                });
                let add = command_attr(&Command::AddReverseRelation {
                    source: source.id.clone(),
                    target: node.id.clone(),
                    property: relation.property.clone(),
                })?;
                writeln!(
                    html,
                    "    <li class=\"relation {}{}\"><button class=\"relation-source\" data-command=\"{}\">{}.{}</button></li>",
                    relation.kind.as_str(),
                    if displayed { " displayed" } else { "" },
                    add,
                    escape_html(&source.id),
                    escape_html(&relation.property)
                )?;
            }
            html.push_str("  </ul>\n");
        }

        if !node.properties.is_empty() {
            html.push_str(
                "  <h3>Properties</h3>\n  <table class=\"properties\">\n    <thead><tr><th>Name</th><th>Type</th><th></th></tr></thead>\n    <tbody>\n",
            );
            for (name, schema) in &node.properties {
                let tooltip = schema
                    .get("description")
                    .and_then(Value::as_str)
                    .map(|text| self.tooltips.create(text));
                let mut markers = String::new();
                if node.required.contains(name) {
                    markers.push_str("<span class=\"marker required\">required</span>");
                }
                if node.recommended.contains(name) {
                    markers.push_str("<span class=\"marker recommended\">recommended</span>");
                }
                writeln!(
                    html,
                    "      <tr data-property=\"{}\"{}><td>{}</td><td><code>{}</code></td><td>{}</td></tr>",
                    escape_html(name),
                    tooltip
                        .map(|id| format!(" aria-describedby=\"{id}\""))
                        .unwrap_or_default(),
                    escape_html(name),
                    escape_html(&property_type(schema)),
                    markers
                )?;
            }
            html.push_str("    </tbody>\n  </table>\n");
        }

        if !node.x_properties.is_empty() {
            html.push_str("  <h3>Extensions</h3>\n  <dl class=\"x-properties\">\n");
            for (key, value) in &node.x_properties {
                let shown = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                writeln!(
                    html,
                    "    <dt>{}</dt><dd><code>{}</code></dd>",
                    escape_html(key),
                    escape_html(&shown)
                )?;
            }
            html.push_str("  </dl>\n");
        }

        if !node.examples.is_empty() {
            let examples = Value::Array(node.examples.clone());
            render_json_block(html, "examples", &format!("Examples ({})", node.examples.len()), &examples)?;
        }
        render_json_block(html, "raw-schema", "Raw schema", &node.raw_schema)?;

        html.push_str("</section>\n");
        Ok(())
    }
}

fn render_link(html: &mut String, state: &AppState, link: &DisplayedLink) -> Result<()> {
    let kind = match link.kind {
        RelationKind::Composition => "Composition",
        RelationKind::Association => "Association",
    };
    writeln!(
        html,
        "<section class=\"pane link-pane\" data-link=\"{}\">\n  <header>\n    <h2>{}{}</h2>\n    <span class=\"badge {}\">{}</span>\n  </header>",
        escape_html(&link.id),
        escape_html(&link.property),
        if link.is_array { "[]" } else { "" },
        link.kind.as_str(),
        kind
    )?;

    let description = state
        .model
        .find_relation(&link.source, &link.target, &link.property)
        .and_then(|relation| relation.description.as_deref());
    if let Some(description) = description {
        writeln!(
            html,
            "  <div class=\"description\">{}</div>",
            markdown_to_html(description, &state.model)
        )?;
    }
    if let Some(via) = &link.via {
        writeln!(html, "  <p class=\"via\">Matched on <code>{}</code></p>", escape_html(via))?;
    }

    html.push_str("  <ul class=\"connections\">\n");
    for (role, id) in [("source", &link.source), ("target", &link.target)] {
        writeln!(
            html,
            "    <li class=\"{}\"><span class=\"role\">{}</span> <button data-command=\"{}\">{}</button></li>",
            role,
            role,
            command_attr(&Command::SelectNode { id: id.clone() })?,
            escape_html(id)
        )?;
    }
    html.push_str("  </ul>\n</section>\n");
    Ok(())
}

fn render_empty(html: &mut String, state: &AppState) -> Result<()> {
    writeln!(
        html,
        "<section class=\"pane empty-pane\">\n  <h2>{}</h2>\n  <p>{} entities, {} shown. Select a node or an edge to see its details.</p>\n</section>",
        escape_html(state.schema_name()),
        state.model.nodes.len(),
        state.displayed.nodes().len()
    )?;
    Ok(())
}

fn render_error(html: &mut String, failure: &LoadFailure) -> Result<()> {
    writeln!(
        html,
        "<section class=\"pane error-pane\" role=\"alert\">\n  <h2>Failed to load schema</h2>\n  <p class=\"location\"><code>{}</code></p>\n  <p class=\"message\">{}</p>\n</section>",
        escape_html(&failure.location),
        escape_html(&failure.message)
    )?;
    Ok(())
}

fn render_json_block(html: &mut String, class: &str, title: &str, value: &Value) -> Result<()> {
    let payload = clipboard_payload(value);
    writeln!(
        html,
        "  <details class=\"{}\">\n    <summary>{}</summary>\n    <button class=\"copy\" data-copy=\"{}\" data-copy-success=\"{}\" data-copy-failure=\"{}\">{}</button>\n    <pre><code>{}</code></pre>\n  </details>",
        class,
        escape_html(title),
        escape_html(&payload),
        copy_feedback(true),
        copy_feedback(false),
        COPY_LABEL,
        escape_html(&payload)
    )?;
    Ok(())
}

fn command_attr(command: &Command) -> Result<String> {
    Ok(escape_html(&serde_json::to_string(command)?))
}

/// Short type label for a property schema.
pub fn property_type(schema: &Value) -> String {
    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        return ref_name(reference);
    }

    if let Some(variants) = schema
        .get("anyOf")
        .or_else(|| schema.get("oneOf"))
        .and_then(Value::as_array)
    {
        return variants
            .iter()
            .map(property_type)
            .collect::<Vec<_>>()
            .join(" | ");
    }

    match schema.get("type") {
        Some(Value::String(kind)) if kind == "array" => match schema.get("items") {
            Some(items) if items.get("$ref").is_some() => format!("{}[]", property_type(items)),
            Some(items) if items.get("type").is_some() => format!("{}[]", property_type(items)),
            _ => "array".to_string(),
        },
        Some(Value::String(kind)) => match schema.get("format").and_then(Value::as_str) {
            Some(format) => format!("{kind} ({format})"),
            None => kind.clone(),
        },
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        _ => "any".to_string(),
    }
}

fn ref_name(reference: &str) -> String {
    parse_definition_ref(reference)
        .map(|(target, _)| target)
        .unwrap_or_else(|| {
            reference
                .rsplit('/')
                .next()
                .unwrap_or(reference)
                .to_string()
        })
}

enum LinkAction {
    Keep,
    Drop,
    Navigate,
}

/// Renders a description to HTML.
///
/// Raw HTML is shown as text. Links are kept only for `http`, `https`,
/// `mailto` and fragments; fragments naming a node (`#Package` or
/// `#/definitions/Package`, any case) become navigation links.
pub fn markdown_to_html(markdown: &str, model: &SchemaModel) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut actions: Vec<LinkAction> = Vec::new();

    let events = parser.filter_map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => {
            let target = dest_url.trim();
            if let Some(fragment) = target.strip_prefix('#') {
                match resolve_fragment(fragment, model) {
                    Some(node) => {
                        actions.push(LinkAction::Navigate);
                        let command = command_attr(&Command::RevealNode { id: node.to_string() })
                            .unwrap_or_default();
                        Some(Event::Html(CowStr::from(format!(
                            "<a class=\"node-link\" href=\"#\" data-command=\"{command}\">"
                        ))))
                    }
                    None => {
                        tracing::warn!(link = %target, "description links to an unknown node");
                        actions.push(LinkAction::Keep);
                        Some(Event::Start(Tag::Link {
                            link_type,
                            dest_url,
                            title,
                            id,
                        }))
                    }
                }
            } else if is_safe_url(target) {
                actions.push(LinkAction::Keep);
                Some(Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }))
            } else {
                actions.push(LinkAction::Drop);
                None
            }
        }
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => {
            if is_safe_url(dest_url.trim()) {
                actions.push(LinkAction::Keep);
                Some(Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }))
            } else {
                actions.push(LinkAction::Drop);
                None
            }
        }
        Event::End(end @ (TagEnd::Link | TagEnd::Image)) => match actions.pop() {
            Some(LinkAction::Drop) => None,
            Some(LinkAction::Navigate) => Some(Event::Html(CowStr::Borrowed("</a>"))),
            Some(LinkAction::Keep) | None => Some(Event::End(end)),
        },
        other => Some(other),
    });

    let mut rendered = String::new();
    html::push_html(&mut rendered, events);
    rendered
}

fn is_safe_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https" | "mailto"))
        .unwrap_or(false)
}

fn resolve_fragment<'a>(fragment: &str, model: &'a SchemaModel) -> Option<&'a str> {
    let name = fragment
        .strip_prefix("/definitions/")
        .or_else(|| fragment.strip_prefix("definitions/"))
        .unwrap_or(fragment);
    if name.is_empty() {
        return None;
    }
    model
        .order
        .iter()
        .find(|id| id.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadError;
    use crate::state::ViewSettings;
    use serde_json::json;

    fn state() -> AppState {
        AppState::from_document(
            &json!({
                "properties": {
                    "packages": { "type": "array", "items": { "$ref": "#/definitions/Package" } }
                },
                "definitions": {
                    "Package": {
                        "description": "A package. See [vendor](#/definitions/vendor) and <script>alert(1)</script>",
                        "required": ["ordId"],
                        "x-recommended": ["title"],
                        "x-ums-type": "root",
                        "examples": [{ "ordId": "sap:package:x:v1" }],
                        "properties": {
                            "ordId": { "type": "string", "description": "Unique id" },
                            "title": { "type": "string", "description": "Display title" },
                            "vendor": {
                                "type": "string",
                                "description": "Owning vendor",
                                "x-association-target": ["#/definitions/Vendor/ordId"]
                            },
                            "tags": { "type": "array", "items": { "type": "string" } }
                        }
                    },
                    "Vendor": {
                        "title": "Vendor \"<b>\"",
                        "properties": { "ordId": { "type": "string", "format": "uri" } }
                    }
                }
            }),
            "Document",
            ViewSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn node_pane_lists_relations_in_both_directions() {
        let mut state = state();
        state.select_node("Package");
        let html = Sidebar::new().render(&state).unwrap();

        assert!(html.contains("class=\"relation association\""));
        assert!(html.contains("&quot;type&quot;:&quot;addRelation&quot;"));
        assert!(html.contains("&quot;type&quot;:&quot;showRelation&quot;"));
        assert!(html.contains("<button class=\"relation-source\""));
        assert!(html.contains("&quot;type&quot;:&quot;addReverseRelation&quot;"));
        assert!(html.contains("class=\"relation composition displayed\""));

        let order = ["Documentation", "Relations", "Referenced by", "Properties", "Extensions", "Examples (1)", "Raw schema"];
        let positions: Vec<usize> = order.iter().map(|label| html.find(label).unwrap()).collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn property_table_marks_required_and_recommended() {
        let mut state = state();
        state.select_node("Package");
        let html = Sidebar::new().render(&state).unwrap();
        let ord_row = html.lines().find(|line| line.contains("data-property=\"ordId\"")).unwrap();
        assert!(ord_row.contains("marker required"));
        let title_row = html.lines().find(|line| line.contains("data-property=\"title\"")).unwrap();
        assert!(title_row.contains("marker recommended"));
        let tags_row = html.lines().find(|line| line.contains("data-property=\"tags\"")).unwrap();
        assert!(tags_row.contains("<code>string[]</code>"));
    }

    #[test]
    fn repaints_replace_tooltips() {
        let mut state = state();
        state.select_node("Package");
        let mut sidebar = Sidebar::new();
        sidebar.render(&state).unwrap();
        assert_eq!(sidebar.tooltips().live().len(), 3);
        sidebar.render(&state).unwrap();
        sidebar.render(&state).unwrap();
        assert_eq!(sidebar.tooltips().live().len(), 3);
        state.clear_selection();
        sidebar.render(&state).unwrap();
        assert!(sidebar.tooltips().live().is_empty());
    }

    #[test]
    fn dynamic_text_is_escaped() {
        let mut state = state();
        state.reveal_and_select("Vendor");
        let html = Sidebar::new().render(&state).unwrap();
        assert!(html.contains("Vendor &quot;&lt;b&gt;&quot;"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("<code>string (uri)</code>"));
    }

    #[test]
    fn link_pane_shows_description_and_connections() {
        let mut state = state();
        state.restore_link("Package-Vendor-vendor");
        let html = Sidebar::new().render(&state).unwrap();
        assert!(html.contains("link-pane"));
        assert!(html.contains("Owning vendor"));
        assert!(html.contains("Matched on <code>ordId</code>"));
        assert!(html.contains("<li class=\"source\">"));
        assert!(html.contains("<li class=\"target\">"));
        assert!(html.contains("&quot;type&quot;:&quot;selectNode&quot;,&quot;id&quot;:&quot;Vendor&quot;"));
    }

    #[test]
    fn copy_buttons_carry_feedback_labels() {
        let mut state = state();
        state.select_node("Package");
        let html = Sidebar::new().render(&state).unwrap();
        let start = html.find("<button class=\"copy\"").unwrap();
        let end = start + html[start..].find("</button>").unwrap();
        let button = &html[start..end];
        assert!(button.contains("data-copy=\"{\n"));
        assert!(button.contains("data-copy-success=\"Copied!\""));
        assert!(button.contains("data-copy-failure=\"Copy failed\""));
    }

    #[test]
    fn error_panel_shows_location_and_message() {
        let mut state = state();
        let ticket = state.begin_load("Configuration");
        state.finish_load(
            ticket,
            Err(LoadError::Http {
                location: "https://example.com/Configuration.schema.json".into(),
                status: 500,
            }),
        );
        let html = Sidebar::new().render(&state).unwrap();
        assert!(html.contains("error-pane"));
        assert!(html.contains("https://example.com/Configuration.schema.json"));
        assert!(html.contains("HTTP status 500"));
    }

    #[test]
    fn markdown_escapes_html_and_drops_unsafe_links() {
        let model = state().model;
        let rendered = markdown_to_html(
            "Hi <img src=x onerror=alert(1)> [bad](javascript:alert(1)) [ok](https://example.com)",
            &model,
        );
        assert!(rendered.contains("&lt;img"));
        assert!(!rendered.contains("<img"));
        assert!(!rendered.contains("javascript:"));
        assert!(rendered.contains("bad"));
        assert!(rendered.contains("<a href=\"https://example.com\">ok</a>"));
    }

    #[test]
    fn markdown_fragments_resolve_to_nodes() {
        let model = state().model;
        let rendered = markdown_to_html("[v](#/definitions/vendor) [p](#PACKAGE) [x](#nowhere)", &model);
        assert!(rendered.contains("&quot;type&quot;:&quot;revealNode&quot;,&quot;id&quot;:&quot;Vendor&quot;"));
        assert!(rendered.contains("&quot;id&quot;:&quot;Package&quot;"));
        assert!(rendered.contains("<a href=\"#nowhere\">x</a>"));
    }

    #[test]
    fn infers_property_types() {
        assert_eq!(property_type(&json!({ "$ref": "#/definitions/Package" })), "Package");
        assert_eq!(
            property_type(&json!({ "type": "array", "items": { "$ref": "#/definitions/Package" } })),
            "Package[]"
        );
        assert_eq!(
            property_type(&json!({ "type": "string", "format": "date-time" })),
            "string (date-time)"
        );
        assert_eq!(
            property_type(&json!({ "anyOf": [{ "type": "string" }, { "$ref": "#/definitions/Label" }] })),
            "string | Label"
        );
        assert_eq!(property_type(&json!({ "type": ["string", "null"] })), "string | null");
        assert_eq!(property_type(&json!({})), "any");
    }
}
