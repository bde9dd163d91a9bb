//! View state <-> URL query string.
//!
//! Unknown or malformed parameters fall back to their defaults without
//! complaint, so any bookmarked URL still opens something sensible.

use url::Url;
use url::form_urlencoded;

use crate::config::{DEFAULT_SCHEMA, Density, is_known_schema};
use crate::state::{AppState, Selection, ViewSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlState {
    pub schema: String,
    pub settings: ViewSettings,
    pub node: Option<String>,
    pub link: Option<String>,
}

impl Default for UrlState {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            settings: ViewSettings::default(),
            node: None,
            link: None,
        }
    }
}

impl UrlState {
    /// Parses a query string with or without the leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut state = Self::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "schema" if is_known_schema(&value) => state.schema = value.into_owned(),
                "depth" => {
                    if let Ok(depth) = value.trim().parse::<u32>() {
                        state.settings.depth = depth;
                    }
                }
                "density" => {
                    if let Ok(density) = value.parse::<Density>() {
                        state.settings.density = density;
                    }
                }
                "labels" => {
                    if let Some(labels) = parse_bool(&value) {
                        state.settings.labels = labels;
                    }
                }
                "node" if !value.is_empty() => state.node = Some(value.into_owned()),
                "link" if !value.is_empty() => state.link = Some(value.into_owned()),
                _ => {}
            }
        }

        if state.node.is_some() {
            state.link = None;
        }
        state
    }

    pub fn from_url(url: &Url) -> Self {
        Self::parse(url.query().unwrap_or_default())
    }

    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer
            .append_pair("schema", &self.schema)
            .append_pair("depth", &self.settings.depth.to_string())
            .append_pair("density", self.settings.density.as_str())
            .append_pair("labels", if self.settings.labels { "true" } else { "false" });
        if let Some(node) = &self.node {
            serializer.append_pair("node", node);
        } else if let Some(link) = &self.link {
            serializer.append_pair("link", link);
        }
        serializer.finish()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AppState {
    pub fn url_state(&self) -> UrlState {
        let (node, link) = match &self.selection {
            Selection::None => (None, None),
            Selection::Node(id) => (Some(id.clone()), None),
            Selection::Link(id) => (None, Some(id.clone())),
        };
        UrlState {
            schema: self.schema_name().to_string(),
            settings: self.settings,
            node,
            link,
        }
    }

    /// Applies settings and selection from the URL to an already loaded
    /// schema. The schema parameter itself is handled by the host's loader.
    pub fn apply_url_state(&mut self, url: &UrlState) -> bool {
        let mut changed = false;
        if self.settings.depth != url.settings.depth {
            self.settings.depth = url.settings.depth;
            self.initialize();
            changed = true;
        }
        if self.settings.density != url.settings.density {
            self.settings.density = url.settings.density;
            self.relayout();
            changed = true;
        }
        self.settings.labels = url.settings.labels;

        if let Some(node) = &url.node {
            changed |= self.reveal_and_select(node);
        } else if let Some(link) = &url.link {
            let before = self.displayed.links().len();
            self.restore_link(link);
            changed |= self.displayed.links().len() != before;
        } else {
            self.prune_selection();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_when_empty() {
        assert_eq!(UrlState::parse(""), UrlState::default());
        assert_eq!(UrlState::parse("?"), UrlState::default());
    }

    #[test]
    fn invalid_values_fall_back_silently() {
        let state = UrlState::parse("schema=Nope&depth=-3&density=dense&labels=maybe");
        assert_eq!(state, UrlState::default());
    }

    #[test]
    fn node_wins_over_link() {
        let state = UrlState::parse("node=Package&link=Document-Package-packages");
        assert_eq!(state.node.as_deref(), Some("Package"));
        assert_eq!(state.link, None);
    }

    #[test]
    fn query_round_trips() {
        let original = UrlState {
            schema: "Configuration".into(),
            settings: ViewSettings {
                depth: 3,
                density: Density::Airy,
                labels: false,
            },
            node: None,
            link: Some("Document-Package-packages & more".into()),
        };
        assert_eq!(UrlState::parse(&original.to_query()), original);
    }

    #[test]
    fn app_state_round_trips_through_the_url() {
        let document = json!({
            "properties": { "packages": { "type": "array", "items": { "$ref": "#/definitions/Package" } } },
            "definitions": {
                "Package": { "properties": { "vendor": { "x-association-target": ["#/definitions/Vendor"] } } },
                "Vendor": {}
            }
        });
        let mut state = AppState::from_document(&document, "Document", ViewSettings::default()).unwrap();
        state.restore_link("Package-Vendor-vendor");
        state.settings.labels = false;
        let query = state.url_state().to_query();

        let mut reloaded = AppState::from_document(&document, "Document", ViewSettings::default()).unwrap();
        reloaded.apply_url_state(&UrlState::parse(&query));
        assert_eq!(reloaded.url_state(), state.url_state());
        assert_eq!(reloaded.selected_link(), Some("Package-Vendor-vendor"));
    }

    #[test]
    fn reads_query_from_full_url() {
        let url = Url::parse("http://localhost:5151/?schema=Configuration&node=Foo").unwrap();
        let state = UrlState::from_url(&url);
        assert_eq!(state.schema, "Configuration");
        assert_eq!(state.node.as_deref(), Some("Foo"));
    }
}
