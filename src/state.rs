use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DEFAULT_SCHEMA, Density};
use crate::graph::{DisplayedGraph, DisplayedLink};
use crate::layout::LayoutState;
use crate::loader::LoadError;
use crate::schema::{Relation, SchemaModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSettings {
    pub depth: u32,
    pub density: Density,
    pub labels: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            depth: 1,
            density: Density::Normal,
            labels: true,
        }
    }
}

/// At most one node or one link is selected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Selection {
    #[default]
    None,
    Node(String),
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub location: String,
    pub message: String,
}

/// Handed out by [`AppState::begin_load`]; only the newest ticket may apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub schema: String,
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub model: SchemaModel,
    pub settings: ViewSettings,
    pub displayed: DisplayedGraph,
    pub selection: Selection,
    pub hover: Option<String>,
    pub layout: LayoutState,
    pub load_error: Option<LoadFailure>,
    generation: u64,
}

impl AppState {
    /// Builds the state for a parsed schema and shows its initial expansion.
    pub fn new(model: SchemaModel, settings: ViewSettings) -> Self {
        let mut state = Self {
            model,
            settings,
            displayed: DisplayedGraph::default(),
            selection: Selection::None,
            hover: None,
            layout: LayoutState::default(),
            load_error: None,
            generation: 0,
        };
        state.initialize();
        state
    }

    /// An empty root-only state, used before the first schema arrives.
    pub fn placeholder(settings: ViewSettings) -> Self {
        Self::new(SchemaModel::root_only(DEFAULT_SCHEMA), settings)
    }

    pub fn from_document(document: &Value, schema: &str, settings: ViewSettings) -> anyhow::Result<Self> {
        let model = SchemaModel::parse(document, schema)?;
        Ok(Self::new(model, settings))
    }

    pub fn schema_name(&self) -> &str {
        &self.model.name
    }

    pub fn selected_node(&self) -> Option<&str> {
        match &self.selection {
            Selection::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn selected_link(&self) -> Option<&str> {
        match &self.selection {
            Selection::Link(id) => Some(id),
            _ => None,
        }
    }

    pub fn selected_displayed_link(&self) -> Option<&DisplayedLink> {
        self.selected_link().and_then(|id| self.displayed.link(id))
    }

    /// Resets the displayed graph to the root expanded to the configured depth.
    pub fn initialize(&mut self) {
        self.displayed.clear();
        let root = self.model.root_id().to_string();
        self.displayed.expand_node(&self.model, &root, self.settings.depth);
        self.relayout();
    }

    /// Re-initializes and clears the selection.
    pub fn reset(&mut self) {
        self.selection = Selection::None;
        self.hover = None;
        self.initialize();
    }

    pub fn relayout(&mut self) {
        self.layout.run(&self.displayed, self.settings.density);
    }

    /// Drops a selection or hover whose element is no longer displayed.
    pub(crate) fn prune_selection(&mut self) {
        let stale = match &self.selection {
            Selection::None => false,
            Selection::Node(id) => !self.displayed.contains_node(id),
            Selection::Link(id) => self.displayed.link(id).is_none(),
        };
        if stale {
            self.selection = Selection::None;
        }
        if self
            .hover
            .as_deref()
            .is_some_and(|id| !self.displayed.contains_node(id))
        {
            self.hover = None;
        }
    }

    pub fn select_node(&mut self, id: &str) -> bool {
        if !self.displayed.contains_node(id) {
            return false;
        }
        self.selection = Selection::Node(id.to_string());
        true
    }

    pub fn select_link(&mut self, id: &str) -> bool {
        if self.displayed.link(id).is_none() {
            return false;
        }
        self.selection = Selection::Link(id.to_string());
        true
    }

    pub fn clear_selection(&mut self) -> bool {
        let had_selection = self.selection != Selection::None;
        self.selection = Selection::None;
        had_selection
    }

    /// Shows `relation` from `source`, cascading back-references when the
    /// target is new, and selects the target.
    pub fn add_relation_to_graph(&mut self, source: &str, relation: &Relation) -> bool {
        if !self.model.contains(source) || !self.model.contains(&relation.target) {
            return false;
        }
        let mut changed = self.displayed.insert_node(source);
        let target_is_new = self.displayed.insert_node(&relation.target);
        changed |= target_is_new;
        changed |= self.displayed.insert_link(source, relation);
        if target_is_new {
            changed |= self.displayed.auto_add_reverse_links(&self.model, &relation.target);
        }
        if changed {
            self.relayout();
        }
        self.select_node(&relation.target);
        changed
    }

    /// Shows `relation` owned by `source` that points at the current node, and
    /// selects the source.
    pub fn add_reverse_relation_to_graph(&mut self, source: &str, relation: &Relation) -> bool {
        if !self.model.contains(source) || !self.model.contains(&relation.target) {
            return false;
        }
        let mut changed = self.displayed.insert_node(&relation.target);
        let source_is_new = self.displayed.insert_node(source);
        changed |= source_is_new;
        changed |= self.displayed.insert_link(source, relation);
        if source_is_new {
            changed |= self.displayed.auto_add_forward_links(&self.model, source);
            changed |= self.displayed.auto_add_reverse_links(&self.model, source);
        }
        if changed {
            self.relayout();
        }
        self.select_node(source);
        changed
    }

    /// Shows every relation edge of `source` named `property` and selects the
    /// first of them.
    pub fn show_relation(&mut self, source: &str, property: &str, target: Option<&str>) -> bool {
        let Some(node) = self.model.get(source) else {
            return false;
        };
        let relations: Vec<Relation> = node
            .relations_for(property)
            .filter(|relation| target.is_none_or(|target| relation.target == target))
            .cloned()
            .collect();
        let Some(first) = relations.first() else {
            return false;
        };
        let first_id = DisplayedLink::from_relation(source, first).id;

        let mut changed = self.displayed.reveal_node(&self.model, source);
        for relation in &relations {
            changed |= self.displayed.insert_node(&relation.target);
            changed |= self.displayed.insert_link(source, relation);
        }
        if changed {
            self.relayout();
        }
        self.select_link(&first_id);
        changed
    }

    /// Makes `id` visible with its links to displayed nodes and selects it.
    pub fn reveal_and_select(&mut self, id: &str) -> bool {
        let changed = self.displayed.reveal_node(&self.model, id);
        if changed {
            self.relayout();
        }
        self.select_node(id);
        changed
    }

    pub fn expand_all_neighbors(&mut self, id: &str) -> bool {
        let changed = self.displayed.expand_all_neighbors(&self.model, id);
        if changed {
            self.relayout();
        }
        changed
    }

    /// Resolves a link id from the URL against displayed links first, then
    /// against every relation of the model.
    pub fn restore_link(&mut self, id: &str) -> bool {
        if self.select_link(id) {
            return true;
        }
        let found = self.model.iter().find_map(|node| {
            node.relations
                .iter()
                .find(|relation| DisplayedLink::from_relation(&node.id, relation).id == id)
                .map(|relation| (node.id.clone(), relation.clone()))
        });
        let Some((source, relation)) = found else {
            tracing::debug!(link = id, "link from URL does not exist in schema");
            return false;
        };
        self.show_relation(&source, &relation.property, Some(&relation.target));
        self.selected_link() == Some(id)
    }

    pub fn begin_load(&mut self, schema: &str) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            schema: schema.to_string(),
            generation: self.generation,
        }
    }

    /// Applies a finished load. Responses for superseded tickets are dropped.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<Value, LoadError>) -> bool {
        if ticket.generation != self.generation {
            tracing::warn!(schema = %ticket.schema, "discarding stale schema response");
            return false;
        }

        let parsed = result.and_then(|document| {
            SchemaModel::parse(&document, &ticket.schema).map_err(|err| LoadError::Invalid {
                location: ticket.schema.clone(),
                message: err.to_string(),
            })
        });

        match parsed {
            Ok(model) => {
                tracing::info!(schema = %model.name, nodes = model.nodes.len(), "schema loaded");
                self.model = model;
                self.load_error = None;
                self.layout.clear();
                self.reset();
            }
            Err(err) => {
                tracing::warn!(error = %err, "schema load failed");
                self.load_error = Some(LoadFailure {
                    location: err.location().to_string(),
                    message: err.to_string(),
                });
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "properties": {
                "packages": { "type": "array", "items": { "$ref": "#/definitions/Package" } }
            },
            "definitions": {
                "Package": {
                    "properties": {
                        "packageLinks": { "type": "array", "items": { "$ref": "#/definitions/PackageLink" } },
                        "vendor": { "type": "string", "x-association-target": ["#/definitions/Vendor/ordId"] }
                    }
                },
                "PackageLink": {},
                "Vendor": {}
            }
        })
    }

    fn state() -> AppState {
        AppState::from_document(&document(), "Document", ViewSettings::default()).unwrap()
    }

    #[test]
    fn initial_expansion_uses_configured_depth() {
        let state = state();
        assert_eq!(state.displayed.nodes(), ["Document", "Package"]);
        assert_eq!(state.layout.len(), 2);
    }

    #[test]
    fn node_and_link_selection_are_exclusive() {
        let mut state = state();
        assert!(state.select_link("Document-Package-packages"));
        assert_eq!(state.selected_node(), None);
        assert!(state.select_node("Package"));
        assert_eq!(state.selected_link(), None);
        assert!(state.select_link("Document-Package-packages"));
        assert_eq!(state.selected_node(), None);
    }

    #[test]
    fn selecting_hidden_elements_is_a_no_op() {
        let mut state = state();
        state.select_node("Package");
        assert!(!state.select_node("Vendor"));
        assert!(!state.select_link("Package-Vendor-vendor"));
        assert_eq!(state.selected_node(), Some("Package"));
    }

    #[test]
    fn add_relation_selects_the_target() {
        let mut state = state();
        let relation = state.model.find_relation("Package", "Vendor", "vendor").unwrap().clone();
        assert!(state.add_relation_to_graph("Package", &relation));
        assert_eq!(state.selected_node(), Some("Vendor"));
        assert!(state.displayed.link("Package-Vendor-vendor").is_some());
        assert!(!state.add_relation_to_graph("Package", &relation));
    }

    #[test]
    fn add_reverse_relation_selects_the_source() {
        let mut state =
            AppState::from_document(&document(), "Document", ViewSettings { depth: 0, ..Default::default() })
                .unwrap();
        state.displayed.insert_node("Vendor");
        let relation = state.model.find_relation("Package", "Vendor", "vendor").unwrap().clone();
        assert!(state.add_reverse_relation_to_graph("Package", &relation));
        assert_eq!(state.selected_node(), Some("Package"));
        assert!(state.displayed.link("Document-Package-packages").is_some());
    }

    #[test]
    fn show_relation_selects_the_edge() {
        let mut state = state();
        assert!(state.show_relation("Package", "packageLinks", None));
        assert_eq!(state.selected_link(), Some("Package-PackageLink-packageLinks"));
    }

    #[test]
    fn restore_link_adds_missing_edges() {
        let mut state = state();
        assert!(state.restore_link("Package-Vendor-vendor"));
        assert!(state.displayed.contains_node("Vendor"));
        assert!(!state.restore_link("Package-Nope-vendor"));
    }

    #[test]
    fn reset_clears_selection_and_extra_nodes() {
        let mut state = state();
        state.reveal_and_select("Vendor");
        state.reset();
        assert_eq!(state.selection, Selection::None);
        assert!(!state.displayed.contains_node("Vendor"));
    }

    #[test]
    fn stale_loads_are_ignored() {
        let mut state = AppState::placeholder(ViewSettings::default());
        let first = state.begin_load("Document");
        let second = state.begin_load("Document");
        assert!(!state.finish_load(first, Ok(document())));
        assert_eq!(state.model.nodes.len(), 1);
        assert!(state.finish_load(second, Ok(document())));
        assert!(state.model.contains("Package"));
    }

    #[test]
    fn failed_load_records_location() {
        let mut state = state();
        let ticket = state.begin_load("Configuration");
        let error = LoadError::Http {
            location: "http://localhost/Configuration.schema.json".into(),
            status: 404,
        };
        assert!(state.finish_load(ticket, Err(error)));
        let failure = state.load_error.as_ref().unwrap();
        assert!(failure.location.ends_with("Configuration.schema.json"));
        assert!(failure.message.contains("404"));
        assert_eq!(state.schema_name(), "Document");
    }
}
