//! Displayed subset of the schema model.
//!
//! The parsed [`SchemaModel`] never changes while a schema is open; what the
//! user sees is a [`DisplayedGraph`] that grows through expansion and the
//! auto-link helpers below. Every mutating helper reports whether anything was
//! added so callers can decide whether the layout has to run again.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::schema::{Relation, RelationKind, SchemaModel};

/// Structural identity of an edge. Two relations with equal keys are drawn once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub source: String,
    pub target: String,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayedLink {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
    pub property: String,
    pub is_array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

/// Display and URL identifier of an edge.
pub fn link_id(source: &str, target: &str, property: &str) -> String {
    format!("{source}-{target}-{property}")
}

impl DisplayedLink {
    pub fn from_relation(source: &str, relation: &Relation) -> Self {
        Self {
            id: link_id(source, &relation.target, &relation.property),
            source: source.to_string(),
            target: relation.target.clone(),
            kind: relation.kind,
            property: relation.property.clone(),
            is_array: relation.is_array,
            via: relation.via.clone(),
        }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey {
            source: self.source.clone(),
            target: self.target.clone(),
            property: self.property.clone(),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisplayedGraph {
    nodes: Vec<String>,
    node_set: HashSet<String>,
    links: Vec<DisplayedLink>,
    link_keys: HashSet<LinkKey>,
}

impl DisplayedGraph {
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn links(&self) -> &[DisplayedLink] {
        &self.links
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_set.contains(id)
    }

    pub fn contains_link(&self, key: &LinkKey) -> bool {
        self.link_keys.contains(key)
    }

    pub fn link(&self, id: &str) -> Option<&DisplayedLink> {
        self.links.iter().find(|link| link.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.node_set.clear();
        self.links.clear();
        self.link_keys.clear();
    }

    /// Returns `true` when the node was not displayed before.
    pub fn insert_node(&mut self, id: &str) -> bool {
        if !self.node_set.insert(id.to_string()) {
            return false;
        }
        self.nodes.push(id.to_string());
        true
    }

    /// Returns `true` when the edge was not displayed before.
    pub fn insert_link(&mut self, source: &str, relation: &Relation) -> bool {
        let link = DisplayedLink::from_relation(source, relation);
        if !self.link_keys.insert(link.key()) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Displayed nodes connected to `id` by a displayed edge, `id` included.
    pub fn neighborhood(&self, id: &str) -> HashSet<&str> {
        let mut neighbors = HashSet::new();
        if let Some(own) = self.nodes.iter().find(|node| node.as_str() == id) {
            neighbors.insert(own.as_str());
        }
        for link in self.links.iter().filter(|link| link.touches(id)) {
            neighbors.insert(link.source.as_str());
            neighbors.insert(link.target.as_str());
        }
        neighbors
    }

    /// Displays `id` and walks its relations breadth first up to `depth` hops.
    ///
    /// A node is queued only when it becomes displayed, so every node is walked
    /// at most once and self references stop after registering their edge.
    pub fn expand_node(&mut self, model: &SchemaModel, id: &str, depth: u32) -> bool {
        if !model.contains(id) {
            return false;
        }

        let mut changed = self.insert_node(id);
        let mut worklist = VecDeque::from([(id.to_string(), depth)]);

        while let Some((current, remaining)) = worklist.pop_front() {
            if remaining == 0 {
                continue;
            }
            let Some(node) = model.get(&current) else {
                continue;
            };
            for relation in &node.relations {
                changed |= self.insert_link(&current, relation);
                if self.insert_node(&relation.target) {
                    changed = true;
                    worklist.push_back((relation.target.clone(), remaining - 1));
                }
            }
        }

        tracing::debug!(id, depth, nodes = self.nodes.len(), links = self.links.len(), "expanded node");
        changed
    }

    /// Adds edges from displayed nodes into `id`.
    pub fn auto_add_reverse_links(&mut self, model: &SchemaModel, id: &str) -> bool {
        let mut changed = false;
        for (source, relation) in model.incoming(id) {
            if self.contains_node(&source.id) {
                changed |= self.insert_link(&source.id, relation);
            }
        }
        changed
    }

    /// Adds edges from `id` to displayed targets.
    pub fn auto_add_forward_links(&mut self, model: &SchemaModel, id: &str) -> bool {
        let Some(node) = model.get(id) else {
            return false;
        };
        let mut changed = false;
        for relation in &node.relations {
            if self.contains_node(&relation.target) {
                changed |= self.insert_link(id, relation);
            }
        }
        changed
    }

    /// One hop in both directions from `id`, newly revealed nodes included.
    pub fn expand_all_neighbors(&mut self, model: &SchemaModel, id: &str) -> bool {
        let Some(node) = model.get(id) else {
            return false;
        };
        let mut changed = self.insert_node(id);

        for relation in &node.relations {
            changed |= self.insert_node(&relation.target);
            changed |= self.insert_link(id, relation);
        }
        for (source, relation) in model.incoming(id) {
            changed |= self.insert_node(&source.id);
            changed |= self.insert_link(&source.id, relation);
        }

        changed
    }

    /// Makes `id` visible with every edge to or from the nodes already shown.
    pub fn reveal_node(&mut self, model: &SchemaModel, id: &str) -> bool {
        if !model.contains(id) {
            return false;
        }
        let mut changed = self.insert_node(id);
        changed |= self.auto_add_reverse_links(model, id);
        changed |= self.auto_add_forward_links(model, id);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> SchemaModel {
        let document = json!({
            "properties": {
                "packages": { "type": "array", "items": { "$ref": "#/definitions/Package" } },
                "apiResources": { "type": "array", "items": { "$ref": "#/definitions/ApiResource" } }
            },
            "definitions": {
                "Package": {
                    "properties": {
                        "parent": { "type": "string", "x-association-target": ["#/definitions/Package/ordId"] },
                        "packageLinks": { "type": "array", "items": { "$ref": "#/definitions/PackageLink" } }
                    }
                },
                "PackageLink": { "properties": {} },
                "ApiResource": {
                    "properties": {
                        "partOfPackage": { "type": "string", "x-association-target": ["#/definitions/Package/ordId"] },
                        "deprecatedIn": { "type": "string", "x-association-target": "#/definitions/Package" }
                    }
                }
            }
        });
        SchemaModel::parse(&document, "Document").unwrap()
    }

    #[test]
    fn depth_zero_shows_only_the_root() {
        let model = model();
        let mut graph = DisplayedGraph::default();
        assert!(graph.expand_node(&model, "Document", 0));
        assert_eq!(graph.nodes(), ["Document"]);
        assert!(graph.links().is_empty());
    }

    #[test]
    fn depth_one_shows_direct_targets() {
        let model = model();
        let mut graph = DisplayedGraph::default();
        graph.expand_node(&model, "Document", 1);
        assert_eq!(graph.nodes(), ["Document", "Package", "ApiResource"]);
        let ids: Vec<_> = graph.links().iter().map(|link| link.id.as_str()).collect();
        assert_eq!(
            ids,
            ["Document-Package-packages", "Document-ApiResource-apiResources"]
        );
    }

    #[test]
    fn self_reference_terminates_with_one_loop() {
        let model = model();
        let mut graph = DisplayedGraph::default();
        graph.expand_node(&model, "Package", 5);
        let loops: Vec<_> = graph.links().iter().filter(|link| link.is_self_loop()).collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].source, "Package");
        assert_eq!(graph.nodes(), ["Package", "PackageLink"]);
    }

    #[test]
    fn adding_the_same_edge_twice_is_idempotent() {
        let model = model();
        let relation = model.find_relation("Document", "Package", "packages").unwrap().clone();
        let mut graph = DisplayedGraph::default();
        assert!(graph.insert_link("Document", &relation));
        assert!(!graph.insert_link("Document", &relation));
        assert_eq!(graph.links().len(), 1);
    }

    #[test]
    fn reverse_links_only_connect_displayed_sources() {
        let model = model();
        let mut graph = DisplayedGraph::default();
        graph.insert_node("Package");
        // only the self association is reachable so far
        assert!(graph.auto_add_reverse_links(&model, "Package"));
        assert_eq!(graph.links().len(), 1);
        graph.insert_node("ApiResource");
        assert!(graph.auto_add_reverse_links(&model, "Package"));
        let sources: HashSet<_> = graph.links().iter().map(|link| link.source.as_str()).collect();
        assert!(sources.contains("ApiResource"));
        assert!(!sources.contains("Document"));
        assert!(!graph.auto_add_reverse_links(&model, "Package"));
    }

    #[test]
    fn forward_links_skip_hidden_targets() {
        let model = model();
        let mut graph = DisplayedGraph::default();
        graph.insert_node("ApiResource");
        assert!(!graph.auto_add_forward_links(&model, "ApiResource"));
        graph.insert_node("Package");
        assert!(graph.auto_add_forward_links(&model, "ApiResource"));
        assert_eq!(graph.links().len(), 2);
    }

    #[test]
    fn expand_all_neighbors_reports_change_once() {
        let model = model();
        let mut graph = DisplayedGraph::default();
        graph.insert_node("Package");
        assert!(graph.expand_all_neighbors(&model, "Package"));
        for id in ["Document", "ApiResource", "PackageLink"] {
            assert!(graph.contains_node(id), "{id} should be displayed");
        }
        assert!(!graph.expand_all_neighbors(&model, "Package"));
    }

    #[test]
    fn unknown_nodes_are_ignored() {
        let model = model();
        let mut graph = DisplayedGraph::default();
        assert!(!graph.expand_node(&model, "Nope", 3));
        assert!(!graph.reveal_node(&model, "Nope"));
        assert!(graph.is_empty());
    }
}
