//! Ranked lookup over entity and property names.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::schema::SchemaModel;

pub const MIN_QUERY_LEN: usize = 2;
pub const MAX_RESULTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Entity,
    Relation,
    Property,
}

impl SearchKind {
    fn weight(self) -> u8 {
        match self {
            SearchKind::Entity => 0,
            SearchKind::Relation => 1,
            SearchKind::Property => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Entity => "entity",
            SearchKind::Relation => "relation",
            SearchKind::Property => "property",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub kind: SearchKind,
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// `Node` for entities, `Node.property` otherwise.
    pub name: String,
}

impl SearchResult {
    /// The part of the name the query is ranked against.
    fn match_segment(&self) -> &str {
        match self.kind {
            SearchKind::Entity => &self.name,
            SearchKind::Relation | SearchKind::Property => self
                .name
                .rsplit_once('.')
                .map(|(_, tail)| tail)
                .unwrap_or(&self.name),
        }
    }
}

/// Case-insensitive substring search; queries under two characters match
/// nothing.
pub fn search(model: &SchemaModel, query: &str) -> Vec<SearchResult> {
    let needle = query.trim().to_lowercase();
    if needle.chars().count() < MIN_QUERY_LEN {
        return Vec::new();
    }

    let mut results = Vec::new();
    for node in model.iter() {
        if node.id.to_lowercase().contains(&needle) || node.name.to_lowercase().contains(&needle) {
            results.push(SearchResult {
                kind: SearchKind::Entity,
                node: node.id.clone(),
                property: None,
                name: node.id.clone(),
            });
        }

        for property in node.properties.keys() {
            if !property.to_lowercase().contains(&needle) {
                continue;
            }
            let kind = if node.relations_for(property).next().is_some() {
                SearchKind::Relation
            } else {
                SearchKind::Property
            };
            results.push(SearchResult {
                kind,
                node: node.id.clone(),
                property: Some(property.clone()),
                name: format!("{}.{}", node.id, property),
            });
        }
    }

    results.sort_by(|a, b| compare(a, b, &needle));
    results.truncate(MAX_RESULTS);
    results
}

fn compare(a: &SearchResult, b: &SearchResult, needle: &str) -> Ordering {
    let prefix = |result: &SearchResult| !result.match_segment().to_lowercase().starts_with(needle);
    a.kind
        .weight()
        .cmp(&b.kind.weight())
        .then_with(|| prefix(a).cmp(&prefix(b)))
        .then_with(|| a.name.len().cmp(&b.name.len()))
        .then_with(|| a.name.cmp(&b.name))
}
