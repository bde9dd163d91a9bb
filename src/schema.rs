//! JSON Schema -> node model.
//!
//! The root document becomes one node keyed by the schema name and every entry
//! of `definitions` becomes a node keyed by its definition name. Properties that
//! point at other definitions, either through `$ref` (composition) or through the
//! `x-association-target` extension (association), become [`Relation`]s on the
//! owning node. References to definitions that do not exist are dropped.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::EXTERNAL_OWNERSHIP_PREFIX;

static DEFINITION_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#/definitions/([^/]+)(?:/(.+))?$").expect("definition ref pattern is valid")
});

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("schema '{0}' is not a JSON object")]
    NotAnObject(String),
}

/// Internal category derived from the `x-ums-type` hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum UmsType {
    Root,
    Subentity,
    ExternalOwnership,
    Ephemeral,
    Default,
    Other(String),
}

impl UmsType {
    pub fn as_str(&self) -> &str {
        match self {
            UmsType::Root => "root",
            UmsType::Subentity => "subentity",
            UmsType::ExternalOwnership => "external_ownership",
            UmsType::Ephemeral => "ephemeral",
            UmsType::Default => "default",
            UmsType::Other(raw) => raw,
        }
    }

    /// Maps the raw `x-ums-type` value of node `id` onto a category.
    pub fn classify(hint: Option<&str>, id: &str, is_root: bool) -> Self {
        match hint {
            Some("embedded") | Some("custom") => UmsType::Subentity,
            Some("ignore") if id.starts_with(EXTERNAL_OWNERSHIP_PREFIX) => {
                UmsType::ExternalOwnership
            }
            Some("ignore") => UmsType::Ephemeral,
            Some("root") => UmsType::Root,
            Some("subentity") => UmsType::Subentity,
            Some("external_ownership") => UmsType::ExternalOwnership,
            Some("ephemeral") => UmsType::Ephemeral,
            Some("default") => UmsType::Default,
            Some(other) => UmsType::Other(other.to_string()),
            None if is_root => UmsType::Root,
            None => UmsType::Default,
        }
    }
}

impl From<UmsType> for String {
    fn from(value: UmsType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Definition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Composition,
    Association,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Composition => "composition",
            RelationKind::Association => "association",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub target: String,
    pub property: String,
    pub is_array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub ums_type: UmsType,
    pub description: Option<String>,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
    pub recommended: Vec<String>,
    pub relations: Vec<Relation>,
    pub examples: Vec<Value>,
    pub x_properties: Map<String, Value>,
    pub raw_schema: Value,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Root
    }

    pub fn relations_for<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a Relation> {
        self.relations
            .iter()
            .filter(move |relation| relation.property == property)
    }
}

/// Parsed schema: every node keyed by id, plus document order.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    pub name: String,
    pub nodes: HashMap<String, Node>,
    pub order: Vec<String>,
}

impl SchemaModel {
    pub fn parse(document: &Value, schema_name: &str) -> Result<Self, ParseError> {
        let root = document
            .as_object()
            .ok_or_else(|| ParseError::NotAnObject(schema_name.to_string()))?;

        let empty = Map::new();
        let definitions = root
            .get("definitions")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let mut order = vec![schema_name.to_string()];
        for key in definitions.keys() {
            if key == schema_name {
                tracing::warn!(definition = %key, "definition shadows the root node; skipping it");
                continue;
            }
            order.push(key.clone());
        }
        let known: HashSet<&str> = order.iter().map(String::as_str).collect();

        let mut nodes = HashMap::with_capacity(order.len());
        nodes.insert(
            schema_name.to_string(),
            build_node(schema_name, root, NodeKind::Root, &known),
        );
        for (key, definition) in definitions {
            if key == schema_name {
                continue;
            }
            let object = definition.as_object().unwrap_or(&empty);
            nodes.insert(key.clone(), build_node(key, object, NodeKind::Definition, &known));
        }

        tracing::debug!(schema = schema_name, nodes = nodes.len(), "parsed schema");

        Ok(Self {
            name: schema_name.to_string(),
            nodes,
            order,
        })
    }

    /// A model holding nothing but an empty root node.
    pub fn root_only(schema_name: &str) -> Self {
        let known = HashSet::from([schema_name]);
        let root = build_node(schema_name, &Map::new(), NodeKind::Root, &known);
        Self {
            name: schema_name.to_string(),
            nodes: HashMap::from([(schema_name.to_string(), root)]),
            order: vec![schema_name.to_string()],
        }
    }

    pub fn root_id(&self) -> &str {
        &self.name
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Relations from any node that point at `target`, in document order.
    pub fn incoming<'a>(&'a self, target: &'a str) -> impl Iterator<Item = (&'a Node, &'a Relation)> {
        self.iter().flat_map(move |node| {
            node.relations
                .iter()
                .filter(move |relation| relation.target == target)
                .map(move |relation| (node, relation))
        })
    }

    pub fn find_relation(&self, source: &str, target: &str, property: &str) -> Option<&Relation> {
        self.get(source)?
            .relations
            .iter()
            .find(|relation| relation.target == target && relation.property == property)
    }
}

fn build_node(id: &str, object: &Map<String, Value>, kind: NodeKind, known: &HashSet<&str>) -> Node {
    let properties = object
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let name = object
        .get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.trim().is_empty())
        .unwrap_or(id)
        .to_string();

    let required = string_array(object.get("required"));

    let mut recommended = string_array(object.get("x-recommended"));
    for (key, property) in &properties {
        let flagged = property
            .get("x-recommended")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if flagged && !recommended.contains(key) {
            recommended.push(key.clone());
        }
    }

    let x_properties = object
        .iter()
        .filter(|(key, _)| key.starts_with("x-"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let examples = object
        .get("examples")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let hint = object.get("x-ums-type").and_then(Value::as_str);

    Node {
        id: id.to_string(),
        name,
        kind,
        ums_type: UmsType::classify(hint, id, kind == NodeKind::Root),
        description: object
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        relations: extract_relations(id, &properties, known),
        properties,
        required,
        recommended,
        examples,
        x_properties,
        raw_schema: Value::Object(object.clone()),
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn extract_relations(
    source: &str,
    properties: &Map<String, Value>,
    known: &HashSet<&str>,
) -> Vec<Relation> {
    let mut relations: Vec<Relation> = Vec::new();

    for (property, schema) in properties {
        let is_array = schema.get("type").and_then(Value::as_str) == Some("array");
        let items = schema.get("items");
        let description = schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut push = |kind: RelationKind, reference: &str, is_array: bool| {
            let Some((target, via)) = parse_definition_ref(reference) else {
                return;
            };
            if !known.contains(target.as_str()) {
                tracing::debug!(source, property = %property, target = %target, "dropping dangling reference");
                return;
            }
            let duplicate = relations.iter().any(|existing| {
                existing.kind == kind && existing.target == target && existing.property == *property
            });
            if duplicate {
                return;
            }
            relations.push(Relation {
                kind,
                target,
                property: property.clone(),
                is_array,
                via: if kind == RelationKind::Association { via } else { None },
                description: description.clone(),
            });
        };

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            push(RelationKind::Composition, reference, false);
        } else if let Some(reference) = items
            .filter(|_| is_array)
            .and_then(|items| items.get("$ref"))
            .and_then(Value::as_str)
        {
            push(RelationKind::Composition, reference, true);
        }

        let association_targets = schema
            .get("x-association-target")
            .or_else(|| items.and_then(|items| items.get("x-association-target")));
        for reference in association_refs(association_targets) {
            push(RelationKind::Association, reference, is_array);
        }
    }

    relations
}

fn association_refs(value: Option<&Value>) -> Vec<&str> {
    match value {
        Some(Value::String(single)) => vec![single.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Splits `#/definitions/Name[/properties]/field` into `("Name", Some("field"))`.
pub fn parse_definition_ref(reference: &str) -> Option<(String, Option<String>)> {
    let captures = DEFINITION_REF.captures(reference.trim())?;
    let target = captures.get(1)?.as_str().to_string();
    let via = captures
        .get(2)
        .and_then(|rest| rest.as_str().rsplit('/').find(|segment| !segment.is_empty()))
        .filter(|segment| *segment != "properties")
        .map(str::to_string);
    Some((target, via))
}
