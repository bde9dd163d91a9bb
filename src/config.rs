use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::UmsType;

/// Schema loaded when the requested name is missing or unknown.
pub const DEFAULT_SCHEMA: &str = "Document";

/// Definitions whose id starts with this prefix are owned outside the document
/// when tagged `x-ums-type: ignore`.
pub const EXTERNAL_OWNERSHIP_PREFIX: &str = "External";

pub const SCHEMA_DIR_ENV: &str = "SCHEMAVIEW_SCHEMA_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaSource {
    pub name: &'static str,
    pub file_name: &'static str,
    pub docs_url: &'static str,
}

pub const SCHEMAS: &[SchemaSource] = &[
    SchemaSource {
        name: "Document",
        file_name: "Document.schema.json",
        docs_url: "https://open-resource-discovery.github.io/specification/spec-v1/interfaces/Document",
    },
    SchemaSource {
        name: "Configuration",
        file_name: "Configuration.schema.json",
        docs_url: "https://open-resource-discovery.github.io/specification/spec-v1/interfaces/Configuration",
    },
];

/// Looks up a schema by name, falling back to [`DEFAULT_SCHEMA`].
pub fn schema_source(name: &str) -> &'static SchemaSource {
    SCHEMAS
        .iter()
        .find(|source| source.name == name)
        .unwrap_or(&SCHEMAS[0])
}

pub fn is_known_schema(name: &str) -> bool {
    SCHEMAS.iter().any(|source| source.name == name)
}

/// Named bundle of force-layout tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Compact,
    #[default]
    Normal,
    Sparse,
    Airy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityParams {
    pub repulsion: f32,
    pub link_distance: f32,
    pub collision_radius: f32,
}

impl Density {
    pub const ALL: [Density; 4] = [
        Density::Compact,
        Density::Normal,
        Density::Sparse,
        Density::Airy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Density::Compact => "compact",
            Density::Normal => "normal",
            Density::Sparse => "sparse",
            Density::Airy => "airy",
        }
    }

    pub fn params(self) -> DensityParams {
        match self {
            Density::Compact => DensityParams {
                repulsion: 12_000.0,
                link_distance: 90.0,
                collision_radius: 38.0,
            },
            Density::Normal => DensityParams {
                repulsion: 24_000.0,
                link_distance: 140.0,
                collision_radius: 48.0,
            },
            Density::Sparse => DensityParams {
                repulsion: 45_000.0,
                link_distance: 200.0,
                collision_radius: 58.0,
            },
            Density::Airy => DensityParams {
                repulsion: 80_000.0,
                link_distance: 280.0,
                collision_radius: 70.0,
            },
        }
    }
}

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Density {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Density::ALL
            .into_iter()
            .find(|density| density.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown density preset '{value}'"))
    }
}

/// Fill color and legend label for a node category.
pub fn node_style(ums: &UmsType) -> (&'static str, &'static str) {
    match ums {
        UmsType::Root => ("#0a6ed1", "Root"),
        UmsType::Subentity => ("#8e6bbf", "Sub-entity"),
        UmsType::ExternalOwnership => ("#d08014", "External ownership"),
        UmsType::Ephemeral => ("#9ca3af", "Ephemeral"),
        UmsType::Default => ("#188918", "Entity"),
        UmsType::Other(_) => ("#64748b", "Other"),
    }
}
