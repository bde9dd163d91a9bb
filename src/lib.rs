//! Interactive explorer for JSON Schema documents.
//!
//! A schema is parsed into a [`SchemaModel`]; an [`AppState`] holds the subset
//! of it that is on screen together with selection, view settings and layout.
//! Hosts feed user actions in as [`Command`]s and repaint from
//! [`render_svg`] and [`Sidebar::render`].

pub mod command;
pub mod config;
pub mod graph;
pub mod layout;
pub mod loader;
pub mod render;
pub mod schema;
pub mod search;
#[cfg(feature = "server")]
pub mod serve;
pub mod sidebar;
pub mod state;
pub mod url_state;
pub mod utils;

pub use command::{Command, Outcome};
pub use config::{DEFAULT_SCHEMA, Density};
pub use graph::{DisplayedGraph, DisplayedLink};
pub use layout::{LayoutState, Point};
pub use loader::{LoadError, SchemaBase, SchemaLoader};
#[cfg(feature = "png")]
pub use render::render_png;
pub use render::{export_file_name, render_svg};
pub use schema::{Node, Relation, RelationKind, SchemaModel, UmsType};
pub use search::{SearchKind, SearchResult, search};
pub use sidebar::{Sidebar, markdown_to_html};
pub use state::{AppState, Selection, ViewSettings};
pub use url_state::UrlState;

pub const NODE_RADIUS: f32 = 22.0;
pub const SELF_LOOP_RADIUS: f32 = 24.0;
pub const NODE_LABEL_GAP: f32 = 14.0;
pub const NODE_LABEL_CHAR_WIDTH: f32 = 7.2;
pub const ARROW_GAP: f32 = 4.0;
pub const LAYOUT_MARGIN: f32 = 40.0;
pub const EDGE_LABEL_CHAR_WIDTH: f32 = 6.4;
pub const EDGE_LABEL_HORIZONTAL_PADDING: f32 = 12.0;
pub const EDGE_LABEL_MIN_WIDTH: f32 = 28.0;
pub const EDGE_LABEL_HEIGHT: f32 = 18.0;
