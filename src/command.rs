//! User actions as data.
//!
//! Hosts translate clicks, hovers and form changes into [`Command`]s and feed
//! them to [`AppState::dispatch`]; nothing else mutates the view.

use serde::{Deserialize, Serialize};

use crate::config::Density;
use crate::search::{SearchKind, SearchResult};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Click on a node: selects it, or expands its neighbours if it is
    /// already selected.
    ClickNode { id: String },
    ClickBackground,
    SelectNode { id: String },
    SelectLink { id: String },
    /// Show a node that may be hidden, with its edges to displayed nodes, and
    /// select it.
    RevealNode { id: String },
    Hover { id: Option<String> },
    /// Follow a forward relation from the sidebar; selects the target.
    AddRelation { source: String, target: String, property: String },
    /// Show a forward relation's edge and select the edge.
    ShowRelation { source: String, target: String, property: String },
    /// Follow a reverse relation from the sidebar; selects its source.
    AddReverseRelation { source: String, target: String, property: String },
    ExpandNeighbors { id: String },
    SelectSearchResult { result: SearchResult },
    Reset,
    SetDepth { depth: u32 },
    SetDensity { density: Density },
    SetLabels { labels: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub graph_changed: bool,
    pub selection_changed: bool,
}

impl AppState {
    pub fn dispatch(&mut self, command: Command) -> Outcome {
        let before = self.selection.clone();
        tracing::debug!(?command, "dispatching command");

        let graph_changed = match command {
            Command::ClickNode { id } => {
                if self.selected_node() == Some(id.as_str()) {
                    self.expand_all_neighbors(&id)
                } else {
                    self.select_node(&id);
                    false
                }
            }
            Command::ClickBackground => {
                self.clear_selection();
                false
            }
            Command::SelectNode { id } => {
                self.select_node(&id);
                false
            }
            Command::SelectLink { id } => {
                self.select_link(&id);
                false
            }
            Command::RevealNode { id } => self.reveal_and_select(&id),
            Command::Hover { id } => {
                self.hover = id.filter(|id| self.displayed.contains_node(id));
                false
            }
            Command::AddRelation {
                source,
                target,
                property,
            } => match self.model.find_relation(&source, &target, &property).cloned() {
                Some(relation) => self.add_relation_to_graph(&source, &relation),
                None => false,
            },
            Command::ShowRelation {
                source,
                target,
                property,
            } => self.show_relation(&source, &property, Some(&target)),
            Command::AddReverseRelation {
                source,
                target,
                property,
            } => match self.model.find_relation(&source, &target, &property).cloned() {
                Some(relation) => self.add_reverse_relation_to_graph(&source, &relation),
                None => false,
            },
            Command::ExpandNeighbors { id } => self.expand_all_neighbors(&id),
            Command::SelectSearchResult { result } => self.select_search_result(&result),
            Command::Reset => {
                self.reset();
                true
            }
            Command::SetDepth { depth } => {
                if self.settings.depth == depth {
                    false
                } else {
                    self.settings.depth = depth;
                    self.initialize();
                    self.prune_selection();
                    true
                }
            }
            Command::SetDensity { density } => {
                if self.settings.density == density {
                    false
                } else {
                    self.settings.density = density;
                    self.relayout();
                    true
                }
            }
            Command::SetLabels { labels } => {
                self.settings.labels = labels;
                false
            }
        };

        Outcome {
            graph_changed,
            selection_changed: self.selection != before,
        }
    }

    /// Entity results reveal the node with its links and select it, relation
    /// results reveal the edge and select it. Property results only make sure
    /// the owner is displayed before selecting it.
    pub fn select_search_result(&mut self, result: &SearchResult) -> bool {
        match (result.kind, result.property.as_deref()) {
            (SearchKind::Relation, Some(property)) => self.show_relation(&result.node, property, None),
            (SearchKind::Property, _) => {
                if !self.model.contains(&result.node) {
                    return false;
                }
                let changed = self.displayed.insert_node(&result.node);
                if changed {
                    self.relayout();
                }
                self.select_node(&result.node);
                changed
            }
            _ => self.reveal_and_select(&result.node),
        }
    }
}
