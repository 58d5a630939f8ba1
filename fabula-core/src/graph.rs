//! Story graph data model.
//!
//! A story is a directed graph of narrative nodes. Every node either branches
//! into exactly two choices or is terminal. The shape of each node is checked
//! when a graph is loaded; whether each `next_id` resolves is checked when a
//! branch is actually taken (see [`StoryGraph::dangling_references`] for an
//! eager report).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while loading a story graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Node '{node_id}' has {count} choices; a node must have zero or two")]
    InvalidChoiceCount { node_id: String, count: usize },

    #[error("Node stored under key '{key}' declares id '{node_id}'")]
    KeyMismatch { key: String, node_id: String },

    #[error("Duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("Start node '{0}' is not in the graph")]
    MissingStart(String),

    #[error("Malformed graph: {0}")]
    Parse(String),
}

/// A labelled edge to another node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Label shown to the reader.
    pub text: String,
    /// Id of the node this choice leads to.
    pub next_id: String,
}

impl Choice {
    pub fn new(text: impl Into<String>, next_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next_id: next_id.into(),
        }
    }
}

/// A narrative node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct StoryNode {
    pub id: String,
    pub content: String,
    /// `None` for terminal nodes.
    pub choices: Option<[Choice; 2]>,
}

impl StoryNode {
    /// Create a branching node.
    pub fn branch(
        id: impl Into<String>,
        content: impl Into<String>,
        first: Choice,
        second: Choice,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            choices: Some([first, second]),
        }
    }

    /// Create a terminal node.
    pub fn ending(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            choices: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.choices.is_none()
    }

    /// The choice at `index` (0 or 1), if this node branches.
    pub fn choice(&self, index: usize) -> Option<&Choice> {
        self.choices.as_ref().and_then(|c| c.get(index))
    }
}

/// Wire shape of a node: choices as a list that may be absent or empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawNode {
    id: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    choices: Vec<Choice>,
}

impl TryFrom<RawNode> for StoryNode {
    type Error = GraphError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let count = raw.choices.len();
        let choices = match <[Choice; 2]>::try_from(raw.choices) {
            Ok(pair) => Some(pair),
            Err(rest) if rest.is_empty() => None,
            Err(_) => {
                return Err(GraphError::InvalidChoiceCount {
                    node_id: raw.id,
                    count,
                })
            }
        };

        Ok(Self {
            id: raw.id,
            content: raw.content,
            choices,
        })
    }
}

impl From<StoryNode> for RawNode {
    fn from(node: StoryNode) -> Self {
        Self {
            id: node.id,
            content: node.content,
            choices: node.choices.map(Vec::from).unwrap_or_default(),
        }
    }
}

impl TryFrom<fabula_api::GraphNode> for StoryNode {
    type Error = GraphError;

    fn try_from(node: fabula_api::GraphNode) -> Result<Self, Self::Error> {
        RawNode {
            id: node.id,
            content: node.content,
            choices: node
                .choices
                .into_iter()
                .map(|c| Choice::new(c.text, c.next_id))
                .collect(),
        }
        .try_into()
    }
}

/// A dangling reference found by [`StoryGraph::dangling_references`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub from_node: String,
    pub choice_index: usize,
    pub missing_id: String,
}

/// An immutable mapping from node id to node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, StoryNode>", into = "HashMap<String, StoryNode>")]
pub struct StoryGraph {
    nodes: HashMap<String, StoryNode>,
}

impl StoryGraph {
    /// Build a graph from a list of nodes, keyed by their ids.
    pub fn from_nodes(nodes: impl IntoIterator<Item = StoryNode>) -> Result<Self, GraphError> {
        let mut map = HashMap::new();
        for node in nodes {
            if map.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            map.insert(node.id.clone(), node);
        }
        Ok(Self { nodes: map })
    }

    /// Parse a graph from its JSON object form (`{ "<id>": { id, content, choices? } }`).
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(|e| GraphError::Parse(e.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&StoryNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StoryNode> {
        self.nodes.values()
    }

    /// Every choice whose target is not in the graph, sorted by source node.
    ///
    /// Playback itself only reports a missing node when the branch is taken;
    /// this is for authoring checks.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut dangling: Vec<_> = self
            .nodes
            .values()
            .flat_map(|node| {
                node.choices
                    .iter()
                    .flatten()
                    .enumerate()
                    .filter(|(_, c)| !self.contains(&c.next_id))
                    .map(|(index, c)| DanglingReference {
                        from_node: node.id.clone(),
                        choice_index: index,
                        missing_id: c.next_id.clone(),
                    })
            })
            .collect();
        dangling.sort_by(|a, b| {
            (&a.from_node, a.choice_index).cmp(&(&b.from_node, b.choice_index))
        });
        dangling
    }
}

impl TryFrom<HashMap<String, StoryNode>> for StoryGraph {
    type Error = GraphError;

    fn try_from(nodes: HashMap<String, StoryNode>) -> Result<Self, Self::Error> {
        if let Some((key, node)) = nodes.iter().find(|(key, node)| **key != node.id) {
            return Err(GraphError::KeyMismatch {
                key: key.clone(),
                node_id: node.id.clone(),
            });
        }
        Ok(Self { nodes })
    }
}

impl TryFrom<HashMap<String, fabula_api::GraphNode>> for StoryGraph {
    type Error = GraphError;

    fn try_from(nodes: HashMap<String, fabula_api::GraphNode>) -> Result<Self, Self::Error> {
        let nodes = nodes
            .into_iter()
            .map(|(key, node)| Ok((key, StoryNode::try_from(node)?)))
            .collect::<Result<HashMap<_, _>, GraphError>>()?;
        Self::try_from(nodes)
    }
}

impl From<StoryGraph> for HashMap<String, StoryNode> {
    fn from(graph: StoryGraph) -> Self {
        graph.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step() -> StoryGraph {
        StoryGraph::from_nodes([
            StoryNode::branch(
                "start",
                "Un cruce.",
                Choice::new("Izquierda", "left"),
                Choice::new("Derecha", "right"),
            ),
            StoryNode::ending("left", "Fin izquierdo."),
            StoryNode::ending("right", "Fin derecho."),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_nodes() {
        let graph = two_step();
        assert_eq!(graph.len(), 3);
        assert!(graph.get("left").unwrap().is_terminal());
        assert_eq!(graph.get("start").unwrap().choice(1).unwrap().next_id, "right");
        assert!(graph.get("start").unwrap().choice(2).is_none());
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let result = StoryGraph::from_nodes([
            StoryNode::ending("end", "A"),
            StoryNode::ending("end", "B"),
        ]);
        assert_eq!(result, Err(GraphError::DuplicateNode("end".to_string())));
    }

    #[test]
    fn test_json_with_missing_and_empty_choices() {
        let graph = StoryGraph::from_json(
            r#"{
                "start": {"id": "start", "content": "Hola", "choices": [
                    {"text": "A", "nextId": "a"}, {"text": "B", "nextId": "b"}
                ]},
                "a": {"id": "a", "content": "Fin A"},
                "b": {"id": "b", "content": "Fin B", "choices": []}
            }"#,
        )
        .unwrap();

        assert!(!graph.get("start").unwrap().is_terminal());
        assert!(graph.get("a").unwrap().is_terminal());
        assert!(graph.get("b").unwrap().is_terminal());
    }

    #[test]
    fn test_single_choice_rejected() {
        let result = StoryGraph::from_json(
            r#"{"start": {"id": "start", "content": "x", "choices": [{"text": "A", "nextId": "a"}]}}"#,
        );
        assert!(matches!(result, Err(GraphError::Parse(msg)) if msg.contains("1 choices")));
    }

    #[test]
    fn test_three_choices_rejected() {
        let raw = RawNode {
            id: "n".to_string(),
            content: String::new(),
            choices: vec![Choice::new("a", "a"), Choice::new("b", "b"), Choice::new("c", "c")],
        };
        assert_eq!(
            StoryNode::try_from(raw),
            Err(GraphError::InvalidChoiceCount {
                node_id: "n".to_string(),
                count: 3
            })
        );
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let result = StoryGraph::from_json(r#"{"start": {"id": "other", "content": "x"}}"#);
        assert!(matches!(result, Err(GraphError::Parse(msg)) if msg.contains("other")));
    }

    #[test]
    fn test_dangling_references_report() {
        let graph = StoryGraph::from_nodes([
            StoryNode::branch(
                "start",
                "x",
                Choice::new("ok", "end"),
                Choice::new("broken", "nowhere"),
            ),
            StoryNode::ending("end", "Fin."),
        ])
        .unwrap();

        let dangling = graph.dangling_references();
        assert_eq!(
            dangling,
            vec![DanglingReference {
                from_node: "start".to_string(),
                choice_index: 1,
                missing_id: "nowhere".to_string(),
            }]
        );
        assert!(two_step().dangling_references().is_empty());
    }

    #[test]
    fn test_serialization_keeps_shape() {
        let graph = two_step();
        let json = serde_json::to_string(&graph).unwrap();
        let restored = StoryGraph::from_json(&json).unwrap();
        assert_eq!(restored, graph);
    }
}
