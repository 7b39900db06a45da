use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::coerce::{as_object, kind_of, scalar_string, string_field};
use crate::error::SchemaError;
use crate::schema::ComponentSpec;

/// Horizontal gap between nodes of the linear fallback layout
const LINEAR_SPACING: f64 = 200.0;
const LINEAR_ROW: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: Position,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Assembled workflow graph handed back to the flow builder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    /// Parse a generated graph, either bare (`{"nodes", "edges"}`) or wrapped
    /// in `{"flow_json": {...}}`.
    ///
    /// Nodes without an id and duplicate ids are dropped; edges whose source
    /// or target does not name a surviving node are dropped.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let mut obj = as_object(value, "FlowGraph")?;
        if let Some(inner) = obj.get("flow_json") {
            obj = as_object(inner, "FlowGraph")?;
        }

        let raw_nodes = match obj.get("nodes") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(SchemaError::WrongType {
                    record: "FlowGraph",
                    field: "nodes",
                    expected: "an array",
                    found: kind_of(other),
                })
            }
            None => {
                return Err(SchemaError::MissingField {
                    record: "FlowGraph",
                    field: "nodes",
                })
            }
        };

        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(raw_nodes.len());
        for raw in raw_nodes {
            let Some(node) = parse_node(raw) else {
                warn!("Dropping node without an id: {}", raw);
                continue;
            };
            if !seen.insert(node.id.clone()) {
                warn!("Dropping duplicate node id '{}'", node.id);
                continue;
            }
            nodes.push(node);
        }

        let raw_edges = match obj.get("edges") {
            Some(Value::Array(items)) => items.as_slice(),
            None | Some(Value::Null) => &[],
            Some(other) => {
                return Err(SchemaError::WrongType {
                    record: "FlowGraph",
                    field: "edges",
                    expected: "an array",
                    found: kind_of(other),
                })
            }
        };

        // Explicit ids are reserved first so generated ones never collide
        let mut edge_ids: HashSet<String> = HashSet::new();
        let mut pending = Vec::with_capacity(raw_edges.len());
        for raw in raw_edges {
            let Some(edge_obj) = raw.as_object() else {
                continue;
            };
            let source = string_field(edge_obj, "source");
            let target = string_field(edge_obj, "target");
            if !seen.contains(&source) || !seen.contains(&target) {
                warn!(
                    "Dropping edge '{}' referencing unknown node ({} -> {})",
                    string_field(edge_obj, "id"),
                    source,
                    target
                );
                continue;
            }

            let id = string_field(edge_obj, "id");
            if !id.is_empty() && !edge_ids.insert(id.clone()) {
                warn!("Dropping duplicate edge id '{}'", id);
                continue;
            }
            pending.push((id, source, target));
        }

        let mut next = 1;
        let mut edges = Vec::with_capacity(pending.len());
        for (mut id, source, target) in pending {
            if id.is_empty() {
                loop {
                    id = format!("e{}", next);
                    next += 1;
                    if edge_ids.insert(id.clone()) {
                        break;
                    }
                }
            }
            edges.push(FlowEdge { id, source, target });
        }

        Ok(Self { nodes, edges })
    }

    /// Deterministic chain: one node per component in plan order, each
    /// connected to the next.
    pub fn linear(components: &[ComponentSpec]) -> Self {
        let mut used = HashSet::new();
        let nodes: Vec<FlowNode> = components
            .iter()
            .enumerate()
            .map(|(i, comp)| {
                let mut id = slugify(&comp.step);
                if id.is_empty() {
                    id = format!("node_{}", i + 1);
                }
                let base = id.clone();
                let mut suffix = 2;
                while !used.insert(id.clone()) {
                    id = format!("{}_{}", base, suffix);
                    suffix += 1;
                }

                FlowNode {
                    id,
                    node_type: comp.component_name.clone(),
                    position: Position {
                        x: i as f64 * LINEAR_SPACING,
                        y: LINEAR_ROW,
                    },
                    data: Value::Object(comp.parameters.clone()),
                }
            })
            .collect();

        let edges = nodes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| FlowEdge {
                id: format!("e{}", i + 1),
                source: pair[0].id.clone(),
                target: pair[1].id.clone(),
            })
            .collect();

        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when every edge endpoint names an existing node
    pub fn is_referentially_sound(&self) -> bool {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges
            .iter()
            .all(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
    }

    /// Node types that are not in `known`
    pub fn unknown_node_types<'a>(&'a self, known: &HashSet<&str>) -> Vec<&'a str> {
        self.nodes
            .iter()
            .map(|n| n.node_type.as_str())
            .filter(|t| !known.contains(t))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

fn parse_node(raw: &Value) -> Option<FlowNode> {
    let obj = raw.as_object()?;
    let id = obj.get("id").and_then(scalar_string)?;
    if id.trim().is_empty() {
        return None;
    }

    let position = obj
        .get("position")
        .and_then(Value::as_object)
        .map(|p| Position {
            x: p.get("x").and_then(Value::as_f64).unwrap_or(0.0),
            y: p.get("y").and_then(Value::as_f64).unwrap_or(0.0),
        })
        .unwrap_or_default();

    let node_type = string_field(obj, "type");
    if node_type.is_empty() {
        debug!("Node '{}' has no type", id);
    }

    Some(FlowNode {
        id,
        node_type,
        position,
        data: obj
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
    })
}

/// Lowercase, with every run of non-alphanumeric characters collapsed to `_`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Load the Git repo"), "load_the_git_repo");
        assert_eq!(slugify("  Embed -- chunks! "), "embed_chunks");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn test_linear_chain() {
        let components = vec![
            ComponentSpec::new("Load repo", "GitLoader"),
            ComponentSpec::new("Embed chunks", "OpenAIEmbeddings")
                .with_parameter("model", json!("text-embedding-3-small")),
            ComponentSpec::new("Answer questions", "RetrievalQA"),
        ];

        let graph = FlowGraph::linear(&components);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.nodes[0].id, "load_repo");
        assert_eq!(graph.nodes[1].node_type, "OpenAIEmbeddings");
        assert_eq!(graph.nodes[1].data["model"], "text-embedding-3-small");
        assert_eq!(graph.nodes[2].position, Position { x: 400.0, y: 100.0 });
        assert_eq!(graph.edges[1].source, "embed_chunks");
        assert_eq!(graph.edges[1].target, "answer_questions");
        assert!(graph.is_referentially_sound());
    }

    #[test]
    fn test_linear_chain_keeps_ids_unique() {
        let components = vec![
            ComponentSpec::new("Split", "TextSplitter"),
            ComponentSpec::new("Split", "TextSplitter"),
            ComponentSpec::new("", "ChatOutput"),
        ];

        let graph = FlowGraph::linear(&components);
        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["split", "split_2", "node_3"]);
        assert!(graph.is_referentially_sound());
    }

    #[test]
    fn test_linear_chain_of_nothing() {
        let graph = FlowGraph::linear(&[]);
        assert!(graph.is_empty());
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_parse_drops_dangling_edges() {
        let graph = FlowGraph::from_value(&json!({
            "flow_json": {
                "nodes": [
                    {"id": "a", "type": "GitLoader", "position": {"x": 0, "y": 0}, "data": {}},
                    {"id": "b", "type": "RetrievalQA"},
                    {"id": "b", "type": "Duplicate"},
                    {"type": "NoId"}
                ],
                "edges": [
                    {"id": "e1", "source": "a", "target": "b"},
                    {"id": "e2", "source": "b", "target": "ghost"},
                    {"source": "b", "target": "a"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[1].node_type, "RetrievalQA");
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[1].id, "e2");
        assert!(graph.is_referentially_sound());
    }

    #[test]
    fn test_parse_keeps_edge_ids_unique() {
        let graph = FlowGraph::from_value(&json!({
            "nodes": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
            "edges": [
                {"source": "a", "target": "b"},
                {"id": "e1", "source": "b", "target": "c"},
                {"id": "e1", "source": "a", "target": "c"},
                {"source": "c", "target": "a"}
            ]
        }))
        .unwrap();

        let ids: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1", "e3"]);
        assert_eq!(graph.edges[1].source, "b");
    }

    #[test]
    fn test_parse_requires_nodes() {
        assert!(FlowGraph::from_value(&json!({"edges": []})).is_err());
        assert!(FlowGraph::from_value(&json!({"nodes": "a,b"})).is_err());

        let graph = FlowGraph::from_value(&json!({"nodes": []})).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_unknown_node_types() {
        let graph = FlowGraph::linear(&[
            ComponentSpec::new("Load", "GitLoader"),
            ComponentSpec::new("Think", "Imaginary"),
        ]);
        let known: HashSet<&str> = ["GitLoader"].into_iter().collect();
        assert_eq!(graph.unknown_node_types(&known), vec!["Imaginary"]);
    }
}
