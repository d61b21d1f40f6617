//! Resource graph construction and traversal
//!
//! Nodes are appended in build order and may only reference nodes that are
//! already present, so the graph is acyclic by construction. Forward and
//! reverse edges are kept for impact analysis.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use sha2::{Digest, Sha256};

use nexus_infra_core::{BuildError, NodeHandle, NodeId, ResourceKind, ResourceNode, TableIndex};

/// Property holding a table's primary key attribute
pub const PARTITION_KEY_PROPERTY: &str = "partition_key";

/// An ordered, acyclic set of resource nodes forming one deployable stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceGraph {
    /// Stack name
    pub name: String,

    pub description: String,

    pub region: String,

    /// Nodes in construction order
    nodes: Vec<ResourceNode>,

    /// Node id -> position in `nodes`
    #[serde(skip)]
    index: HashMap<NodeId, usize>,

    /// Reverse edges: node -> nodes that depend on it
    #[serde(skip)]
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl ResourceGraph {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            region: region.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            children: HashMap::new(),
        }
    }

    /// Append a node. Every reference must point at a node already in the graph.
    pub fn add(&mut self, node: ResourceNode) -> Result<NodeHandle, BuildError> {
        if self.index.contains_key(&node.id) {
            return Err(BuildError::DuplicateNode(node.id));
        }

        if let Some(missing) = node.references.iter().find(|r| !self.index.contains_key(*r)) {
            return Err(BuildError::DependencyOrder {
                node: node.id.clone(),
                missing: missing.clone(),
            });
        }

        for parent in &node.references {
            self.children
                .entry(parent.clone())
                .or_default()
                .push(node.id.clone());
        }

        tracing::debug!(node = %node.id, kind = %node.kind, refs = node.references.len(), "added node");

        let handle = NodeHandle::issued(node.id.clone(), node.kind);
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);

        Ok(handle)
    }

    /// Attach a secondary index to a table that is already in the graph
    pub fn add_table_index(&mut self, table: &NodeHandle, index: TableIndex) -> Result<(), BuildError> {
        let position = match self.index.get(table.id()) {
            Some(&position) if table.kind() == ResourceKind::Table => position,
            _ => {
                return Err(BuildError::DependencyOrder {
                    node: index.index_name,
                    missing: table.id().to_string(),
                })
            }
        };

        let node = &mut self.nodes[position];
        let primary_key = node
            .property(PARTITION_KEY_PROPERTY)
            .and_then(|key| key.get("name"))
            .and_then(|name| name.as_str());

        let clashes = primary_key == Some(index.partition_key_name.as_str())
            || node.indexes.iter().any(|existing| {
                existing.index_name == index.index_name
                    || existing.partition_key_name == index.partition_key_name
            });

        if clashes {
            return Err(BuildError::DuplicateIndex {
                table: node.id.clone(),
                index: index.index_name,
            });
        }

        tracing::debug!(table = %node.id, index = %index.index_name, "added table index");
        node.indexes.push(index);
        Ok(())
    }

    /// Get all nodes in construction order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub fn get(&self, node_id: &str) -> Option<&ResourceNode> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// Nodes of one kind, in construction order
    pub fn nodes_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// First node of a kind
    pub fn first_of_kind(&self, kind: ResourceKind) -> Option<&ResourceNode> {
        self.nodes_of_kind(kind).next()
    }

    /// First node of a kind, or `MissingNode`
    pub fn require(&self, kind: ResourceKind) -> Result<&ResourceNode, BuildError> {
        self.first_of_kind(kind).ok_or(BuildError::MissingNode(kind))
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> Vec<&NodeId> {
        self.get(node_id)
            .map(|node| node.references.iter().collect())
            .unwrap_or_default()
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> Vec<&NodeId> {
        self.children
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get all downstream nodes (transitive closure of children)
    ///
    /// Everything that has to be revisited if this node changes.
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        self.walk(node_id, |id| self.children(id))
    }

    /// Get all upstream nodes (transitive closure of parents)
    pub fn upstream(&self, node_id: &str) -> Vec<NodeId> {
        self.walk(node_id, |id| self.parents(id))
    }

    fn walk<'a, F>(&'a self, node_id: &str, next: F) -> Vec<NodeId>
    where
        F: Fn(&str) -> Vec<&'a NodeId>,
    {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = next(node_id).into_iter().cloned().collect();
        let mut result = Vec::new();

        // BFS
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            for neighbour in next(current.as_str()) {
                if !visited.contains(neighbour) {
                    queue.push_back(neighbour.clone());
                }
            }

            result.push(current);
        }

        result
    }

    /// Check if there's a path from source to target
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.downstream(source).iter().any(|n| n == target)
    }

    /// Topological order of all nodes, `None` if a cycle is present
    pub fn topological_sort(&self) -> Option<Vec<NodeId>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.references.len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .filter(|n| n.references.is_empty())
            .map(|n| n.id.as_str())
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        // Kahn's algorithm
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());

            if let Some(children) = self.children.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child.as_str());
                        }
                    }
                }
            }
        }

        if result.len() == self.nodes.len() {
            Some(result)
        } else {
            None
        }
    }

    /// Re-check that every reference points at an earlier node
    pub fn validate(&self) -> Result<(), BuildError> {
        for (position, node) in self.nodes.iter().enumerate() {
            for reference in &node.references {
                match self.index.get(reference) {
                    Some(&target) if target < position => {}
                    _ => {
                        return Err(BuildError::DependencyOrder {
                            node: node.id.clone(),
                            missing: reference.clone(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Copy of the graph with every sensitive property replaced
    pub fn redacted(&self) -> Self {
        let mut graph = self.clone();
        for node in &mut graph.nodes {
            node.redact();
        }
        graph
    }

    /// SHA-256 of the canonical JSON form
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ResourceGraph {
        let mut graph = ResourceGraph::new("Sample-dev", "sample", "us-west-2");
        let bucket = graph.add(ResourceNode::new(ResourceKind::Bucket, "-dev")).unwrap();
        let function = graph.add(ResourceNode::new(ResourceKind::ComputeFunction, "-dev")).unwrap();
        let ingress = graph
            .add(ResourceNode::new(ResourceKind::HttpIngress, "-dev").with_reference(&function))
            .unwrap();
        graph
            .add(
                ResourceNode::new(ResourceKind::Distribution, "-dev")
                    .with_reference(&bucket)
                    .with_reference(&ingress),
            )
            .unwrap();
        graph
    }

    #[test]
    fn rejects_forward_reference() {
        let mut graph = ResourceGraph::new("g", "", "us-west-2");
        let ghost = NodeHandle::issued("Bucket-dev".to_string(), ResourceKind::Bucket);
        let err = graph
            .add(ResourceNode::new(ResourceKind::Distribution, "-dev").with_reference(&ghost))
            .unwrap_err();

        assert_eq!(
            err,
            BuildError::DependencyOrder {
                node: "Distribution-dev".to_string(),
                missing: "Bucket-dev".to_string(),
            }
        );
        assert!(graph.is_empty());
    }

    #[test]
    fn rejects_duplicate_node() {
        let mut graph = ResourceGraph::new("g", "", "us-west-2");
        graph.add(ResourceNode::new(ResourceKind::Bucket, "")).unwrap();
        let err = graph.add(ResourceNode::new(ResourceKind::Bucket, "")).unwrap_err();
        assert_eq!(err, BuildError::DuplicateNode("Bucket".to_string()));
    }

    #[test]
    fn traversal() {
        let graph = sample();

        assert_eq!(graph.parents("HttpIngress-dev"), vec!["ComputeFunction-dev"]);
        assert_eq!(graph.children("Bucket-dev"), vec!["Distribution-dev"]);
        assert_eq!(
            graph.downstream("ComputeFunction-dev"),
            vec!["HttpIngress-dev".to_string(), "Distribution-dev".to_string()]
        );

        let upstream = graph.upstream("Distribution-dev");
        assert_eq!(upstream.len(), 3);
        assert!(graph.has_path("Bucket-dev", "Distribution-dev"));
        assert!(!graph.has_path("Distribution-dev", "Bucket-dev"));
    }

    #[test]
    fn topological_order_respects_references() {
        let graph = sample();
        let order = graph.topological_sort().unwrap();
        assert_eq!(order.len(), graph.len());

        let position = |id: &str| order.iter().position(|n| n == id).unwrap();
        for node in graph.nodes() {
            for parent in &node.references {
                assert!(position(parent) < position(&node.id));
            }
        }
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn table_index_rules() {
        let mut graph = ResourceGraph::new("g", "", "us-west-2");
        let table = graph
            .add(
                ResourceNode::new(ResourceKind::Table, "-dev")
                    .with_property(PARTITION_KEY_PROPERTY, json!({ "name": "email", "type": "STRING" })),
            )
            .unwrap();

        graph.add_table_index(&table, TableIndex::on("session_id")).unwrap();

        let err = graph.add_table_index(&table, TableIndex::on("session_id")).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateIndex { .. }));

        let err = graph.add_table_index(&table, TableIndex::on("email")).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateIndex { .. }));

        let ghost = NodeHandle::issued("Table-prod".to_string(), ResourceKind::Table);
        let err = graph.add_table_index(&ghost, TableIndex::on("user_uuid")).unwrap_err();
        assert!(matches!(err, BuildError::DependencyOrder { .. }));

        assert_eq!(graph.get("Table-dev").unwrap().indexes.len(), 1);
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(sample().fingerprint().unwrap(), sample().fingerprint().unwrap());
        assert_eq!(sample().fingerprint().unwrap().len(), 64);
    }
}
