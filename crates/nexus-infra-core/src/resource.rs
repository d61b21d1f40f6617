//! Resource node data model

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node identifier, `<ResourceKindName><StageSuffix>`
pub type NodeId = String;

/// The fixed set of resource kinds this topology uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Static asset object storage
    Bucket,
    LogGroup,
    /// Server-side rendering function
    ComputeFunction,
    /// HTTP API in front of the function
    HttpIngress,
    Route,
    /// CDN distribution
    Distribution,
    /// Grant letting the distribution invoke a route
    InvokePermission,
    /// Key-value users table
    Table,
    Certificate,
    /// Web ACL
    FirewallPolicy,
    /// Notification topic
    Topic,
    /// Verified sender with its configuration set
    EmailIdentity,
    /// Send-email policy attached to the function
    AccessPolicy,
}

impl ResourceKind {
    /// Kind name used as the identifier base
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bucket => "Bucket",
            Self::LogGroup => "LogGroup",
            Self::ComputeFunction => "ComputeFunction",
            Self::HttpIngress => "HttpIngress",
            Self::Route => "Route",
            Self::Distribution => "Distribution",
            Self::InvokePermission => "InvokePermission",
            Self::Table => "Table",
            Self::Certificate => "Certificate",
            Self::FirewallPolicy => "FirewallPolicy",
            Self::Topic => "Topic",
            Self::EmailIdentity => "EmailIdentity",
            Self::AccessPolicy => "AccessPolicy",
        }
    }

    /// Identifier for a node of this kind at a given stage suffix
    pub fn node_id(&self, suffix: &str) -> NodeId {
        format!("{}{}", self.as_str(), suffix)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle to a node that is already part of a graph.
///
/// Only the graph hands these out, so holding one proves the target exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    id: NodeId,
    kind: ResourceKind,
}

impl NodeHandle {
    #[doc(hidden)]
    pub fn issued(id: NodeId, kind: ResourceKind) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

/// Attribute type for table keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

/// Global secondary index on a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIndex {
    pub index_name: String,
    pub partition_key_name: String,
    pub partition_key_type: AttributeType,
}

impl TableIndex {
    /// String-keyed index named `<attribute>-index`
    pub fn on(attribute: &str) -> Self {
        Self {
            index_name: format!("{}-index", attribute),
            partition_key_name: attribute.to_string(),
            partition_key_type: AttributeType::String,
        }
    }
}

/// A typed specification of one infrastructure component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceNode {
    pub id: NodeId,

    pub kind: ResourceKind,

    /// Kind-specific properties
    pub properties: BTreeMap<String, Value>,

    /// Nodes this one depends on, in the order they were attached
    pub references: Vec<NodeId>,

    /// Secondary indexes (tables only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<TableIndex>,

    /// Property paths (one entry per nesting level) holding secret values
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub sensitive: BTreeSet<Vec<String>>,
}

impl ResourceNode {
    /// Create a node whose identifier is derived from kind and suffix
    pub fn new(kind: ResourceKind, suffix: &str) -> Self {
        Self {
            id: kind.node_id(suffix),
            kind,
            properties: BTreeMap::new(),
            references: Vec::new(),
            indexes: Vec::new(),
            sensitive: BTreeSet::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Record a dependency on an existing node
    pub fn with_reference(mut self, target: &NodeHandle) -> Self {
        if !self.references.iter().any(|r| r == target.id()) {
            self.references.push(target.id().to_string());
        }
        self
    }

    /// Mark a nested property as secret. Segments are matched literally.
    pub fn with_sensitive<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive.insert(path.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_sensitive(&self, path: &[&str]) -> bool {
        self.sensitive
            .iter()
            .any(|p| p.len() == path.len() && p.iter().zip(path).all(|(a, b)| a == b))
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Provider-facing name, falling back to the node id
    pub fn physical_name(&self) -> &str {
        self.str_property("name").unwrap_or(&self.id)
    }

    /// Replace every sensitive value with a placeholder
    pub fn redact(&mut self) {
        for path in &self.sensitive {
            let Some((first, rest)) = path.split_first() else {
                continue;
            };
            let mut cursor = self.properties.get_mut(first);
            for segment in rest {
                cursor = cursor.and_then(|v| v.get_mut(segment.as_str()));
            }
            if let Some(value) = cursor {
                *value = Value::String("***".to_string());
            }
        }
    }
}
