//! Nexus infrastructure core
//!
//! Stage resolution, topology versions, configuration and the resource data
//! model shared by the graph builders and the policy engines.
//! Never rename error codes - they are part of the public API.

pub mod config;
pub mod context;
pub mod error;
pub mod resource;
pub mod stage;
pub mod topology;

pub use config::{BudgetConfig, Config, ConfigError, CrossStackOverrides, NotificationConfig};
pub use context::{BuildContext, BuildInputs, SecretValue};
pub use error::{BuildError, CrossStackInput, ErrorCode};
pub use resource::{AttributeType, NodeHandle, NodeId, ResourceKind, ResourceNode, TableIndex};
pub use stage::{RemovalPolicy, Stage, StageContext};
pub use topology::{Topology, TopologyFeatures};
