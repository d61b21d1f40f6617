//! Resource graph construction
//!
//! This crate handles:
//! - The ordered, acyclic resource graph and its traversal
//! - Building the firewall/certificate (edge) graph
//! - Building the application graph from the edge graph's outputs

pub mod app;
pub mod edge;
pub mod graph;
pub mod outputs;

pub use app::AppGraph;
pub use edge::EdgeGraph;
pub use graph::ResourceGraph;
pub use outputs::{required_inputs, CrossStackOutputs};
