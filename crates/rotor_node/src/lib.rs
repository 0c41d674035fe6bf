//! A consensus node: one [`rotor_consensus::Consensus`] stack on one event
//! system, plus the glue the core deliberately leaves outside: gossip
//! forwarding between peers, boundary deduplication, pacing between rounds,
//! and read-only inspection.
//!
//! Nodes in one process stay fully isolated: each runs its own dispatch
//! loop, and cross-node delivery goes through [`registry::NodeRegistry`]
//! handles so that node ownership remains a clean tree.

pub mod gossiper;
pub mod inspector;
pub mod node;
pub mod registry;

pub use inspector::NodeSnapshot;
pub use node::Node;
pub use registry::{NodeHandle, NodeRegistry};
