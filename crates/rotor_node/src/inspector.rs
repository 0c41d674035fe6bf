//! Read-only snapshots of a node's internal state, for tooling and debug
//! shells. This is the only view into the layers; there is no mutable
//! access from outside the event flow.

use rotor_consensus::ConsensusSnapshot;
use serde::Serialize;

/// Point-in-time state of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    /// The consensus layers' view: epoch, round, candidate, buffers.
    pub consensus: ConsensusSnapshot,
    /// Number of gossip peers this node forwards to.
    pub peer_count: usize,
    /// Timers currently armed (paused ones included).
    pub pending_timers: usize,
}
