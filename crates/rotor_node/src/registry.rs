//! Lookup of live nodes by id.
//!
//! Gossipers hold a registry clone plus a peer id instead of the peer node
//! itself, so nodes own their gossipers without reference cycles.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use rotor_consensus::events::{ConsensusEvent, ReceivedDataEvent, ReceivedVoteEvent};
use rotor_consensus::message::{Data, Vote};
use rotor_consensus::types::{DataId, NodeId, VoteId};
use rotor_events::EventSender;
use tracing::trace;

/// The receive boundary of one node: an event sender plus the dedup sets.
/// Cheap to clone; this is what peers and gossipers hold.
#[derive(Clone)]
pub struct NodeHandle {
    node_id: NodeId,
    sender: EventSender<ConsensusEvent>,
    received_data: Rc<RefCell<HashSet<DataId>>>,
    received_votes: Rc<RefCell<HashSet<VoteId>>>,
}

impl NodeHandle {
    pub(crate) fn new(node_id: NodeId, sender: EventSender<ConsensusEvent>) -> Self {
        Self {
            node_id,
            sender,
            received_data: Rc::new(RefCell::new(HashSet::new())),
            received_votes: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Deliver a data message. Duplicates (by id) are dropped here, so
    /// re-delivery by multiple gossipers is harmless.
    pub fn receive_data(&self, data: Data) {
        if !self.received_data.borrow_mut().insert(data.id) {
            trace!(node = %self.node_id, id = %data.id, "dropping duplicate data");
            return;
        }
        self.sender.raise(ConsensusEvent::ReceivedData(ReceivedDataEvent { data }));
    }

    /// Deliver a vote. Duplicates (by id) are dropped here.
    pub fn receive_vote(&self, vote: Vote) {
        if !self.received_votes.borrow_mut().insert(vote.id) {
            trace!(node = %self.node_id, id = %vote.id, "dropping duplicate vote");
            return;
        }
        self.sender.raise(ConsensusEvent::ReceivedVote(ReceivedVoteEvent { vote }));
    }
}

/// Shared directory of node handles, keyed by node id.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: Rc<RefCell<HashMap<NodeId, NodeHandle>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: NodeHandle) {
        self.nodes.borrow_mut().insert(handle.node_id(), handle);
    }

    pub fn unregister(&self, node_id: NodeId) {
        self.nodes.borrow_mut().remove(&node_id);
    }

    /// Look up a peer. A departed peer simply resolves to `None`.
    pub fn get(&self, node_id: NodeId) -> Option<NodeHandle> {
        self.nodes.borrow().get(&node_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }
}
