//! Per-peer forwarding of local broadcasts.

use std::cell::Cell;
use std::rc::Rc;

use futures::FutureExt;
use rotor_consensus::events::{ConsensusEvent, ConsensusEventKind};
use rotor_consensus::types::NodeId;
use rotor_events::EventSystem;
use tracing::trace;

use crate::registry::NodeRegistry;

/// Forwards this node's `BroadcastData`/`BroadcastVote` events to one peer,
/// found through the registry at delivery time. Duplicates are tolerated;
/// the peer's boundary dedups by id.
pub struct Gossiper {
    active: Rc<Cell<bool>>,
}

impl Gossiper {
    /// Subscribe to the local broadcast events and forward them to `peer_id`.
    pub fn new(
        system: &mut EventSystem<ConsensusEvent>,
        registry: NodeRegistry,
        peer_id: NodeId,
    ) -> Self {
        let active = Rc::new(Cell::new(true));
        for kind in [ConsensusEventKind::BroadcastData, ConsensusEventKind::BroadcastVote] {
            let registry = registry.clone();
            let active = Rc::clone(&active);
            system.register_handler(
                kind,
                Box::new(move |event| {
                    if active.get() {
                        match registry.get(peer_id) {
                            Some(peer) => match event {
                                ConsensusEvent::BroadcastData(event) => {
                                    peer.receive_data(event.data)
                                }
                                ConsensusEvent::BroadcastVote(event) => {
                                    peer.receive_vote(event.vote)
                                }
                                _ => {}
                            },
                            None => trace!(peer = %peer_id, "peer not in the registry; dropping"),
                        }
                    }
                    futures::future::ready(()).boxed_local()
                }),
            );
        }
        Self { active }
    }

    /// Stop forwarding. The registered handlers stay behind as no-ops until
    /// the event system closes.
    pub fn close(&self) {
        self.active.set(false);
    }
}
