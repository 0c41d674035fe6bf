//! One consensus node: the event system, the consensus stack, gossip peers,
//! and the pacing between rounds.

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
#[cfg(test)]
#[path = "scenario_test.rs"]
mod scenario_test;
#[cfg(test)]
#[path = "simulation_test.rs"]
mod simulation_test;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::FutureExt;
use rotor_consensus::config::TimeoutsConfig;
use rotor_consensus::events::{
    ConsensusEvent,
    ConsensusEventKind,
    InitializeEvent,
    StartRoundEvent,
};
use rotor_consensus::message::{Data, DefaultDataFactory, DefaultVoteFactory, Vote};
use rotor_consensus::types::{EpochNum, NodeId, Round};
use rotor_consensus::Consensus;
use rotor_events::{
    EventSystem,
    EventSystemError,
    RecordSinks,
    ReplaySources,
    StopHandle,
};
use tracing::info;

use crate::gossiper::Gossiper;
use crate::inspector::NodeSnapshot;
use crate::registry::{NodeHandle, NodeRegistry};

/// A node hosting one consensus instance.
///
/// Close order matters: gossipers first, then mediator timers, then the
/// event system; [`Node::close`] follows it.
pub struct Node {
    node_id: NodeId,
    event_system: EventSystem<ConsensusEvent>,
    consensus: Consensus,
    registry: NodeRegistry,
    boundary: NodeHandle,
    gossipers: HashMap<NodeId, Gossiper>,
}

impl Node {
    pub fn new(node_id: NodeId, registry: NodeRegistry) -> Self {
        Self::with_timeouts(node_id, registry, TimeoutsConfig::default())
    }

    pub fn with_timeouts(
        node_id: NodeId,
        registry: NodeRegistry,
        timeouts: TimeoutsConfig,
    ) -> Self {
        let mut event_system = EventSystem::new();
        let consensus = Consensus::new(
            &mut event_system,
            node_id,
            Rc::new(DefaultDataFactory::new(node_id)),
            Rc::new(DefaultVoteFactory::new(node_id)),
            timeouts.clone(),
        );

        // The voter set arrives with Initialize and seeds every later
        // StartRound.
        let voters: Rc<RefCell<Vec<NodeId>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let voters = Rc::clone(&voters);
            event_system.register_handler(
                ConsensusEventKind::Initialize,
                Box::new(move |event| {
                    if let ConsensusEvent::Initialize(event) = event {
                        *voters.borrow_mut() = event.voters;
                    }
                    futures::future::ready(()).boxed_local()
                }),
            );
        }
        // A finished round schedules the next one after a short breather.
        {
            let voters = Rc::clone(&voters);
            let delayed = event_system.delayed_mediator();
            let timestamp = event_system.timestamp_mediator();
            let round_start_delay = timeouts.round_start_delay;
            event_system.register_handler(
                ConsensusEventKind::DoneRound,
                Box::new(move |event| {
                    let ConsensusEvent::DoneRound(done) = event else {
                        return futures::future::ready(()).boxed_local();
                    };
                    info!(
                        node = %node_id,
                        round = done.round_num,
                        success = done.is_success,
                        at_us = timestamp.execute(),
                        "DONE_ROUND: scheduling the next round"
                    );
                    let next = StartRoundEvent {
                        epoch_num: done.epoch_num,
                        round_num: done.round_num + 1,
                        voters: voters.borrow().clone(),
                    };
                    delayed.execute(round_start_delay, ConsensusEvent::StartRound(next));
                    futures::future::ready(()).boxed_local()
                }),
            );
        }

        let boundary = NodeHandle::new(node_id, event_system.sender());
        registry.register(boundary.clone());

        Self { node_id, event_system, consensus, registry, boundary, gossipers: HashMap::new() }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The receive boundary peers deliver into.
    pub fn handle(&self) -> NodeHandle {
        self.boundary.clone()
    }

    /// Deliver a data message from the network.
    pub fn receive_data(&self, data: Data) {
        self.boundary.receive_data(data);
    }

    /// Deliver a vote from the network.
    pub fn receive_vote(&self, vote: Vote) {
        self.boundary.receive_vote(vote);
    }

    /// Kick off consensus from the given state.
    pub fn initialize(
        &self,
        epoch_num: EpochNum,
        round_num: Round,
        voters: Vec<NodeId>,
        candidate_data: Option<Data>,
    ) {
        self.event_system.raise_event(ConsensusEvent::Initialize(InitializeEvent {
            epoch_num,
            round_num,
            voters,
            candidate_data,
        }));
    }

    /// Start forwarding this node's broadcasts to a peer.
    pub fn register_peer(&mut self, peer_id: NodeId) {
        let gossiper = Gossiper::new(&mut self.event_system, self.registry.clone(), peer_id);
        self.gossipers.insert(peer_id, gossiper);
    }

    /// Stop forwarding to a peer.
    pub fn unregister_peer(&mut self, peer_id: NodeId) {
        if let Some(gossiper) = self.gossipers.remove(&peer_id) {
            gossiper.close();
        }
    }

    /// Record this node's run to the given sinks. Call before driving.
    pub fn start_record(&mut self, sinks: RecordSinks) {
        self.event_system.start_record(sinks);
    }

    /// Replay a recorded run from the given sources. Call before driving.
    pub fn start_replay(&mut self, sources: ReplaySources) {
        self.event_system.start_replay(sources);
    }

    /// Subscribe a collector to the given event kinds. This is the hook for
    /// loggers and test probes; production handlers never live here.
    pub fn observe_events(
        &mut self,
        kinds: &[ConsensusEventKind],
    ) -> Rc<RefCell<Vec<ConsensusEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        for &kind in kinds {
            let seen = Rc::clone(&seen);
            self.event_system.register_handler(
                kind,
                Box::new(move |event| {
                    seen.borrow_mut().push(event);
                    futures::future::ready(()).boxed_local()
                }),
            );
        }
        seen
    }

    /// Drive dispatch until stopped (see [`Node::stop_handle`]). A replaying
    /// node returns at the end of its log.
    pub async fn run(&mut self) -> Result<(), EventSystemError> {
        self.event_system.run().await
    }

    /// Dispatch everything currently due and return how many events ran.
    pub async fn pump(&mut self) -> Result<usize, EventSystemError> {
        self.event_system.run_until_idle().await
    }

    /// Handle for pausing the node; pending timers freeze with their
    /// remaining delays and re-arm when driving resumes.
    pub fn stop_handle(&self) -> StopHandle {
        self.event_system.stop_handle()
    }

    /// Read-only view of the node's state.
    pub fn inspect(&self) -> NodeSnapshot {
        NodeSnapshot {
            consensus: self.consensus.inspect(),
            peer_count: self.gossipers.len(),
            pending_timers: self.event_system.delayed_mediator().pending_len(),
        }
    }

    /// Tear the node down: gossipers, then timers, then the event system.
    pub fn close(&mut self) {
        for gossiper in self.gossipers.values() {
            gossiper.close();
        }
        self.gossipers.clear();
        self.registry.unregister(self.node_id);
        self.event_system.close();
    }
}
