//! Wires the admission layer and the decision core onto one event system.

#[cfg(test)]
#[path = "consensus_test.rs"]
mod consensus_test;

use std::cell::RefCell;
use std::rc::Rc;

use futures::FutureExt;
use rotor_events::{EventSystem, RecordableEvent};
use serde::Serialize;

use crate::async_layer::AsyncLayer;
use crate::config::TimeoutsConfig;
use crate::events::{
    ConsensusEvent,
    ConsensusEventKind,
    DoneRoundEvent,
    ReceivedConsensusDataEvent,
    ReceivedConsensusVoteEvent,
};
use crate::message::data::DataFactory;
use crate::message::pool::MessagePools;
use crate::message::vote::VoteFactory;
use crate::round_layer::RoundLayer;
use crate::types::{DataId, EpochNum, NodeId, Round};

/// Read-only view of the layer state, for inspection tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusSnapshot {
    pub node_id: NodeId,
    pub epoch_num: Option<EpochNum>,
    pub round_num: Round,
    pub candidate_num: u64,
    pub candidate_id: Option<DataId>,
    pub buffered_data: usize,
    pub buffered_votes: usize,
    pub is_voted: bool,
    pub is_ended: bool,
}

/// One node's consensus stack. Construction registers every handler; the
/// layers then live behind the event system and this handle only serves
/// inspection.
pub struct Consensus {
    node_id: NodeId,
    async_layer: Rc<RefCell<AsyncLayer>>,
    round_layer: Rc<RefCell<RoundLayer>>,
}

impl Consensus {
    pub fn new(
        system: &mut EventSystem<ConsensusEvent>,
        node_id: NodeId,
        data_factory: Rc<dyn DataFactory>,
        vote_factory: Rc<dyn VoteFactory>,
        timeouts: TimeoutsConfig,
    ) -> Self {
        let pools = Rc::new(RefCell::new(MessagePools::default()));
        let async_layer = Rc::new(RefCell::new(AsyncLayer::new(
            node_id,
            system.sender(),
            system.delayed_mediator(),
            Rc::clone(&data_factory),
            Rc::clone(&vote_factory),
            timeouts,
        )));
        let round_layer = Rc::new(RefCell::new(RoundLayer::new(
            node_id,
            system.sender(),
            data_factory,
            vote_factory,
            Rc::clone(&pools),
        )));

        // Admission runs before the decision core on their shared events.
        for kind in [
            ConsensusEventKind::Initialize,
            ConsensusEventKind::StartRound,
            ConsensusEventKind::DoneRound,
            ConsensusEventKind::ReceivedConsensusData,
            ConsensusEventKind::ReceivedConsensusVote,
        ] {
            let layer = Rc::clone(&async_layer);
            system.register_handler(
                kind,
                Box::new(move |event| {
                    layer.borrow_mut().handle_event(event);
                    futures::future::ready(()).boxed_local()
                }),
            );
        }
        for kind in [
            ConsensusEventKind::Initialize,
            ConsensusEventKind::StartRound,
            ConsensusEventKind::DoneRound,
            ConsensusEventKind::ProposeSequence,
            ConsensusEventKind::VoteSequence,
        ] {
            let layer = Rc::clone(&round_layer);
            system.register_handler(
                kind,
                Box::new(move |event| {
                    layer.borrow_mut().handle_event(event);
                    futures::future::ready(()).boxed_local()
                }),
            );
        }

        // Boundary promotion: raw receptions and loopbacks of our own
        // broadcasts both feed admission.
        for kind in [ConsensusEventKind::ReceivedData, ConsensusEventKind::ReceiveData] {
            let sender = system.sender();
            system.register_handler(
                kind,
                Box::new(move |event| {
                    let data = match event {
                        ConsensusEvent::ReceivedData(event) => event.data,
                        ConsensusEvent::ReceiveData(event) => event.data,
                        other => unreachable!("unexpected {:?}", other.kind()),
                    };
                    sender.raise(ConsensusEvent::ReceivedConsensusData(
                        ReceivedConsensusDataEvent { data },
                    ));
                    futures::future::ready(()).boxed_local()
                }),
            );
        }
        for kind in [ConsensusEventKind::ReceivedVote, ConsensusEventKind::ReceiveVote] {
            let sender = system.sender();
            system.register_handler(
                kind,
                Box::new(move |event| {
                    let vote = match event {
                        ConsensusEvent::ReceivedVote(event) => event.vote,
                        ConsensusEvent::ReceiveVote(event) => event.vote,
                        other => unreachable!("unexpected {:?}", other.kind()),
                    };
                    sender.raise(ConsensusEvent::ReceivedConsensusVote(
                        ReceivedConsensusVoteEvent { vote },
                    ));
                    futures::future::ready(()).boxed_local()
                }),
            );
        }

        // RoundEnd becomes DoneRound once the winning candidate is resolved
        // through the data pool.
        {
            let sender = system.sender();
            let pools = Rc::clone(&pools);
            system.register_handler(
                ConsensusEventKind::RoundEnd,
                Box::new(move |event| {
                    let ConsensusEvent::RoundEnd(end) = event else {
                        unreachable!("handler registered for RoundEnd only")
                    };
                    let candidate_data =
                        end.candidate_id.and_then(|id| pools.borrow().data.get(id).cloned());
                    sender.raise(ConsensusEvent::DoneRound(DoneRoundEvent {
                        is_success: end.is_success,
                        epoch_num: end.epoch_num,
                        round_num: end.round_num,
                        candidate_data,
                        commit_id: end.commit_id,
                    }));
                    futures::future::ready(()).boxed_local()
                }),
            );
        }

        Self { node_id, async_layer, round_layer }
    }

    /// Snapshot the internal state without exposing the layers themselves.
    pub fn inspect(&self) -> ConsensusSnapshot {
        let async_layer = self.async_layer.borrow();
        let round_layer = self.round_layer.borrow();
        ConsensusSnapshot {
            node_id: self.node_id,
            epoch_num: async_layer.epoch_num(),
            round_num: async_layer.round_num(),
            candidate_num: async_layer.candidate_num(),
            candidate_id: round_layer.candidate_id(),
            buffered_data: async_layer.buffered_data(),
            buffered_votes: async_layer.buffered_votes(),
            is_voted: round_layer.is_voted(),
            is_ended: round_layer.is_ended(),
        }
    }
}
