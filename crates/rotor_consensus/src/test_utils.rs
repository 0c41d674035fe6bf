use std::cell::RefCell;
use std::rc::Rc;

use futures::FutureExt;
use rotor_events::EventSystem;

use crate::config::TimeoutsConfig;
use crate::consensus::Consensus;
use crate::events::{
    ConsensusEvent,
    ConsensusEventKind,
    DoneRoundEvent,
    InitializeEvent,
    RoundEndEvent,
};
use crate::message::data::{Data, DataFactory, DefaultDataFactory};
use crate::message::vote::{DefaultVoteFactory, Vote, VoteFactory};
use crate::types::{DataId, EpochNum, NodeId, Round};

pub(crate) const EPOCH_NUM: EpochNum = 0;
pub(crate) const NODE_A: NodeId = NodeId(0xa);
pub(crate) const NODE_B: NodeId = NodeId(0xb);
pub(crate) const NODE_C: NodeId = NodeId(0xc);
pub(crate) const NODE_D: NodeId = NodeId(0xd);

/// A is the leader of round 0, quorum is 3.
pub(crate) fn four_voters() -> Vec<NodeId> {
    vec![NODE_A, NODE_B, NODE_C, NODE_D]
}

pub(crate) fn proposal_by(
    proposer: NodeId,
    number: u64,
    prev_id: Option<DataId>,
    round_num: Round,
) -> Data {
    DefaultDataFactory::new(proposer).create_data(
        number,
        prev_id,
        EPOCH_NUM,
        round_num,
        vec![None; 4],
    )
}

pub(crate) fn vote_by(voter: NodeId, data_id: DataId, round_num: Round) -> Vote {
    DefaultVoteFactory::new(voter).create_vote(data_id, None, EPOCH_NUM, round_num)
}

pub(crate) fn vote_with_commit(
    voter: NodeId,
    data_id: DataId,
    commit_id: Option<DataId>,
    round_num: Round,
) -> Vote {
    DefaultVoteFactory::new(voter).create_vote(data_id, commit_id, EPOCH_NUM, round_num)
}

pub(crate) fn none_vote_by(voter: NodeId, round_num: Round) -> Vote {
    DefaultVoteFactory::new(voter).create_none_vote(voter, EPOCH_NUM, round_num)
}

/// Collect every dispatched event of the given kinds.
pub(crate) fn observe(
    system: &mut EventSystem<ConsensusEvent>,
    kinds: &[ConsensusEventKind],
) -> Rc<RefCell<Vec<ConsensusEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    for &kind in kinds {
        let seen = Rc::clone(&seen);
        system.register_handler(
            kind,
            Box::new(move |event| {
                seen.borrow_mut().push(event);
                futures::future::ready(()).boxed_local()
            }),
        );
    }
    seen
}

pub(crate) const OUTPUT_KINDS: [ConsensusEventKind; 4] = [
    ConsensusEventKind::BroadcastData,
    ConsensusEventKind::BroadcastVote,
    ConsensusEventKind::RoundEnd,
    ConsensusEventKind::DoneRound,
];

/// One node's full consensus stack with an observer on its outputs.
pub(crate) struct ConsensusHarness {
    pub system: EventSystem<ConsensusEvent>,
    pub consensus: Consensus,
    pub outbox: Rc<RefCell<Vec<ConsensusEvent>>>,
}

impl ConsensusHarness {
    pub fn new(node_id: NodeId) -> Self {
        let mut system = EventSystem::new();
        let outbox = observe(&mut system, &OUTPUT_KINDS);
        let consensus = Consensus::new(
            &mut system,
            node_id,
            Rc::new(DefaultDataFactory::new(node_id)),
            Rc::new(DefaultVoteFactory::new(node_id)),
            TimeoutsConfig::default(),
        );
        Self { system, consensus, outbox }
    }

    pub fn initialize(&self, voters: Vec<NodeId>) {
        self.system.raise_event(ConsensusEvent::Initialize(InitializeEvent {
            epoch_num: EPOCH_NUM,
            round_num: 0,
            voters,
            candidate_data: None,
        }));
    }

    pub async fn pump(&mut self) -> usize {
        self.system.run_until_idle().await.unwrap()
    }

    pub fn broadcast_data(&self) -> Vec<Data> {
        self.outbox
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ConsensusEvent::BroadcastData(event) => Some(event.data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn broadcast_votes(&self) -> Vec<Vote> {
        self.outbox
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ConsensusEvent::BroadcastVote(event) => Some(event.vote.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn round_ends(&self) -> Vec<RoundEndEvent> {
        self.outbox
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ConsensusEvent::RoundEnd(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn done_rounds(&self) -> Vec<DoneRoundEvent> {
        self.outbox
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ConsensusEvent::DoneRound(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }
}
