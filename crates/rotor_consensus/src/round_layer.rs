//! The per-round decision core.
//!
//! Owns the round's [`RoundMessages`], proposes when this node leads the
//! round, casts exactly one vote per round, and emits exactly one `RoundEnd`
//! once the round is determinative.

#[cfg(test)]
#[path = "round_layer_test.rs"]
mod round_layer_test;

use std::cell::RefCell;
use std::rc::Rc;

use rotor_events::EventSender;
use tracing::{debug, info, warn};

use crate::epoch::Epoch;
use crate::events::{
    BroadcastDataEvent,
    BroadcastVoteEvent,
    ConsensusEvent,
    DoneRoundEvent,
    InitializeEvent,
    ReceiveDataEvent,
    ReceiveVoteEvent,
    RoundEndEvent,
    StartRoundEvent,
};
use crate::message::data::{Data, DataFactory, DataVerifier};
use crate::message::pool::MessagePools;
use crate::message::vote::{Vote, VoteFactory};
use crate::round_messages::RoundMessages;
use crate::types::{DataId, NodeId, Round};

/// State machine: Idle until the first round starts, then one
/// Started -> Voted -> Ended pass per round.
pub struct RoundLayer {
    node_id: NodeId,
    sender: EventSender<ConsensusEvent>,
    data_factory: Rc<dyn DataFactory>,
    vote_factory: Rc<dyn VoteFactory>,
    pools: Rc<RefCell<MessagePools>>,
    verifier: Box<dyn DataVerifier>,
    epoch: Option<Epoch>,
    round_num: Round,
    candidate_id: Option<DataId>,
    messages: Option<RoundMessages>,
    is_voted: bool,
    is_ended: bool,
}

impl RoundLayer {
    pub fn new(
        node_id: NodeId,
        sender: EventSender<ConsensusEvent>,
        data_factory: Rc<dyn DataFactory>,
        vote_factory: Rc<dyn VoteFactory>,
        pools: Rc<RefCell<MessagePools>>,
    ) -> Self {
        let verifier = data_factory.create_verifier();
        Self {
            node_id,
            sender,
            data_factory,
            vote_factory,
            pools,
            verifier,
            epoch: None,
            round_num: 0,
            candidate_id: None,
            messages: None,
            is_voted: false,
            is_ended: false,
        }
    }

    pub fn handle_event(&mut self, event: ConsensusEvent) {
        match event {
            ConsensusEvent::Initialize(event) => self.on_initialize(event),
            ConsensusEvent::StartRound(event) => self.on_start_round(event),
            ConsensusEvent::DoneRound(event) => self.on_done_round(event),
            ConsensusEvent::ProposeSequence(event) => self.receive_data(event.data),
            ConsensusEvent::VoteSequence(event) => self.receive_vote(event.vote),
            _ => {}
        }
    }

    pub fn candidate_id(&self) -> Option<DataId> {
        self.candidate_id
    }

    pub fn is_voted(&self) -> bool {
        self.is_voted
    }

    pub fn is_ended(&self) -> bool {
        self.is_ended
    }

    fn on_initialize(&mut self, event: InitializeEvent) {
        if let Some(candidate) = event.candidate_data {
            self.candidate_id = Some(candidate.id);
            self.pools.borrow_mut().data.add(candidate);
        }
        let epoch = Epoch::with_default_quorum(event.epoch_num, event.voters);
        self.round_start(epoch, event.round_num);
    }

    fn on_start_round(&mut self, event: StartRoundEvent) {
        let epoch = Epoch::with_default_quorum(event.epoch_num, event.voters);
        self.round_start(epoch, event.round_num);
    }

    fn on_done_round(&mut self, event: DoneRoundEvent) {
        let Some(candidate) = event.candidate_data else { return };
        self.candidate_id = Some(candidate.id);
        self.pools.borrow_mut().prune_to_candidate(&candidate);
    }

    fn round_start(&mut self, epoch: Epoch, round_num: Round) {
        self.verifier = self.data_factory.create_verifier();
        self.round_num = round_num;
        self.is_voted = false;
        self.is_ended = false;

        let proposer_id = epoch.get_proposer_id(round_num);
        let none_data = self.data_factory.create_none_data(epoch.num(), round_num, proposer_id);
        let lazy_data = self.data_factory.create_lazy_data(epoch.num(), round_num, proposer_id);
        // Seed the round with the canonical placeholders so it can terminate
        // even if no proposal ever arrives over the network.
        let mut messages = RoundMessages::new(epoch.quorum_num(), none_data.clone());
        messages.add_data(none_data);
        messages.add_data(lazy_data);
        self.messages = Some(messages);

        if proposer_id == self.node_id {
            info!(node = %self.node_id, round = round_num, "START_ROUND_PROPOSER: starting round as proposer");
        } else {
            info!(node = %self.node_id, round = round_num, %proposer_id, "START_ROUND_VOTER: starting round as voter");
        }
        self.epoch = Some(epoch);
        self.create_data_if_proposer();
    }

    fn create_data_if_proposer(&mut self) {
        let epoch = self.epoch.as_ref().expect("round started");
        if epoch.verify_proposer(self.node_id, self.round_num).is_err() {
            return;
        }
        let (number, prev_votes) = {
            let pools = self.pools.borrow();
            match self.candidate_id {
                Some(candidate_id) => {
                    let Some(candidate) = pools.data.get(candidate_id) else {
                        warn!(
                            node = %self.node_id,
                            %candidate_id,
                            "candidate missing from the pool; not proposing this round"
                        );
                        return;
                    };
                    let candidate_votes =
                        pools.votes.votes_for(candidate.epoch_num, candidate.round_num);
                    // Project onto voter positions; absent voters stay None.
                    let projected = epoch
                        .voters()
                        .iter()
                        .map(|&voter| {
                            candidate_votes
                                .iter()
                                .find(|vote| {
                                    vote.voter_id == voter && vote.data_id == Some(candidate_id)
                                })
                                .cloned()
                        })
                        .collect();
                    (candidate.number + 1, projected)
                }
                None => (1, vec![None; epoch.voters().len()]),
            }
        };
        let data = self.data_factory.create_data(
            number,
            self.candidate_id,
            epoch.num(),
            self.round_num,
            prev_votes,
        );
        debug!(node = %self.node_id, round = self.round_num, id = %data.id, "built proposal");
        self.raise_broadcast_data(data);
    }

    fn receive_data(&mut self, data: Data) {
        let Some(messages) = &mut self.messages else { return };
        messages.add_data(data.clone());
        self.pools.borrow_mut().data.add(data.clone());
        if !self.is_voted {
            self.is_voted = true;
            self.verify_and_broadcast_vote(&data);
        }
        self.update_round_if_complete();
    }

    fn receive_vote(&mut self, vote: Vote) {
        let epoch = self.epoch.as_ref().expect("round started");
        assert!(
            epoch.voter_position(vote.voter_id).is_some(),
            "vote tallied for unknown voter {}",
            vote.voter_id
        );
        let Some(messages) = &mut self.messages else { return };
        messages.add_vote(vote.clone());
        self.pools.borrow_mut().votes.add(vote);
        self.update_round_if_complete();
    }

    fn update_round_if_complete(&mut self) {
        let Some(messages) = &mut self.messages else { return };
        messages.update();
        let Some(result) = messages.result() else { return };
        if self.is_ended {
            return;
        }
        self.is_ended = true;
        let result = result.clone();
        self.raise_round_end(&result);
    }

    fn verify_and_broadcast_vote(&mut self, data: &Data) {
        let epoch = self.epoch.as_ref().expect("round started");
        let vote = if self.verify_data(data) {
            self.vote_factory.create_vote(
                data.id,
                self.candidate_id,
                epoch.num(),
                self.round_num,
            )
        } else {
            self.vote_factory.create_none_vote(self.node_id, epoch.num(), self.round_num)
        };
        self.raise_broadcast_vote(vote);
    }

    /// The decision rule for voting on a proposal. Placeholders and
    /// proposals that do not extend our candidate earn a NONE vote.
    fn verify_data(&self, data: &Data) -> bool {
        if data.proposer_id == self.node_id {
            // We authored it.
            return true;
        }
        if data.prev_id != self.candidate_id {
            debug!(node = %self.node_id, id = %data.id, "proposal has the wrong parent");
            return false;
        }
        if let Some(candidate_id) = self.candidate_id {
            let pools = self.pools.borrow();
            let Some(candidate) = pools.data.get(candidate_id) else {
                return false;
            };
            if candidate.number + 1 != data.number {
                debug!(node = %self.node_id, id = %data.id, "proposal skips a height");
                return false;
            }
        }
        if !data.is_real() {
            return false;
        }
        match self.verifier.verify(data) {
            Ok(()) => true,
            Err(error) => {
                warn!(node = %self.node_id, id = %data.id, %error, "external verification rejected the proposal");
                false
            }
        }
    }

    fn raise_broadcast_data(&self, data: Data) {
        self.sender
            .raise(ConsensusEvent::BroadcastData(BroadcastDataEvent { data: data.clone() }));
        self.sender.raise(ConsensusEvent::ReceiveData(ReceiveDataEvent { data }));
    }

    fn raise_broadcast_vote(&self, vote: Vote) {
        self.sender
            .raise(ConsensusEvent::BroadcastVote(BroadcastVoteEvent { vote: vote.clone() }));
        self.sender.raise(ConsensusEvent::ReceiveVote(ReceiveVoteEvent { vote }));
    }

    fn raise_round_end(&self, result: &Data) {
        let epoch = self.epoch.as_ref().expect("round started");
        let event = if result.is_real() {
            info!(
                node = %self.node_id,
                round = self.round_num,
                candidate = %result.id,
                "ROUND_DECIDED: round reached quorum on a proposal"
            );
            RoundEndEvent {
                is_success: true,
                epoch_num: epoch.num(),
                round_num: self.round_num,
                candidate_id: Some(result.id),
                commit_id: result.prev_id,
            }
        } else {
            info!(
                node = %self.node_id,
                round = self.round_num,
                "ROUND_FAILED: round reached quorum on NONE"
            );
            RoundEndEvent {
                is_success: false,
                epoch_num: epoch.num(),
                round_num: self.round_num,
                candidate_id: None,
                commit_id: None,
            }
        };
        self.sender.raise(ConsensusEvent::RoundEnd(event));
    }
}
