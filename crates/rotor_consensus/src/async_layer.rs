//! Admission, buffering, and timeout-completion of consensus messages.
//!
//! The layer shields the decision core from network jitter: messages are
//! admitted against the current epoch/round/candidate, buffered per round,
//! re-delivered when the round catches up, and completed by liveness timers
//! that inject synthetic NONE messages.

#[cfg(test)]
#[path = "async_layer_test.rs"]
mod async_layer_test;

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use rotor_events::mediators::DelayedEventMediator;
use rotor_events::EventSender;
use tracing::{debug, trace, warn};

use crate::config::TimeoutsConfig;
use crate::epoch::Epoch;
use crate::events::{
    ConsensusEvent,
    DoneRoundEvent,
    InitializeEvent,
    ProposeSequenceEvent,
    ReceivedConsensusDataEvent,
    ReceivedConsensusVoteEvent,
    StartRoundEvent,
    VoteSequenceEvent,
};
use crate::message::data::{Data, DataFactory, DataKind};
use crate::message::vote::{Vote, VoteFactory};
use crate::types::{NodeId, Round, VoteId};

/// Votes of one round, grouped per voter. Both levels keep arrival order;
/// the first vote per voter is the authoritative one for quorum counting,
/// later votes are retained for audit only.
#[derive(Debug, Default)]
struct RoundVotes {
    by_voter: Vec<(NodeId, Vec<Vote>)>,
}

impl RoundVotes {
    fn contains(&self, voter_id: NodeId, vote_id: VoteId) -> bool {
        self.votes_of(voter_id).is_some_and(|votes| votes.iter().any(|vote| vote.id == vote_id))
    }

    fn voter_has_none_vote(&self, voter_id: NodeId) -> bool {
        self.votes_of(voter_id).is_some_and(|votes| votes.iter().any(Vote::is_none))
    }

    fn votes_of(&self, voter_id: NodeId) -> Option<&Vec<Vote>> {
        self.by_voter.iter().find(|(voter, _)| *voter == voter_id).map(|(_, votes)| votes)
    }

    fn insert(&mut self, vote: Vote) {
        match self.by_voter.iter_mut().find(|(voter, _)| *voter == vote.voter_id) {
            Some((_, votes)) => votes.push(vote),
            None => self.by_voter.push((vote.voter_id, vec![vote])),
        }
    }

    fn first_votes(&self) -> impl Iterator<Item = &Vote> {
        self.by_voter.iter().filter_map(|(_, votes)| votes.first())
    }

    fn into_all(self) -> impl Iterator<Item = Vote> {
        self.by_voter.into_iter().flat_map(|(_, votes)| votes)
    }
}

/// The admission and buffering layer.
pub struct AsyncLayer {
    node_id: NodeId,
    sender: EventSender<ConsensusEvent>,
    delayed: DelayedEventMediator<ConsensusEvent>,
    data_factory: Rc<dyn DataFactory>,
    vote_factory: Rc<dyn VoteFactory>,
    timeouts: TimeoutsConfig,
    epoch: Option<Epoch>,
    round_num: Round,
    candidate_num: u64,
    data_by_round: BTreeMap<Round, Vec<Data>>,
    vote_by_round: BTreeMap<Round, RoundVotes>,
    vote_timeout_started: bool,
}

impl AsyncLayer {
    pub fn new(
        node_id: NodeId,
        sender: EventSender<ConsensusEvent>,
        delayed: DelayedEventMediator<ConsensusEvent>,
        data_factory: Rc<dyn DataFactory>,
        vote_factory: Rc<dyn VoteFactory>,
        timeouts: TimeoutsConfig,
    ) -> Self {
        Self {
            node_id,
            sender,
            delayed,
            data_factory,
            vote_factory,
            timeouts,
            epoch: None,
            round_num: 0,
            candidate_num: 0,
            data_by_round: BTreeMap::new(),
            vote_by_round: BTreeMap::new(),
            vote_timeout_started: false,
        }
    }

    pub fn handle_event(&mut self, event: ConsensusEvent) {
        match event {
            ConsensusEvent::Initialize(event) => self.on_initialize(event),
            ConsensusEvent::StartRound(event) => self.on_start_round(event),
            ConsensusEvent::DoneRound(event) => self.on_done_round(event),
            ConsensusEvent::ReceivedConsensusData(event) => {
                self.on_received_consensus_data(event)
            }
            ConsensusEvent::ReceivedConsensusVote(event) => {
                self.on_received_consensus_vote(event)
            }
            _ => {}
        }
    }

    pub fn epoch_num(&self) -> Option<u64> {
        self.epoch.as_ref().map(Epoch::num)
    }

    pub fn round_num(&self) -> Round {
        self.round_num
    }

    pub fn candidate_num(&self) -> u64 {
        self.candidate_num
    }

    pub fn buffered_data(&self) -> usize {
        self.data_by_round.values().map(Vec::len).sum()
    }

    pub fn buffered_votes(&self) -> usize {
        self.vote_by_round
            .values()
            .map(|votes| votes.by_voter.iter().map(|(_, v)| v.len()).sum::<usize>())
            .sum()
    }

    fn on_initialize(&mut self, event: InitializeEvent) {
        self.candidate_num = event.candidate_data.as_ref().map(|data| data.number).unwrap_or(0);
        self.new_round(event.epoch_num, event.round_num, event.voters);
        self.schedule_propose_timeout();
    }

    fn on_start_round(&mut self, event: StartRoundEvent) {
        self.new_round(event.epoch_num, event.round_num, event.voters);
        self.schedule_propose_timeout();
    }

    fn on_done_round(&mut self, event: DoneRoundEvent) {
        let Some(candidate) = event.candidate_data else { return };
        if candidate.number < self.candidate_num {
            warn!(
                node = %self.node_id,
                old = self.candidate_num,
                new = candidate.number,
                "ignoring a candidate older than the current one"
            );
            return;
        }
        self.candidate_num = candidate.number;
    }

    fn on_received_consensus_data(&mut self, event: ReceivedConsensusDataEvent) {
        let data = event.data;
        if !self.is_acceptable_data(&data) {
            trace!(node = %self.node_id, id = %data.id, "data not admitted");
            return;
        }
        let epoch = self.epoch.as_ref().expect("admission requires an epoch");

        if !data.is_real() {
            // Synthetic placeholders only matter for the round in flight.
            if data.round_num == self.round_num {
                self.store_data(data.clone());
                self.sender.raise(ConsensusEvent::ProposeSequence(ProposeSequenceEvent { data }));
            }
            return;
        }

        let current_window =
            data.number == self.candidate_num || data.number == self.candidate_num + 1;
        if current_window && data.round_num == self.round_num {
            if let Err(error) = epoch.verify_data(&data) {
                warn!(node = %self.node_id, id = %data.id, %error, "rejecting data");
                return;
            }
            self.store_data(data.clone());
            self.sender.raise(ConsensusEvent::ProposeSequence(ProposeSequenceEvent { data }));
        } else if data.number == self.candidate_num + 2 && data.round_num == self.round_num + 1 {
            // Look-ahead: the next round's proposal proves, through its
            // prev_votes, that the round we are still in already finished.
            if let Err(error) = epoch.verify_data(&data) {
                warn!(node = %self.node_id, id = %data.id, %error, "rejecting look-ahead data");
                return;
            }
            debug!(node = %self.node_id, id = %data.id, "admitted look-ahead data");
            let parent = implied_parent(&data, epoch);
            self.store_data(data.clone());
            if let Some(parent) = parent {
                self.raise_received_data(Duration::ZERO, parent);
            }
            for vote in data.prev_votes.iter().flatten() {
                self.raise_received_vote(Duration::ZERO, vote.clone());
            }
            self.raise_received_data(Duration::ZERO, data);
        }
    }

    fn on_received_consensus_vote(&mut self, event: ReceivedConsensusVoteEvent) {
        let vote = event.vote;
        if !self.is_acceptable_vote(&vote) {
            trace!(node = %self.node_id, id = %vote.id, "vote not admitted");
            return;
        }
        let epoch = self.epoch.as_ref().expect("admission requires an epoch");
        if let Err(error) = epoch.verify_vote(&vote) {
            warn!(node = %self.node_id, id = %vote.id, %error, "rejecting vote");
            return;
        }
        self.vote_by_round.entry(vote.round_num).or_default().insert(vote.clone());
        if vote.round_num != self.round_num {
            return;
        }
        self.sender.raise(ConsensusEvent::VoteSequence(VoteSequenceEvent { vote }));

        if self.vote_timeout_started || !self.votes_reach_quorum(self.round_num) {
            return;
        }
        // First time this round hit vote quorum: give stragglers one timeout,
        // then close the round out with synthetic NONE votes.
        self.vote_timeout_started = true;
        let epoch_num = epoch.num();
        let voters = epoch.voters().to_vec();
        for voter_id in voters {
            let none_vote = self.vote_factory.create_none_vote(voter_id, epoch_num, self.round_num);
            self.raise_received_vote(self.timeouts.timeout_vote, none_vote);
        }
    }

    fn new_round(&mut self, epoch_num: u64, round_num: Round, voters: Vec<NodeId>) {
        self.vote_timeout_started = false;
        self.round_num = round_num;

        let epoch_changed = self.epoch.as_ref().map(Epoch::num) != Some(epoch_num);
        if epoch_changed {
            self.epoch = Some(Epoch::with_default_quorum(epoch_num, voters));
            self.data_by_round.clear();
            self.vote_by_round.clear();
            return;
        }
        self.trim_rounds();
        // Flush messages buffered for the round we just entered, as if they
        // arrived now. Removing them first means they pass admission again
        // and are processed exactly once.
        if let Some(datas) = self.data_by_round.remove(&round_num) {
            for data in datas {
                self.raise_received_data(Duration::ZERO, data);
            }
        }
        if let Some(votes) = self.vote_by_round.remove(&round_num) {
            for vote in votes.into_all() {
                self.raise_received_vote(Duration::ZERO, vote);
            }
        }
    }

    fn schedule_propose_timeout(&mut self) {
        let Some(epoch) = &self.epoch else { return };
        let expected_proposer = epoch.get_proposer_id(self.round_num);
        if expected_proposer == self.node_id {
            return;
        }
        let none_data =
            self.data_factory.create_none_data(epoch.num(), self.round_num, expected_proposer);
        self.raise_received_data(self.timeouts.timeout_propose, none_data);
    }

    fn is_acceptable_data(&self, data: &Data) -> bool {
        let Some(epoch) = &self.epoch else { return false };
        if epoch.num() != data.epoch_num {
            return false;
        }
        if self.round_num > data.round_num {
            return false;
        }
        // Placeholders carry no meaningful height.
        if data.is_real() && data.number < self.candidate_num {
            return false;
        }
        let round_buffer = self.round_data(data.round_num);
        if round_buffer.iter().any(|buffered| buffered.id == data.id) {
            return false;
        }
        if !data.is_real() && !round_buffer.is_empty() {
            return false;
        }
        true
    }

    fn is_acceptable_vote(&self, vote: &Vote) -> bool {
        let Some(epoch) = &self.epoch else { return false };
        if epoch.num() != vote.epoch_num {
            return false;
        }
        if self.round_num > vote.round_num {
            return false;
        }
        if let Some(votes) = self.vote_by_round.get(&vote.round_num) {
            if votes.contains(vote.voter_id, vote.id) {
                return false;
            }
            // One NONE per voter per round; a NONE after a real vote is kept
            // for the audit trail, so the timeout path can fail a split
            // round.
            if vote.is_none() && votes.voter_has_none_vote(vote.voter_id) {
                return false;
            }
        }
        true
    }

    // Quorum many voters have spoken, whichever way they voted.
    fn votes_reach_quorum(&self, round_num: Round) -> bool {
        let Some(epoch) = &self.epoch else { return false };
        let Some(votes) = self.vote_by_round.get(&round_num) else { return false };
        votes.first_votes().count() >= epoch.quorum_num()
    }

    fn round_data(&self, round_num: Round) -> &[Data] {
        self.data_by_round.get(&round_num).map(Vec::as_slice).unwrap_or(&[])
    }

    fn store_data(&mut self, data: Data) {
        self.data_by_round.entry(data.round_num).or_default().push(data);
    }

    fn trim_rounds(&mut self) {
        self.data_by_round = self.data_by_round.split_off(&self.round_num);
        self.vote_by_round = self.vote_by_round.split_off(&self.round_num);
    }

    fn raise_received_data(&self, delay: Duration, data: Data) {
        let event = ConsensusEvent::ReceivedConsensusData(ReceivedConsensusDataEvent { data });
        self.delayed.execute(delay, event);
    }

    fn raise_received_vote(&self, delay: Duration, vote: Vote) {
        let event = ConsensusEvent::ReceivedConsensusVote(ReceivedConsensusVoteEvent { vote });
        self.delayed.execute(delay, event);
    }
}

/// Reconstruct the predecessor a look-ahead proposal attests to. Its
/// prev_votes carry the id, round, and parent link; the height is one below
/// the proposal's own.
fn implied_parent(data: &Data, epoch: &Epoch) -> Option<Data> {
    let parent_id = data.prev_id?;
    let vote = data.prev_votes.iter().flatten().find(|vote| vote.data_id == Some(parent_id))?;
    Some(Data {
        id: parent_id,
        prev_id: vote.commit_id,
        proposer_id: epoch.get_proposer_id(vote.round_num),
        number: data.number - 1,
        epoch_num: vote.epoch_num,
        round_num: vote.round_num,
        prev_votes: Vec::new(),
        kind: DataKind::Real,
    })
}
