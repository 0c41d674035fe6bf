//! Retention of recently decided messages, so the next leader can fetch its
//! candidate and assemble `prev_votes`.

use std::collections::{BTreeMap, HashMap};

use crate::message::data::Data;
use crate::message::vote::Vote;
use crate::types::{DataId, EpochNum, Round};

/// Data proposals by id. First insertion wins; same id means same message.
#[derive(Debug, Default)]
pub struct DataPool {
    by_id: HashMap<DataId, Data>,
}

impl DataPool {
    pub fn add(&mut self, data: Data) {
        self.by_id.entry(data.id).or_insert(data);
    }

    pub fn get(&self, id: DataId) -> Option<&Data> {
        self.by_id.get(&id)
    }

    /// Drop proposals below the given height.
    pub fn prune_below(&mut self, number: u64) {
        self.by_id.retain(|_, data| data.number >= number);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Votes grouped by the (epoch, round) they were cast in.
#[derive(Debug, Default)]
pub struct VotePool {
    by_round: BTreeMap<(EpochNum, Round), Vec<Vote>>,
}

impl VotePool {
    pub fn add(&mut self, vote: Vote) {
        let bucket = self.by_round.entry((vote.epoch_num, vote.round_num)).or_default();
        if !bucket.iter().any(|existing| existing.id == vote.id) {
            bucket.push(vote);
        }
    }

    pub fn votes_for(&self, epoch_num: EpochNum, round_num: Round) -> &[Vote] {
        self.by_round.get(&(epoch_num, round_num)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop votes cast before the given round of the given epoch, and all
    /// votes of earlier epochs.
    pub fn prune_before(&mut self, epoch_num: EpochNum, round_num: Round) {
        self.by_round.retain(|&key, _| key >= (epoch_num, round_num));
    }
}

/// The shared message pools.
#[derive(Debug, Default)]
pub struct MessagePools {
    pub data: DataPool,
    pub votes: VotePool,
}

impl MessagePools {
    /// Drop everything older than the new candidate.
    pub fn prune_to_candidate(&mut self, candidate: &Data) {
        self.data.prune_below(candidate.number);
        self.votes.prune_before(candidate.epoch_num, candidate.round_num);
    }
}
