//! Per-round aggregation of proposals and votes, and the quorum rule that
//! determines the round's result.

#[cfg(test)]
#[path = "round_messages_test.rs"]
mod round_messages_test;

use std::collections::HashMap;

use crate::message::data::Data;
use crate::message::vote::Vote;
use crate::types::{DataId, NodeId};

/// Messages of one round. Constructed at round start, dropped at the next.
///
/// Votes are tallied by the data id they name. For real data ids only the
/// first vote recorded per voter counts; later votes from the same voter are
/// retained for audit. The NONE bucket instead counts every distinct voter
/// with a NONE vote on record, so timeout-injected NONE votes can fail a
/// round whose voters are known to be split.
#[derive(Debug)]
pub struct RoundMessages {
    quorum_num: usize,
    datums: HashMap<DataId, Data>,
    votes_by_voter: HashMap<NodeId, Vec<Vote>>,
    none_data: Data,
    result: Option<Data>,
}

impl RoundMessages {
    /// `none_data` is the canonical NONE placeholder returned as the result
    /// when the NONE bucket wins.
    pub fn new(quorum_num: usize, none_data: Data) -> Self {
        Self {
            quorum_num,
            datums: HashMap::new(),
            votes_by_voter: HashMap::new(),
            none_data,
            result: None,
        }
    }

    /// Record a datum; the first arrival per id wins.
    pub fn add_data(&mut self, data: Data) {
        self.datums.entry(data.id).or_insert(data);
    }

    /// Record a vote in its voter's arrival order.
    pub fn add_vote(&mut self, vote: Vote) {
        self.votes_by_voter.entry(vote.voter_id).or_default().push(vote);
    }

    /// Number of distinct datums on record.
    pub fn data_count(&self) -> usize {
        self.datums.len()
    }

    /// Number of votes on record, audit copies included.
    pub fn vote_count(&self) -> usize {
        self.votes_by_voter.values().map(Vec::len).sum()
    }

    /// The round's result, once determinative.
    pub fn result(&self) -> Option<&Data> {
        self.result.as_ref()
    }

    /// Whether the result can no longer change as more votes arrive.
    pub fn is_determinative(&self) -> bool {
        self.result.is_some()
    }

    /// Recompute the result. Once determinative, further updates are no-ops.
    ///
    /// A bucket reaching quorum selects the round's result: the datum with
    /// the winning id, or the NONE placeholder if the NONE bucket wins. A
    /// real id that reaches quorum before its datum arrives leaves the round
    /// undetermined until the datum shows up. A real winner takes precedence
    /// over a simultaneous NONE quorum.
    pub fn update(&mut self) {
        if self.is_determinative() {
            return;
        }
        let mut real_buckets: HashMap<DataId, usize> = HashMap::new();
        let mut none_voters = 0;
        for votes in self.votes_by_voter.values() {
            if let Some(data_id) = votes.first().and_then(|vote| vote.data_id) {
                *real_buckets.entry(data_id).or_insert(0) += 1;
            }
            if votes.iter().any(Vote::is_none) {
                none_voters += 1;
            }
        }
        let real_winner = real_buckets
            .into_iter()
            .find(|&(_, count)| count >= self.quorum_num)
            .map(|(data_id, _)| data_id);
        if let Some(data_id) = real_winner {
            if let Some(datum) = self.datums.get(&data_id) {
                self.result = Some(datum.clone());
            }
        } else if none_voters >= self.quorum_num {
            self.result = Some(self.none_data.clone());
        }
    }
}
