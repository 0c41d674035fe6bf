//! The voter-set configuration for one epoch, fixing leader rotation, vote
//! positions, and the quorum.

#[cfg(test)]
#[path = "epoch_test.rs"]
mod epoch_test;

use serde::{Deserialize, Serialize};

use crate::message::data::Data;
use crate::message::vote::Vote;
use crate::types::{EpochNum, NodeId, Round};

/// Typed failures raised by the epoch predicates.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EpochError {
    /// The message belongs to a different epoch.
    #[error("epoch mismatch: expected {expected}, got {got}")]
    EpochMismatch {
        #[allow(missing_docs)]
        expected: EpochNum,
        #[allow(missing_docs)]
        got: EpochNum,
    },
    /// The node is not the leader of the round.
    #[error("invalid proposer for round {round}: expected {expected}, got {got}")]
    InvalidProposer {
        #[allow(missing_docs)]
        round: Round,
        #[allow(missing_docs)]
        expected: NodeId,
        #[allow(missing_docs)]
        got: NodeId,
    },
    /// The voter is not part of the epoch.
    #[error("unknown voter {0}")]
    UnknownVoter(NodeId),
}

/// An epoch: ordered voters plus the quorum needed to determine a round.
/// Round `r`'s leader is `voters[r % len(voters)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    num: EpochNum,
    voters: Vec<NodeId>,
    quorum_num: usize,
}

impl Epoch {
    /// Epoch with a caller-supplied quorum.
    pub fn new(num: EpochNum, voters: Vec<NodeId>, quorum_num: usize) -> Self {
        assert!(!voters.is_empty(), "an epoch needs at least one voter");
        assert!(
            quorum_num > 0 && quorum_num <= voters.len(),
            "quorum {quorum_num} impossible for {} voters",
            voters.len()
        );
        Self { num, voters, quorum_num }
    }

    /// Epoch with the standard BFT quorum `2f + 1`, `f = (n - 1) / 3`.
    pub fn with_default_quorum(num: EpochNum, voters: Vec<NodeId>) -> Self {
        let faulty = (voters.len().saturating_sub(1)) / 3;
        let quorum_num = 2 * faulty + 1;
        Self::new(num, voters, quorum_num)
    }

    pub fn num(&self) -> EpochNum {
        self.num
    }

    pub fn voters(&self) -> &[NodeId] {
        &self.voters
    }

    pub fn quorum_num(&self) -> usize {
        self.quorum_num
    }

    /// Leader of the given round.
    pub fn get_proposer_id(&self, round_num: Round) -> NodeId {
        let index = usize::try_from(round_num).expect("round fits in usize") % self.voters.len();
        self.voters[index]
    }

    /// Position of a voter in the epoch's vote ordering.
    pub fn voter_position(&self, voter_id: NodeId) -> Option<usize> {
        self.voters.iter().position(|&voter| voter == voter_id)
    }

    /// Fails unless `node_id` leads the given round.
    pub fn verify_proposer(&self, node_id: NodeId, round_num: Round) -> Result<(), EpochError> {
        let expected = self.get_proposer_id(round_num);
        if node_id != expected {
            return Err(EpochError::InvalidProposer { round: round_num, expected, got: node_id });
        }
        Ok(())
    }

    /// Structural check of a proposal against this epoch.
    pub fn verify_data(&self, data: &Data) -> Result<(), EpochError> {
        if data.epoch_num != self.num {
            return Err(EpochError::EpochMismatch { expected: self.num, got: data.epoch_num });
        }
        self.verify_proposer(data.proposer_id, data.round_num)
    }

    /// Structural check of a vote against this epoch.
    pub fn verify_vote(&self, vote: &Vote) -> Result<(), EpochError> {
        if vote.epoch_num != self.num {
            return Err(EpochError::EpochMismatch { expected: self.num, got: vote.epoch_num });
        }
        if self.voter_position(vote.voter_id).is_none() {
            return Err(EpochError::UnknownVoter(vote.voter_id));
        }
        Ok(())
    }
}
