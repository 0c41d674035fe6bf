//! Votes and their factory.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::types::{DataId, EpochNum, NodeId, Round, VoteId};

/// A vote for one data proposal, or a NONE vote asserting the round should
/// fail (`data_id` absent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    /// The data voted for; `None` is the NONE sentinel.
    pub data_id: Option<DataId>,
    /// The voter's candidate at the time of voting.
    pub commit_id: Option<DataId>,
    pub voter_id: NodeId,
    pub epoch_num: EpochNum,
    pub round_num: Round,
}

impl Vote {
    pub fn is_real(&self) -> bool {
        self.data_id.is_some()
    }

    pub fn is_none(&self) -> bool {
        self.data_id.is_none()
    }
}

/// Creates votes. Signing happens outside this crate.
pub trait VoteFactory {
    /// A vote by this node for `data_id`.
    fn create_vote(
        &self,
        data_id: DataId,
        commit_id: Option<DataId>,
        epoch_num: EpochNum,
        round_num: Round,
    ) -> Vote;

    /// A NONE vote on behalf of `voter_id` (liveness timers synthesize these
    /// for silent voters; a node passes its own id when voting NONE itself).
    fn create_none_vote(&self, voter_id: NodeId, epoch_num: EpochNum, round_num: Round) -> Vote;
}

/// Factory whose ids are digests of the identity fields.
#[derive(Debug, Clone)]
pub struct DefaultVoteFactory {
    node_id: NodeId,
}

impl DefaultVoteFactory {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

fn derive_id(
    voter_id: NodeId,
    data_id: Option<DataId>,
    commit_id: Option<DataId>,
    epoch_num: EpochNum,
    round_num: Round,
) -> VoteId {
    let mut hasher = DefaultHasher::new();
    ("vote", voter_id, data_id, commit_id, epoch_num, round_num).hash(&mut hasher);
    VoteId(hasher.finish())
}

impl VoteFactory for DefaultVoteFactory {
    fn create_vote(
        &self,
        data_id: DataId,
        commit_id: Option<DataId>,
        epoch_num: EpochNum,
        round_num: Round,
    ) -> Vote {
        Vote {
            id: derive_id(self.node_id, Some(data_id), commit_id, epoch_num, round_num),
            data_id: Some(data_id),
            commit_id,
            voter_id: self.node_id,
            epoch_num,
            round_num,
        }
    }

    fn create_none_vote(&self, voter_id: NodeId, epoch_num: EpochNum, round_num: Round) -> Vote {
        Vote {
            id: derive_id(voter_id, None, None, epoch_num, round_num),
            data_id: None,
            commit_id: None,
            voter_id,
            epoch_num,
            round_num,
        }
    }
}
