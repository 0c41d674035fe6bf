use std::fmt;

use serde::{Deserialize, Serialize};

use crate::epoch::EpochError;

/// Round number within an epoch.
pub type Round = u32;

/// Epoch number.
pub type EpochNum = u64;

/// Identity of a consensus node / voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{:x}", self.0)
    }
}

/// Identity of a data proposal: a digest of its identity fields. Two
/// messages with the same id are the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataId(pub u64);

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Identity of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoteId(pub u64);

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error(transparent)]
    Epoch(#[from] EpochError),
    #[error("data verification failed: {0}")]
    DataVerification(String),
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}
