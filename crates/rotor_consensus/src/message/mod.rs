//! Consensus messages: proposals, votes, their factories, and the pools that
//! retain them across rounds.

pub mod data;
pub mod pool;
pub mod vote;

pub use data::{Data, DataFactory, DataKind, DataVerifier, DefaultDataFactory};
pub use pool::{DataPool, MessagePools, VotePool};
pub use vote::{DefaultVoteFactory, Vote, VoteFactory};
