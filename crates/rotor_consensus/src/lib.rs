#![warn(missing_docs)]
//! Leader-rotation BFT consensus core.
//!
//! A round of consensus is one proposal-and-vote cycle: the round's leader
//! (rotating through the epoch's voter set) extends the current candidate
//! with a new proposal, every voter casts exactly one vote, and the round
//! ends once some proposal (or the NONE sentinel) gathers a quorum of votes.
//!
//! The crate is split along the protocol's layering:
//! - [`async_layer`] admits, buffers, and reorders network messages, and
//!   arms the liveness timers that keep rounds terminating;
//! - [`round_layer`] is the per-round decision core, aggregating messages in
//!   [`round_messages`];
//! - [`consensus`] wires both onto a
//!   [`rotor_events::EventSystem`], whose record/replay drivers make whole
//!   runs reproducible.
//!
//! Cryptographic signing and the gossip transport live outside this crate;
//! messages come in through factories and verification predicates.

#[allow(missing_docs)]
pub mod async_layer;
pub mod config;
#[allow(missing_docs)]
pub mod consensus;
pub mod epoch;
#[allow(missing_docs)]
pub mod events;
#[allow(missing_docs)]
pub mod message;
#[allow(missing_docs)]
pub mod round_layer;
pub mod round_messages;
#[allow(missing_docs)]
pub mod types;

pub use consensus::{Consensus, ConsensusSnapshot};

#[cfg(test)]
pub(crate) mod test_utils;
