//! Data proposals, their factory, and the external verification seam.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::message::vote::Vote;
use crate::types::{ConsensusError, DataId, EpochNum, NodeId, Round};

/// Discriminates a genuine proposal from the synthetic placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// A genuine proposal.
    Real,
    /// The proposer did not produce.
    None,
    /// The proposer timed out waiting.
    Lazy,
}

/// A proposal, or a synthetic placeholder standing in for one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub id: DataId,
    /// Link to the predecessor. `None` only for genesis proposals and
    /// placeholders.
    pub prev_id: Option<DataId>,
    pub proposer_id: NodeId,
    /// Monotonic height.
    pub number: u64,
    pub epoch_num: EpochNum,
    pub round_num: Round,
    /// Votes that finalized the predecessor; slot `i` belongs to voter `i`
    /// of the epoch, absent voters are `None`.
    pub prev_votes: Vec<Option<Vote>>,
    pub kind: DataKind,
}

impl Data {
    pub fn is_real(&self) -> bool {
        self.kind == DataKind::Real
    }

    pub fn is_none(&self) -> bool {
        self.kind == DataKind::None
    }

    pub fn is_lazy(&self) -> bool {
        self.kind == DataKind::Lazy
    }
}

/// Creates proposals and placeholders. Implementations own identity
/// derivation; signing happens outside this crate.
pub trait DataFactory {
    /// A genuine proposal extending the candidate.
    fn create_data(
        &self,
        number: u64,
        prev_id: Option<DataId>,
        epoch_num: EpochNum,
        round_num: Round,
        prev_votes: Vec<Option<Vote>>,
    ) -> Data;

    /// The canonical NONE placeholder for a round's proposer.
    fn create_none_data(&self, epoch_num: EpochNum, round_num: Round, proposer_id: NodeId)
        -> Data;

    /// The canonical LAZY placeholder for a round's proposer.
    fn create_lazy_data(&self, epoch_num: EpochNum, round_num: Round, proposer_id: NodeId)
        -> Data;

    /// A fresh verifier for the upcoming round.
    fn create_verifier(&self) -> Box<dyn DataVerifier>;
}

/// External validity check for proposals. Structural checks (parent, height,
/// proposer) live in the layers; this is the payload-semantic hook.
#[cfg_attr(test, mockall::automock)]
pub trait DataVerifier {
    fn verify(&self, data: &Data) -> Result<(), ConsensusError>;
}

/// Factory whose ids are digests of the identity fields, so identical
/// content yields identical ids on every node.
#[derive(Debug, Clone)]
pub struct DefaultDataFactory {
    node_id: NodeId,
}

impl DefaultDataFactory {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

// prev_votes are deliberately excluded from the digest: a proposal's
// identity is its position in the chain, which lets a node that learns of it
// second-hand derive the same id.
fn derive_id(
    kind: DataKind,
    proposer_id: NodeId,
    number: u64,
    epoch_num: EpochNum,
    round_num: Round,
    prev_id: Option<DataId>,
) -> DataId {
    let mut hasher = DefaultHasher::new();
    ("data", kind, proposer_id, number, epoch_num, round_num, prev_id).hash(&mut hasher);
    DataId(hasher.finish())
}

impl DataFactory for DefaultDataFactory {
    fn create_data(
        &self,
        number: u64,
        prev_id: Option<DataId>,
        epoch_num: EpochNum,
        round_num: Round,
        prev_votes: Vec<Option<Vote>>,
    ) -> Data {
        Data {
            id: derive_id(DataKind::Real, self.node_id, number, epoch_num, round_num, prev_id),
            prev_id,
            proposer_id: self.node_id,
            number,
            epoch_num,
            round_num,
            prev_votes,
            kind: DataKind::Real,
        }
    }

    fn create_none_data(
        &self,
        epoch_num: EpochNum,
        round_num: Round,
        proposer_id: NodeId,
    ) -> Data {
        Data {
            id: derive_id(DataKind::None, proposer_id, 0, epoch_num, round_num, None),
            prev_id: None,
            proposer_id,
            number: 0,
            epoch_num,
            round_num,
            prev_votes: Vec::new(),
            kind: DataKind::None,
        }
    }

    fn create_lazy_data(
        &self,
        epoch_num: EpochNum,
        round_num: Round,
        proposer_id: NodeId,
    ) -> Data {
        Data {
            id: derive_id(DataKind::Lazy, proposer_id, 0, epoch_num, round_num, None),
            prev_id: None,
            proposer_id,
            number: 0,
            epoch_num,
            round_num,
            prev_votes: Vec::new(),
            kind: DataKind::Lazy,
        }
    }

    fn create_verifier(&self) -> Box<dyn DataVerifier> {
        Box::new(DefaultDataVerifier)
    }
}

/// Verifier for payload-free data: everything structurally sound passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDataVerifier;

impl DataVerifier for DefaultDataVerifier {
    fn verify(&self, _data: &Data) -> Result<(), ConsensusError> {
        Ok(())
    }
}
