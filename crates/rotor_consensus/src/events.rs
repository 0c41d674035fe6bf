//! The event surface of consensus.
//!
//! Input events: `Initialize`, `ReceivedData`, `ReceivedVote`, `StartRound`,
//! `DoneRound`, `ReceivedConsensusData`, `ReceivedConsensusVote`.
//! Output events: `BroadcastData`, `BroadcastVote`, `ReceiveData`,
//! `ReceiveVote`, `ProposeSequence`, `VoteSequence`, `RoundEnd`, `DoneRound`.

use rotor_events::RecordableEvent;
use serde::{Deserialize, Serialize};
use strum::EnumDiscriminants;

use crate::message::data::Data;
use crate::message::vote::Vote;
use crate::types::{DataId, EpochNum, NodeId, Round};

/// Start the very first round of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeEvent {
    pub epoch_num: EpochNum,
    pub round_num: Round,
    pub voters: Vec<NodeId>,
    /// The latest decided data, if the node starts from existing state.
    pub candidate_data: Option<Data>,
}

/// Enter a new round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRoundEvent {
    pub epoch_num: EpochNum,
    pub round_num: Round,
    pub voters: Vec<NodeId>,
}

/// A round finished; `candidate_data` is present when a new candidate was
/// selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneRoundEvent {
    pub is_success: bool,
    pub epoch_num: EpochNum,
    pub round_num: Round,
    pub candidate_data: Option<Data>,
    pub commit_id: Option<DataId>,
}

/// A data message arrived at the node boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedDataEvent {
    pub data: Data,
}

/// A vote arrived at the node boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedVoteEvent {
    pub vote: Vote,
}

/// A data message admitted into the consensus pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedConsensusDataEvent {
    pub data: Data,
}

/// A vote admitted into the consensus pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedConsensusVoteEvent {
    pub vote: Vote,
}

/// A current-round data message, cleared for the decision core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposeSequenceEvent {
    pub data: Data,
}

/// A current-round vote, cleared for the decision core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSequenceEvent {
    pub vote: Vote,
}

/// Send a data message to the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastDataEvent {
    pub data: Data,
}

/// Send a vote to the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastVoteEvent {
    pub vote: Vote,
}

/// Loopback of a broadcast data message, so the node processes its own
/// messages uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveDataEvent {
    pub data: Data,
}

/// Loopback of a broadcast vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveVoteEvent {
    pub vote: Vote,
}

/// The round reached a determinative result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEndEvent {
    pub is_success: bool,
    pub epoch_num: EpochNum,
    pub round_num: Round,
    pub candidate_id: Option<DataId>,
    pub commit_id: Option<DataId>,
}

/// Every event a node's dispatcher can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(ConsensusEventKind), derive(Hash, strum::Display))]
pub enum ConsensusEvent {
    Initialize(InitializeEvent),
    StartRound(StartRoundEvent),
    DoneRound(DoneRoundEvent),
    ReceivedData(ReceivedDataEvent),
    ReceivedVote(ReceivedVoteEvent),
    ReceivedConsensusData(ReceivedConsensusDataEvent),
    ReceivedConsensusVote(ReceivedConsensusVoteEvent),
    ProposeSequence(ProposeSequenceEvent),
    VoteSequence(VoteSequenceEvent),
    BroadcastData(BroadcastDataEvent),
    BroadcastVote(BroadcastVoteEvent),
    ReceiveData(ReceiveDataEvent),
    ReceiveVote(ReceiveVoteEvent),
    RoundEnd(RoundEndEvent),
}

impl RecordableEvent for ConsensusEvent {
    type Kind = ConsensusEventKind;

    fn kind(&self) -> ConsensusEventKind {
        self.into()
    }

    fn deterministic(&self) -> bool {
        // These kinds can be injected by the delayed mediator (timeouts,
        // zero-delay re-enqueues, round pacing); replay reconstructs them
        // from the log rather than from live timers.
        !matches!(
            self.kind(),
            ConsensusEventKind::StartRound
                | ConsensusEventKind::ReceivedConsensusData
                | ConsensusEventKind::ReceivedConsensusVote
        )
    }
}

#[cfg(test)]
mod events_test {
    use pretty_assertions::assert_eq;
    use rotor_events::RecordableEvent;

    use super::{ConsensusEvent, StartRoundEvent, VoteSequenceEvent};
    use crate::test_utils::{none_vote_by, NODE_A};

    #[test]
    fn kind_tags_match_the_variant_names() {
        let event = ConsensusEvent::StartRound(StartRoundEvent {
            epoch_num: 0,
            round_num: 3,
            voters: vec![NODE_A],
        });
        assert_eq!(event.kind().to_string(), "StartRound");
    }

    #[test]
    fn mediator_injected_kinds_are_non_deterministic() {
        let start_round = ConsensusEvent::StartRound(StartRoundEvent {
            epoch_num: 0,
            round_num: 0,
            voters: vec![NODE_A],
        });
        assert!(!start_round.deterministic());

        let sequence =
            ConsensusEvent::VoteSequence(VoteSequenceEvent { vote: none_vote_by(NODE_A, 0) });
        assert!(sequence.deterministic());
    }

    #[test]
    fn events_roundtrip_through_their_record_encoding() {
        let event =
            ConsensusEvent::VoteSequence(VoteSequenceEvent { vote: none_vote_by(NODE_A, 2) });
        let encoded = serde_json::to_value(&event).unwrap();
        let decoded: ConsensusEvent = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, event);
    }
}
