//! Timing configuration for consensus.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts driving round liveness and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// How long a non-leader waits for a proposal before synthesizing a NONE
    /// datum for the round.
    #[serde(with = "duration_secs")]
    pub timeout_propose: Duration,
    /// How long to wait after first reaching vote quorum before injecting
    /// NONE votes on behalf of silent voters.
    #[serde(with = "duration_secs")]
    pub timeout_vote: Duration,
    /// Pause between a round ending and the next round starting.
    #[serde(with = "duration_secs")]
    pub round_start_delay: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            timeout_propose: Duration::from_secs_f64(2.0),
            timeout_vote: Duration::from_secs_f64(2.0),
            round_start_delay: Duration::from_secs_f64(0.5),
        }
    }
}

/// Float-second representation for durations in config files.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(missing_docs)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    #[allow(missing_docs)]
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        f64::deserialize(deserializer).map(Duration::from_secs_f64)
    }
}
