//! Wrappers around non-deterministic side effects.
//!
//! Each mediator has three executors sharing one `execute` surface: Instant
//! (live), Recorder (live plus a log of every output), and Replayer (outputs
//! come from the log). Consumers never observe which mode is active.

pub mod delayed;
pub mod timestamp;

pub use delayed::DelayedEventMediator;
pub use timestamp::TimestampEventMediator;
