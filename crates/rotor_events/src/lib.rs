#![warn(missing_docs)]
//! Single-threaded cooperative event dispatch with deterministic replay.
//!
//! An [`EventSystem`](event_system::EventSystem) dequeues events one at a time
//! and awaits every registered handler for the event's kind, in registration
//! order, before moving on. Handlers enqueue follow-up events through an
//! [`EventSender`](event_system::EventSender); enqueueing never re-enters the
//! dispatch loop.
//!
//! Non-deterministic side effects (timers, wall-clock reads) are reached
//! exclusively through [mediators](mediators). Each mediator runs in one of
//! three modes: live, recording (live plus a log of every output), or
//! replaying (outputs come from the log instead of the real side effect).
//! Together with the event log this makes a recorded run reproducible
//! bit-for-bit.

pub mod clock;
#[allow(missing_docs)]
pub mod event;
pub mod event_system;
pub mod mediators;
pub mod record;

pub use event::{EventHandler, HandlerFuture, RecordableEvent};
pub use event_system::{
    EventSender,
    EventSystem,
    EventSystemError,
    RecordSinks,
    ReplaySources,
    StopHandle,
};
