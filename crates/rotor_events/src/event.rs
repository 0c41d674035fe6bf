use std::fmt::{Debug, Display};
use std::hash::Hash;

use futures::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A combination of trait bounds needed for anything that flows through the
/// dispatcher and its record log.
pub trait RecordableEvent:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + 'static
{
    /// Discriminant used for handler registration and as the record type tag.
    type Kind: Copy + Eq + Hash + Debug + Display;

    fn kind(&self) -> Self::Kind;

    /// Whether the event is produced by deterministic control flow. Events
    /// injected through mediators (e.g. timer fires) are non-deterministic;
    /// replay reconstructs them from the log rather than from a live timer.
    fn deterministic(&self) -> bool;
}

/// Future returned by an event handler.
pub type HandlerFuture = LocalBoxFuture<'static, ()>;

/// An event handler. Handlers for one event are awaited to completion, in
/// registration order, before the next event is dequeued.
pub type EventHandler<E> = Box<dyn FnMut(E) -> HandlerFuture>;
