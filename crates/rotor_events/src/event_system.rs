//! The dispatcher: a single-task loop multiplexing the event queue and the
//! timer mediator, with live, record, and replay drivers.

#[cfg(test)]
#[path = "event_system_test.rs"]
mod event_system_test;

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::rc::Rc;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::StreamExt;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::event::{EventHandler, RecordableEvent};
use crate::mediators::delayed::DelayedEventMediator;
use crate::mediators::timestamp::TimestampEventMediator;
use crate::record::{RecordError, RecordReader, RecordWriter};

/// Errors which stop the dispatch loop. Anything here is fatal to the run.
#[derive(thiserror::Error, Debug)]
pub enum EventSystemError {
    /// The record sink or replay source failed, or replay diverged.
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Cheap-clone handle for enqueueing events. Enqueueing never re-enters the
/// dispatch loop; the event lands behind everything already queued.
pub struct EventSender<E>(mpsc::UnboundedSender<E>);

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E: RecordableEvent> EventSender<E> {
    /// Enqueue an event. Raising after the system closed is a no-op.
    pub fn raise(&self, event: E) {
        if self.0.unbounded_send(event).is_err() {
            debug!("event raised after the event system closed; dropped");
        }
    }
}

/// Requests the dispatch loop to pause at the next event boundary. Pending
/// timers are frozen with their remaining delays and re-armed when the loop
/// runs again.
#[derive(Clone)]
pub struct StopHandle(Arc<Notify>);

impl StopHandle {
    /// Request the pause. Takes effect before the next event is dequeued.
    pub fn stop(&self) {
        self.0.notify_one();
    }
}

/// Where a recording run writes its streams.
pub struct RecordSinks {
    /// Every event, in dispatch order.
    pub events: Box<dyn Write>,
    /// Pending entries of the delayed mediator.
    pub delayed: Box<dyn Write>,
    /// Outputs of the timestamp mediator.
    pub timestamps: Box<dyn Write>,
}

/// Where a replaying run reads the streams recorded by [`RecordSinks`].
pub struct ReplaySources {
    #[allow(missing_docs)]
    pub events: Box<dyn Read>,
    #[allow(missing_docs)]
    pub delayed: Box<dyn Read>,
    #[allow(missing_docs)]
    pub timestamps: Box<dyn Read>,
}

enum Driver {
    Live,
    Record(RecordWriter<Box<dyn Write>>),
    Replay(RecordReader<BufReader<Box<dyn Read>>>),
}

/// Single-threaded cooperative event dispatcher.
///
/// Handlers for one event are awaited in registration order before the next
/// event is dequeued, so each handler observes a stable snapshot of state.
pub struct EventSystem<E: RecordableEvent> {
    sender: EventSender<E>,
    receiver: mpsc::UnboundedReceiver<E>,
    handlers: HashMap<E::Kind, Vec<EventHandler<E>>>,
    delayed: DelayedEventMediator<E>,
    timestamp: TimestampEventMediator,
    driver: Driver,
    stop: Arc<Notify>,
    paused: bool,
}

impl<E: RecordableEvent> Default for EventSystem<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RecordableEvent> EventSystem<E> {
    /// A live event system against the real clock.
    pub fn new() -> Self {
        Self::with_clock(Rc::new(SystemClock))
    }

    /// Build against an explicit clock (tests inject a fake here).
    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        let (sender, receiver) = mpsc::unbounded();
        Self {
            sender: EventSender(sender),
            receiver,
            handlers: HashMap::new(),
            delayed: DelayedEventMediator::new(),
            timestamp: TimestampEventMediator::new(clock),
            driver: Driver::Live,
            stop: Arc::new(Notify::new()),
            paused: false,
        }
    }

    /// Register a handler for one event kind. Multiple handlers per kind are
    /// invoked in registration order.
    pub fn register_handler(&mut self, kind: E::Kind, handler: EventHandler<E>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// A handle for enqueueing events from handlers or other components.
    pub fn sender(&self) -> EventSender<E> {
        self.sender.clone()
    }

    /// Enqueue an event onto the FIFO queue.
    pub fn raise_event(&self, event: E) {
        self.sender.raise(event);
    }

    /// Handle to the timer mediator.
    pub fn delayed_mediator(&self) -> DelayedEventMediator<E> {
        self.delayed.clone()
    }

    /// Handle to the wall-clock mediator.
    pub fn timestamp_mediator(&self) -> TimestampEventMediator {
        self.timestamp.clone()
    }

    /// A handle for pausing the dispatch loop from outside it.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Record every dispatched event and every mediator output to `sinks`.
    /// Must be called before the first run.
    pub fn start_record(&mut self, sinks: RecordSinks) {
        assert!(
            matches!(self.driver, Driver::Live),
            "record/replay must be configured on a fresh event system"
        );
        self.driver = Driver::Record(RecordWriter::new(sinks.events));
        self.delayed.set_recorder(sinks.delayed);
        self.timestamp.set_recorder(sinks.timestamps);
    }

    /// Rebuild the event stream from a recorded log and force mediators to
    /// return recorded values. Must be called before the first run.
    pub fn start_replay(&mut self, sources: ReplaySources) {
        assert!(
            matches!(self.driver, Driver::Live),
            "record/replay must be configured on a fresh event system"
        );
        self.driver = Driver::Replay(RecordReader::new(BufReader::new(sources.events)));
        self.delayed.set_replayer(sources.delayed);
        self.timestamp.set_replayer(sources.timestamps);
    }

    /// Drive dispatch until stopped. A replay run instead consumes the event
    /// log to its end and returns.
    pub async fn run(&mut self) -> Result<(), EventSystemError> {
        if self.paused {
            self.delayed.resume();
            self.paused = false;
        }
        if matches!(self.driver, Driver::Replay(_)) {
            while let Some(event) = self.next_replay_event()? {
                self.dispatch(event).await;
            }
            return Ok(());
        }
        let stop = Arc::clone(&self.stop);
        let delayed = self.delayed.clone();
        loop {
            let next = tokio::select! {
                // Deterministic priority: stop requests, then queued events,
                // then due timers.
                biased;
                _ = stop.notified() => None,
                event = self.receiver.next() => {
                    Some(event.expect("event queue closed while the system holds a sender"))
                }
                event = delayed.next_fired() => Some(event),
            };
            match next {
                Some(event) => self.process(event).await?,
                None => {
                    self.delayed.pause();
                    self.paused = true;
                    return Ok(());
                }
            }
        }
    }

    /// Dispatch every queued event and every already-due timer, returning the
    /// number of events processed. A replay run consumes the log to its end.
    pub async fn run_until_idle(&mut self) -> Result<usize, EventSystemError> {
        if self.paused {
            self.delayed.resume();
            self.paused = false;
        }
        let mut processed = 0;
        if matches!(self.driver, Driver::Replay(_)) {
            while let Some(event) = self.next_replay_event()? {
                self.dispatch(event).await;
                processed += 1;
            }
            return Ok(processed);
        }
        loop {
            if let Ok(Some(event)) = self.receiver.try_next() {
                self.process(event).await?;
                processed += 1;
                continue;
            }
            if let Some(event) = self.delayed.try_pop_due() {
                self.process(event).await?;
                processed += 1;
                continue;
            }
            return Ok(processed);
        }
    }

    /// Cancel all timers and drop all handlers. The system is inert after
    /// this; raising events becomes a no-op once the queue drains.
    pub fn close(&mut self) {
        self.delayed.close();
        self.handlers.clear();
        self.receiver.close();
    }

    async fn process(&mut self, event: E) -> Result<(), EventSystemError> {
        if let Driver::Record(writer) = &mut self.driver {
            writer.write_value(&event.kind().to_string(), &event)?;
        }
        self.dispatch(event).await;
        Ok(())
    }

    async fn dispatch(&mut self, event: E) {
        trace!(
            kind = %event.kind(),
            deterministic = event.deterministic(),
            "dispatching {event:?}"
        );
        let Some(handlers) = self.handlers.get_mut(&event.kind()) else {
            return;
        };
        for handler in handlers.iter_mut() {
            handler(event.clone()).await;
        }
    }

    fn next_replay_event(&mut self) -> Result<Option<E>, EventSystemError> {
        let Driver::Replay(reader) = &mut self.driver else {
            unreachable!("replay driver checked by callers");
        };
        let Some(entry) = reader.next_entry()? else {
            return Ok(None);
        };
        let number = entry.number;
        let tag = entry.type_tag.clone();
        let event: E = entry.decode(&tag)?;
        if event.kind().to_string() != tag {
            return Err(RecordError::TagMismatch {
                number,
                wanted: event.kind().to_string(),
                found: tag,
            }
            .into());
        }
        Ok(Some(event))
    }
}
