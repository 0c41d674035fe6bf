//! Timer mediator: schedules events to be raised after a delay.
//!
//! This is the only owner of timers in the system. The dispatch loop polls
//! [`DelayedEventMediator::next_fired`], so timer fires are serialized with
//! event dispatch and never race a running handler.

#[cfg(test)]
#[path = "delayed_test.rs"]
mod delayed_test;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{BufReader, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;

use crate::event::RecordableEvent;
use crate::record::{RecordReader, RecordWriter};

/// A scheduled event, recorded while pending so a replayed run can validate
/// that the same timers were armed in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "E: serde::Serialize", deserialize = "E: serde::de::DeserializeOwned"))]
pub struct PendingEntry<E> {
    /// Requested delay, in seconds.
    pub delay_secs: f64,
    /// The event to raise once the delay elapses.
    pub event: E,
}

/// An armed timer. Ordered by ascending deadline, ties broken by arming
/// order, so equal deadlines fire deterministically.
#[derive(Debug)]
struct TimerEntry<E> {
    deadline: Instant,
    seq: u64,
    event: E,
}

impl<E> PartialEq for TimerEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<E> Eq for TimerEntry<E> {}

impl<E> PartialOrd for TimerEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for TimerEntry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted so the BinaryHeap pops the earliest entry first.
        other.deadline.cmp(&self.deadline).then_with(|| other.seq.cmp(&self.seq))
    }
}

enum DelayedExecutor {
    Instant,
    Recorder(RecordWriter<Box<dyn Write>>),
    Replayer(RecordReader<BufReader<Box<dyn Read>>>),
}

struct DelayedInner<E> {
    executor: DelayedExecutor,
    timers: BinaryHeap<TimerEntry<E>>,
    // Timers cancelled by a pause, with their remaining delays, in firing
    // order. Re-armed on resume.
    frozen: Vec<(Duration, E)>,
    next_seq: u64,
}

impl<E> DelayedInner<E> {
    fn arm(&mut self, delay: Duration, event: E) {
        let entry = TimerEntry { deadline: Instant::now() + delay, seq: self.next_seq, event };
        self.next_seq += 1;
        self.timers.push(entry);
    }
}

/// Cheap-clone handle to the timer mediator.
pub struct DelayedEventMediator<E> {
    inner: Rc<RefCell<DelayedInner<E>>>,
}

impl<E> Clone for DelayedEventMediator<E> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<E: RecordableEvent> DelayedEventMediator<E> {
    pub(crate) fn new() -> Self {
        let inner = DelayedInner {
            executor: DelayedExecutor::Instant,
            timers: BinaryHeap::new(),
            frozen: Vec::new(),
            next_seq: 0,
        };
        Self { inner: Rc::new(RefCell::new(inner)) }
    }

    pub(crate) fn set_recorder(&self, sink: Box<dyn Write>) {
        self.inner.borrow_mut().executor = DelayedExecutor::Recorder(RecordWriter::new(sink));
    }

    pub(crate) fn set_replayer(&self, source: Box<dyn Read>) {
        self.inner.borrow_mut().executor =
            DelayedExecutor::Replayer(RecordReader::new(BufReader::new(source)));
    }

    /// Schedule `event` to be raised after `delay`.
    ///
    /// Under record the pending entry is also logged. Under replay no timer
    /// is armed: the call consumes the next logged entry and validates it
    /// against this request (the event itself is delivered from the event
    /// log at its recorded position). A divergence is fatal.
    pub fn execute(&self, delay: Duration, event: E) {
        trace!(kind = %event.kind(), ?delay, "scheduling delayed event");
        let mut inner = self.inner.borrow_mut();
        match &mut inner.executor {
            DelayedExecutor::Instant => {}
            DelayedExecutor::Recorder(writer) => {
                let pending = PendingEntry { delay_secs: delay.as_secs_f64(), event: event.clone() };
                writer
                    .write_value(&event.kind().to_string(), &pending)
                    .expect("delayed mediator record sink failed");
            }
            DelayedExecutor::Replayer(reader) => {
                let entry = reader
                    .next_entry()
                    .unwrap_or_else(|e| panic!("delayed mediator replay failed: {e}"))
                    .unwrap_or_else(|| {
                        panic!("delayed mediator replay diverged: log exhausted at {event:?}")
                    });
                let recorded: PendingEntry<E> = entry
                    .decode(&event.kind().to_string())
                    .unwrap_or_else(|e| panic!("delayed mediator replay diverged: {e}"));
                assert_eq!(
                    recorded.event, event,
                    "delayed mediator replay diverged: scheduled event differs from the record"
                );
                return;
            }
        }
        inner.arm(delay, event);
    }

    /// Resolves when the earliest armed timer elapses, yielding its event.
    /// Pending forever while no timer is armed; the dispatch loop re-polls
    /// after every handler, which is the only place new timers appear.
    pub(crate) async fn next_fired(&self) -> E {
        loop {
            let deadline = self.inner.borrow().timers.peek().map(|entry| entry.deadline);
            match deadline {
                Some(deadline) => {
                    tokio::time::sleep_until(deadline).await;
                    if let Some(event) = self.try_pop_due() {
                        return event;
                    }
                }
                None => futures::future::pending::<()>().await,
            }
        }
    }

    /// Pop the earliest timer if it is already due.
    pub(crate) fn try_pop_due(&self) -> Option<E> {
        let mut inner = self.inner.borrow_mut();
        let due = inner.timers.peek().is_some_and(|entry| entry.deadline <= Instant::now());
        if due {
            Some(inner.timers.pop().expect("peeked entry must pop").event)
        } else {
            None
        }
    }

    /// Cancel pending timers but retain them, with their remaining delays,
    /// for a later [`resume`](Self::resume).
    pub(crate) fn pause(&self) {
        let mut inner = self.inner.borrow_mut();
        let now = Instant::now();
        while let Some(entry) = inner.timers.pop() {
            let remaining = entry.deadline.saturating_duration_since(now);
            inner.frozen.push((remaining, entry.event));
        }
    }

    /// Re-arm timers retained by a pause, relative to the current clock
    /// origin. Relative firing order is preserved.
    pub(crate) fn resume(&self) {
        let mut inner = self.inner.borrow_mut();
        let frozen = std::mem::take(&mut inner.frozen);
        for (remaining, event) in frozen {
            inner.arm(remaining, event);
        }
    }

    /// Drop every pending and retained timer.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.timers.clear();
        inner.frozen.clear();
    }

    /// Number of armed timers (paused ones included).
    pub fn pending_len(&self) -> usize {
        let inner = self.inner.borrow();
        inner.timers.len() + inner.frozen.len()
    }
}
