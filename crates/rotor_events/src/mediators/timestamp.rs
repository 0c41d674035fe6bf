//! Wall-clock mediator: reads the current time through the record/replay
//! seam, so timestamps observed in a replayed run match the original run
//! exactly.

#[cfg(test)]
#[path = "timestamp_test.rs"]
mod timestamp_test;

use std::cell::RefCell;
use std::io::{BufReader, Read, Write};
use std::rc::Rc;

use crate::clock::Clock;
use crate::record::{RecordReader, RecordWriter};

/// Record type tag for timestamp outputs.
pub const TIMESTAMP_TAG: &str = "timestamp";

enum TimestampExecutor {
    Instant,
    Recorder(RecordWriter<Box<dyn Write>>),
    Replayer(RecordReader<BufReader<Box<dyn Read>>>),
}

struct TimestampInner {
    clock: Rc<dyn Clock>,
    executor: TimestampExecutor,
}

/// Cheap-clone handle to the wall-clock mediator.
#[derive(Clone)]
pub struct TimestampEventMediator {
    inner: Rc<RefCell<TimestampInner>>,
}

impl TimestampEventMediator {
    pub(crate) fn new(clock: Rc<dyn Clock>) -> Self {
        let inner = TimestampInner { clock, executor: TimestampExecutor::Instant };
        Self { inner: Rc::new(RefCell::new(inner)) }
    }

    pub(crate) fn set_recorder(&self, sink: Box<dyn Write>) {
        self.inner.borrow_mut().executor = TimestampExecutor::Recorder(RecordWriter::new(sink));
    }

    pub(crate) fn set_replayer(&self, source: Box<dyn Read>) {
        self.inner.borrow_mut().executor =
            TimestampExecutor::Replayer(RecordReader::new(BufReader::new(source)));
    }

    /// Current wall-clock time in microseconds since the Unix epoch. Under
    /// record the value is also logged; under replay the logged value is
    /// returned instead of reading the clock. Log exhaustion is fatal.
    pub fn execute(&self) -> u64 {
        let mut borrow = self.inner.borrow_mut();
        let TimestampInner { clock, executor } = &mut *borrow;
        match executor {
            TimestampExecutor::Instant => clock.now_us(),
            TimestampExecutor::Recorder(writer) => {
                let now = clock.now_us();
                writer
                    .write_value(TIMESTAMP_TAG, &now)
                    .expect("timestamp mediator record sink failed");
                now
            }
            TimestampExecutor::Replayer(reader) => {
                let entry = reader
                    .next_entry()
                    .unwrap_or_else(|e| panic!("timestamp mediator replay failed: {e}"))
                    .unwrap_or_else(|| panic!("timestamp mediator replay diverged: log exhausted"));
                entry
                    .decode(TIMESTAMP_TAG)
                    .unwrap_or_else(|e| panic!("timestamp mediator replay diverged: {e}"))
            }
        }
    }
}
