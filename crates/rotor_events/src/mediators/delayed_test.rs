use std::cell::RefCell;
use std::io::{Cursor, Write};
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use strum::EnumDiscriminants;

use super::{DelayedEventMediator, PendingEntry};
use crate::event::RecordableEvent;
use crate::record::RecordReader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(TickKind), derive(Hash, strum::Display))]
enum Tick {
    At(u32),
}

impl RecordableEvent for Tick {
    type Kind = TickKind;

    fn kind(&self) -> TickKind {
        self.into()
    }

    fn deterministic(&self) -> bool {
        false
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn equal_deadlines_fire_in_arming_order() {
    let mediator: DelayedEventMediator<Tick> = DelayedEventMediator::new();
    mediator.execute(Duration::from_secs(1), Tick::At(1));
    mediator.execute(Duration::from_secs(1), Tick::At(2));
    mediator.execute(Duration::from_millis(500), Tick::At(3));

    assert_eq!(mediator.try_pop_due(), None);
    tokio::time::advance(Duration::from_secs(1)).await;

    assert_eq!(mediator.try_pop_due(), Some(Tick::At(3)));
    assert_eq!(mediator.try_pop_due(), Some(Tick::At(1)));
    assert_eq!(mediator.try_pop_due(), Some(Tick::At(2)));
    assert_eq!(mediator.try_pop_due(), None);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn pause_retains_remaining_delay_and_resume_rearms() {
    let mediator: DelayedEventMediator<Tick> = DelayedEventMediator::new();
    mediator.execute(Duration::from_secs(2), Tick::At(1));
    tokio::time::advance(Duration::from_secs(1)).await;

    mediator.pause();
    // Wall-clock time passing while paused must not consume the delay.
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(mediator.try_pop_due(), None);
    assert_eq!(mediator.pending_len(), 1);

    mediator.resume();
    assert_eq!(mediator.try_pop_due(), None);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(mediator.try_pop_due(), Some(Tick::At(1)));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn next_fired_yields_the_earliest_timer() {
    let mediator: DelayedEventMediator<Tick> = DelayedEventMediator::new();
    mediator.execute(Duration::from_secs(3), Tick::At(30));
    mediator.execute(Duration::from_secs(1), Tick::At(10));

    // Paused-clock runtimes auto-advance when every task is sleeping.
    assert_eq!(mediator.next_fired().await, Tick::At(10));
    assert_eq!(mediator.next_fired().await, Tick::At(30));
}

#[test]
fn recorder_logs_pending_entries() {
    let sink = SharedBuf::default();
    let _rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
    let _guard = _rt.enter();

    let mediator: DelayedEventMediator<Tick> = DelayedEventMediator::new();
    mediator.set_recorder(Box::new(sink.clone()));
    mediator.execute(Duration::from_millis(1500), Tick::At(9));

    let mut reader = RecordReader::new(Cursor::new(sink.contents()));
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.number, 0);
    assert_eq!(entry.type_tag, "At");
    let pending: PendingEntry<Tick> = entry.decode("At").unwrap();
    assert_eq!(pending, PendingEntry { delay_secs: 1.5, event: Tick::At(9) });
    // Recording still arms the live timer.
    assert_eq!(mediator.pending_len(), 1);
}

#[test]
fn replayer_consumes_matching_entries_without_arming_timers() {
    let log = concat!(
        r#"{"number":0,"type":"At","contents":{"delay_secs":2.0,"event":{"At":1}}}"#,
        "\n",
    );
    let mediator: DelayedEventMediator<Tick> = DelayedEventMediator::new();
    mediator.set_replayer(Box::new(Cursor::new(log)));

    mediator.execute(Duration::from_secs(2), Tick::At(1));
    assert_eq!(mediator.pending_len(), 0);
}

#[test]
#[should_panic(expected = "replay diverged")]
fn replayer_panics_on_divergent_event() {
    let log = concat!(
        r#"{"number":0,"type":"At","contents":{"delay_secs":2.0,"event":{"At":1}}}"#,
        "\n",
    );
    let mediator: DelayedEventMediator<Tick> = DelayedEventMediator::new();
    mediator.set_replayer(Box::new(Cursor::new(log)));

    mediator.execute(Duration::from_secs(2), Tick::At(999));
}

#[test]
#[should_panic(expected = "log exhausted")]
fn replayer_panics_when_the_log_runs_dry() {
    let mediator: DelayedEventMediator<Tick> = DelayedEventMediator::new();
    mediator.set_replayer(Box::new(Cursor::new(Vec::new())));

    mediator.execute(Duration::from_secs(1), Tick::At(1));
}
