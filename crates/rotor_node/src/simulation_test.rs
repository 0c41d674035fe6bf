//! Discrete event simulation over a jittery network.
//!
//! Messages between nodes are delivered with random per-recipient delays
//! drawn from a seeded RNG, using a timeline-based event queue. Regardless
//! of the delivery order, every node must decide the same candidate for
//! round 0.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rotor_consensus::events::{ConsensusEvent, ConsensusEventKind};
use rotor_consensus::message::{Data, Vote};
use rotor_consensus::types::{DataId, NodeId};
use test_case::test_case;

use super::Node;
use crate::registry::NodeRegistry;

const VOTERS: [NodeId; 4] = [NodeId(0xa), NodeId(0xb), NodeId(0xc), NodeId(0xd)];
const MAX_DELAY_MS: u64 = 800;
const DEADLINE_MS: u64 = 10_000;

#[derive(Debug, Clone)]
enum Delivery {
    Data(Data),
    Vote(Vote),
}

/// A delivery scheduled on the timeline, ordered by ascending tick; ties
/// break by scheduling order so the heap stays deterministic.
#[derive(Debug)]
struct TimedDelivery {
    tick_ms: u64,
    seq: u64,
    target: usize,
    delivery: Delivery,
}

impl PartialEq for TimedDelivery {
    fn eq(&self, other: &Self) -> bool {
        self.tick_ms == other.tick_ms && self.seq == other.seq
    }
}

impl Eq for TimedDelivery {}

impl PartialOrd for TimedDelivery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedDelivery {
    fn cmp(&self, other: &Self) -> Ordering {
        other.tick_ms.cmp(&self.tick_ms).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Simulation {
    rng: StdRng,
    seed: u64,
    nodes: Vec<Node>,
    outboxes: Vec<Rc<RefCell<Vec<ConsensusEvent>>>>,
    // How much of each outbox has already been turned into deliveries.
    cursors: Vec<usize>,
    timeline: BinaryHeap<TimedDelivery>,
    now_ms: u64,
    next_seq: u64,
}

impl Simulation {
    fn new(seed: u64) -> Self {
        let registry = NodeRegistry::new();
        // No gossip mesh: the simulation owns delivery.
        let mut nodes: Vec<Node> =
            VOTERS.iter().map(|&id| Node::new(id, registry.clone())).collect();
        let outboxes = nodes
            .iter_mut()
            .map(|node| {
                node.observe_events(&[
                    ConsensusEventKind::BroadcastData,
                    ConsensusEventKind::BroadcastVote,
                    ConsensusEventKind::RoundEnd,
                ])
            })
            .collect();
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            nodes,
            outboxes,
            cursors: vec![0; VOTERS.len()],
            timeline: BinaryHeap::new(),
            now_ms: 0,
            next_seq: 0,
        }
    }

    async fn settle_and_collect(&mut self) {
        loop {
            let mut total = 0;
            for node in &mut self.nodes {
                total += node.pump().await.unwrap();
            }
            if total == 0 {
                break;
            }
        }
        for index in 0..self.nodes.len() {
            let fresh: Vec<ConsensusEvent> = {
                let outbox = self.outboxes[index].borrow();
                let fresh = outbox.iter().skip(self.cursors[index]).cloned().collect();
                self.cursors[index] = outbox.len();
                fresh
            };
            for event in fresh {
                match event {
                    ConsensusEvent::BroadcastData(event) => {
                        self.schedule_to_peers(index, Delivery::Data(event.data));
                    }
                    ConsensusEvent::BroadcastVote(event) => {
                        self.schedule_to_peers(index, Delivery::Vote(event.vote));
                    }
                    _ => {}
                }
            }
        }
    }

    fn schedule_to_peers(&mut self, from: usize, delivery: Delivery) {
        for target in 0..self.nodes.len() {
            if target == from {
                continue;
            }
            let delay_ms = self.rng.gen_range(10..=MAX_DELAY_MS);
            self.timeline.push(TimedDelivery {
                tick_ms: self.now_ms + delay_ms,
                seq: self.next_seq,
                target,
                delivery: delivery.clone(),
            });
            self.next_seq += 1;
        }
    }

    fn all_decided_round_zero(&self) -> bool {
        self.outboxes.iter().all(|outbox| {
            outbox.borrow().iter().any(|event| {
                matches!(event, ConsensusEvent::RoundEnd(end) if end.round_num == 0)
            })
        })
    }

    fn round_zero_candidates(&self) -> Vec<Option<DataId>> {
        self.outboxes
            .iter()
            .map(|outbox| {
                outbox
                    .borrow()
                    .iter()
                    .find_map(|event| match event {
                        ConsensusEvent::RoundEnd(end) if end.round_num == 0 => {
                            Some(end.candidate_id)
                        }
                        _ => None,
                    })
                    .expect("every node decided round 0")
            })
            .collect()
    }
}

#[test_case(7)]
#[test_case(42)]
#[test_case(1337)]
#[test_case(2024)]
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn jittered_delivery_converges(seed: u64) {
    let mut sim = Simulation::new(seed);
    for node in &sim.nodes {
        node.initialize(0, 0, VOTERS.to_vec(), None);
    }
    sim.settle_and_collect().await;

    while !sim.all_decided_round_zero() && sim.now_ms < DEADLINE_MS {
        let Some(next) = sim.timeline.pop() else {
            // Nothing in flight: jump to the next timer (timeouts keep the
            // protocol live even when the network goes quiet).
            tokio::time::advance(Duration::from_millis(100)).await;
            sim.now_ms += 100;
            sim.settle_and_collect().await;
            continue;
        };
        if next.tick_ms > sim.now_ms {
            tokio::time::advance(Duration::from_millis(next.tick_ms - sim.now_ms)).await;
            sim.now_ms = next.tick_ms;
        }
        match next.delivery {
            Delivery::Data(data) => sim.nodes[next.target].receive_data(data),
            Delivery::Vote(vote) => sim.nodes[next.target].receive_vote(vote),
        }
        sim.settle_and_collect().await;
    }

    assert!(
        sim.all_decided_round_zero(),
        "seed {}: network failed to decide round 0 within {DEADLINE_MS}ms",
        sim.seed
    );
    let candidates = sim.round_zero_candidates();
    assert!(
        candidates.windows(2).all(|pair| pair[0] == pair[1]),
        "seed {}: nodes disagree on round 0: {candidates:?}",
        sim.seed
    );
}
