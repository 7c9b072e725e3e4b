use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::*;
use rand_pcg::Pcg64;
use rustc_hash::FxHashMap;

use crate::component::Id;
use crate::error::SimulationError;
use crate::event::{Event, EventData, EventId};
use crate::log::log_incorrect_event;

/// Epsilon to compare floating point values for equality.
pub const EPSILON: f64 = 1e-12;

// Heap key of a pending event. The event record itself lives in the arena.
#[derive(Clone, Copy)]
struct EventKey {
    time: f64,
    id: EventId,
}

impl Eq for EventKey {}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Inverted so that BinaryHeap pops the earliest event, FIFO among equal timestamps.
impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct SimulationState {
    clock: f64,
    rand: Pcg64,
    keys: BinaryHeap<EventKey>,
    // Arena of pending events addressed by handle. Cancellation removes the record,
    // the orphaned heap key is skipped when it reaches the top.
    events: FxHashMap<EventId, Event>,
    event_count: u64,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.0,
            rand: Pcg64::seed_from_u64(seed),
            keys: BinaryHeap::new(),
            events: FxHashMap::default(),
            event_count: 0,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn add_event<T>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> EventId
    where
        T: EventData,
    {
        if delay >= -EPSILON {
            self.push(data, src, dst, self.clock + delay.max(0.))
        } else {
            let event = Event {
                id: self.event_count,
                time: self.clock + delay,
                src,
                dst,
                data: Box::new(data),
            };
            log_incorrect_event(event, &format!("negative delay {}", delay));
            panic!("Event delay is negative! It is not allowed to add events from the past.");
        }
    }

    pub fn add_event_at<T>(&mut self, data: T, src: Id, dst: Id, time: f64) -> Result<EventId, SimulationError>
    where
        T: EventData,
    {
        if time < self.clock - EPSILON {
            return Err(SimulationError::InvalidTime {
                time,
                clock: self.clock,
            });
        }
        // max is used to keep the clock monotonic despite the floating-point errors
        Ok(self.push(data, src, dst, time.max(self.clock)))
    }

    fn push<T>(&mut self, data: T, src: Id, dst: Id, time: f64) -> EventId
    where
        T: EventData,
    {
        let id = self.event_count;
        self.keys.push(EventKey { time, id });
        self.events.insert(
            id,
            Event {
                id,
                time,
                src,
                dst,
                data: Box::new(data),
            },
        );
        self.event_count += 1;
        id
    }

    pub fn next_event(&mut self) -> Option<Event> {
        while let Some(key) = self.keys.pop() {
            if let Some(event) = self.events.remove(&key.id) {
                self.clock = event.time;
                return Some(event);
            }
        }
        None
    }

    pub fn peek_event(&mut self) -> Option<&Event> {
        while let Some(key) = self.keys.peek() {
            if self.events.contains_key(&key.id) {
                return self.events.get(&key.id);
            }
            self.keys.pop();
        }
        None
    }

    pub fn cancel_event(&mut self, id: EventId) -> bool {
        self.events.remove(&id).is_some()
    }

    pub fn cancel_events<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        let before = self.events.len();
        self.events.retain(|_, event| !pred(event));
        before - self.events.len()
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}
