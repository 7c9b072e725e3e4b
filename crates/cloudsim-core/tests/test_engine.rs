use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use cloudsim_core::{cast, Event, EventHandler, Id, Simulation, SimulationContext, SimulationError};

#[derive(Clone, Serialize)]
struct Tick {
    seq: u32,
}

#[derive(Clone, Serialize)]
struct Spawn {
    remaining: u32,
}

struct Recorder {
    received: Vec<(f64, u32)>,
    ctx: SimulationContext,
}

impl Recorder {
    fn new(ctx: SimulationContext) -> Self {
        Self {
            received: Vec::new(),
            ctx,
        }
    }
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Tick { seq } => {
                self.received.push((self.ctx.time(), seq));
            }
            Spawn { remaining } => {
                self.received.push((self.ctx.time(), remaining));
                if remaining > 0 {
                    // each handled event fans out into events with random delays, some of them zero
                    for _ in 0..2 {
                        let delay = if self.ctx.rand() < 0.2 {
                            0.
                        } else {
                            self.ctx.gen_range(0.0..10.0)
                        };
                        self.ctx.emit_self(
                            Spawn {
                                remaining: remaining - 1,
                            },
                            delay,
                        );
                    }
                }
            }
        })
    }
}

fn make_recorder(sim: &mut Simulation, name: &str) -> (Rc<RefCell<Recorder>>, Id) {
    let recorder = Rc::new(RefCell::new(Recorder::new(sim.create_context(name))));
    let id = sim.add_handler(name, recorder.clone());
    (recorder, id)
}

#[test]
fn test_equal_timestamps_are_delivered_in_creation_order() {
    let mut sim = Simulation::new(123);
    let (recorder, recorder_id) = make_recorder(&mut sim, "recorder");
    let mut client = sim.create_context("client");

    client.emit(Tick { seq: 0 }, recorder_id, 5.);
    client.emit(Tick { seq: 1 }, recorder_id, 1.);
    client.emit(Tick { seq: 2 }, recorder_id, 5.);
    client.emit(Tick { seq: 3 }, recorder_id, 1.);
    client.emit(Tick { seq: 4 }, recorder_id, 5.);
    sim.step_until_no_events();

    assert_eq!(
        recorder.borrow().received,
        vec![(1., 1), (1., 3), (5., 0), (5., 2), (5., 4)]
    );
    assert_eq!(sim.time(), 5.);
}

#[test]
fn test_clock_is_monotonic_for_random_workload() {
    let mut sim = Simulation::new(42);
    let (recorder, recorder_id) = make_recorder(&mut sim, "recorder");
    let mut client = sim.create_context("client");
    for _ in 0..3 {
        client.emit(Spawn { remaining: 8 }, recorder_id, 0.);
    }
    sim.step_until_no_events();

    let received = &recorder.borrow().received;
    // 3 roots, each a full binary tree of depth 8
    assert_eq!(received.len(), 3 * ((1 << 9) - 1));
    for pair in received.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "clock went back: {:?}", pair);
    }
    assert_eq!(sim.event_count(), received.len() as u64);
}

#[test]
fn test_identical_seeds_give_identical_runs() {
    let run = |seed: u64| {
        let mut sim = Simulation::new(seed);
        let (recorder, recorder_id) = make_recorder(&mut sim, "recorder");
        let mut client = sim.create_context("client");
        client.emit(Spawn { remaining: 6 }, recorder_id, 0.);
        sim.step_until_no_events();
        let received = recorder.borrow().received.clone();
        received
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn test_emit_at_rejects_past_time() {
    let mut sim = Simulation::new(123);
    let (_, recorder_id) = make_recorder(&mut sim, "recorder");
    let mut client = sim.create_context("client");
    client.emit(Tick { seq: 0 }, recorder_id, 3.);
    sim.step();
    assert_eq!(sim.time(), 3.);

    let result = client.emit_at(Tick { seq: 1 }, recorder_id, 2.);
    assert_eq!(result, Err(SimulationError::InvalidTime { time: 2., clock: 3. }));
    assert!(client.emit_at(Tick { seq: 2 }, recorder_id, 3.).is_ok());
    assert_eq!(sim.pending_event_count(), 1);
}

#[test]
#[should_panic(expected = "Event delay is negative")]
fn test_negative_delay_is_fatal() {
    let mut sim = Simulation::new(123);
    let mut client = sim.create_context("client");
    client.emit_self(Tick { seq: 0 }, -1.);
}

#[test]
fn test_cancelled_event_is_skipped() {
    let mut sim = Simulation::new(123);
    let (recorder, recorder_id) = make_recorder(&mut sim, "recorder");
    let mut client = sim.create_context("client");
    client.emit(Tick { seq: 0 }, recorder_id, 1.);
    let cancelled = client.emit(Tick { seq: 1 }, recorder_id, 2.);
    client.emit(Tick { seq: 2 }, recorder_id, 3.);

    assert!(client.cancel_event(cancelled));
    assert!(!client.cancel_event(cancelled));
    assert_eq!(sim.pending_event_count(), 2);
    sim.step_until_no_events();

    assert_eq!(recorder.borrow().received, vec![(1., 0), (3., 2)]);
    // cancelled events are still counted as created
    assert_eq!(sim.event_count(), 3);
}

#[test]
fn test_undelivered_event_does_not_stop_simulation() {
    let mut sim = Simulation::new(123);
    let (recorder, recorder_id) = make_recorder(&mut sim, "recorder");
    let mut client = sim.create_context("client");
    client.emit_self(Tick { seq: 0 }, 1.);
    client.emit(Tick { seq: 1 }, recorder_id, 2.);
    sim.step_until_no_events();

    assert_eq!(recorder.borrow().received, vec![(2., 1)]);
}

#[test]
fn test_step_until_time_leaves_later_events() {
    let mut sim = Simulation::new(123);
    let (recorder, recorder_id) = make_recorder(&mut sim, "recorder");
    let mut client = sim.create_context("client");
    for seq in 0..5 {
        client.emit(Tick { seq }, recorder_id, seq as f64);
    }
    assert!(sim.step_until_time(2.));
    assert_eq!(recorder.borrow().received.len(), 3);
    assert_eq!(sim.time(), 2.);
    assert_eq!(sim.pending_event_count(), 2);
    assert!(!sim.step_until_time(f64::INFINITY));
    assert_eq!(sim.time(), 4.);
}
