// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Small helpers shared between this crate's own tests, its benchmarks,
//! and downstream integration tests that want to wire up a handful of
//! fixtures without pulling in the full factory/config machinery.

use std::cell::RefCell;
use std::rc::Rc;

use weft_engine::{drive_tick, Cycle, Engine, Port, PortPair, SimObject};

/// Join two ports with a link of the given latency, adding one VC of
/// `capacity` in each direction (request and response) the way
/// `weft_config::Factory::bind_endpoint_pair` would from a connection's
/// buffer-size arrays.
pub fn connect(upstream: &Rc<RefCell<Port>>, downstream: &Rc<RefCell<Port>>, latency: Cycle, capacity: usize) {
    downstream.borrow_mut().add_output_vc(capacity, 0);
    upstream.borrow_mut().add_input_vc(capacity, 0);
    upstream.borrow_mut().add_output_vc(capacity, 0);
    downstream.borrow_mut().add_input_vc(capacity, 0);

    let pair = Rc::new(RefCell::new(PortPair::new(
        latency,
        Rc::downgrade(upstream) as _,
        upstream.borrow().label().to_string(),
        Rc::downgrade(downstream) as _,
        downstream.borrow().label().to_string(),
    )));
    upstream.borrow_mut().bind(0, Rc::clone(&pair));
    downstream.borrow_mut().bind(0, pair);
}

/// Wrap an object in a per-cycle closure that runs [`drive_tick`] and
/// register it with the engine, returning the closure so the caller can
/// keep it alive for as long as the tick should keep re-arming.
pub fn register_tick<T: SimObject + 'static>(engine: &Engine, obj: &Rc<RefCell<T>>) -> Rc<dyn Fn(Cycle)> {
    let obj = Rc::clone(obj);
    let tick: Rc<dyn Fn(Cycle)> = Rc::new(move |c| drive_tick(&obj, c));
    engine.schedule_tick(&tick);
    tick
}
