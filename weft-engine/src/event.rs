// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The discrete-event kernel: a min-heap of cycle-stamped events.
//!
//! Events fire in `fire_time` order; events scheduled for the same cycle fire
//! in the order they were inserted. A [`TickEvent`] re-arms itself one cycle
//! later every time it fires, giving every [`crate::SimObject`] a steady
//! per-cycle callback without the queue owner having to re-enqueue it by hand.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::{Rc, Weak};

/// A simulation cycle count. Cycle zero is the first cycle `run` executes.
pub type Cycle = u64;

/// Work to perform when an event fires.
pub enum EventKind {
    /// Calls `tick` on the held object, then re-schedules itself one cycle
    /// later. Lives for as long as its target does.
    Tick(Weak<dyn Fn(Cycle)>),
    /// A one-shot closure, consumed the first time it fires.
    Lambda(Box<dyn FnOnce(Cycle)>),
}

struct Event {
    fire_time: Cycle,
    seq: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.seq == other.seq
    }
}
impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest fire_time (and,
        // within a cycle, the smallest seq) to pop first.
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Owns the pending-event heap and the current simulation cycle.
///
/// `EventQueue` is never handed out by value: every [`SimObject`](crate::SimObject)
/// holds a [`Engine`] clone instead, so many objects can schedule events
/// against the same queue without fighting over ownership.
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    cur_cycle: Cycle,
    next_seq: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cur_cycle: 0,
            next_seq: 0,
        }
    }

    /// The cycle currently being processed (or about to be, if the queue is
    /// idle). Monotonically non-decreasing.
    #[must_use]
    pub fn cur_cycle(&self) -> Cycle {
        self.cur_cycle
    }

    fn push(&mut self, fire_time: Cycle, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Event {
            fire_time,
            seq,
            kind,
        });
    }

    /// Schedule a one-shot closure to run `delay` cycles from now (`delay ==
    /// 0` means "later this same cycle, after anything already queued for
    /// it").
    pub fn schedule_after(&mut self, delay: Cycle, f: impl FnOnce(Cycle) + 'static) {
        let fire_time = self.cur_cycle + delay;
        self.push(fire_time, EventKind::Lambda(Box::new(f)));
    }

    /// Schedule a one-shot closure to run at an absolute cycle. Scheduling
    /// into the past clamps to the current cycle.
    pub fn schedule_at(&mut self, fire_time: Cycle, f: impl FnOnce(Cycle) + 'static) {
        let fire_time = fire_time.max(self.cur_cycle);
        self.push(fire_time, EventKind::Lambda(Box::new(f)));
    }

    /// Register a recurring per-cycle callback, starting next cycle. The
    /// callback is held weakly: once every strong reference to `tick_fn` is
    /// dropped the tick simply stops re-arming.
    pub fn schedule_tick(&mut self, tick_fn: &Rc<dyn Fn(Cycle)>) {
        let fire_time = self.cur_cycle + 1;
        self.push(fire_time, EventKind::Tick(Rc::downgrade(tick_fn)));
    }

    /// True once no more events are pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pop the next event and advance `cur_cycle` to its fire time, handing
    /// back the event's cycle and payload for the caller to run outside of
    /// any borrow on this queue. An event body routinely schedules more
    /// events of its own, so it must never run while `self` is still
    /// mutably borrowed.
    fn pop_ready(&mut self) -> Option<(Cycle, EventKind)> {
        let event = self.heap.pop()?;
        self.cur_cycle = self.cur_cycle.max(event.fire_time);
        Some((self.cur_cycle, event.kind))
    }
}

/// A shared, cheaply-cloneable handle onto an [`EventQueue`].
///
/// `SimObject`s never see the queue directly: they schedule work through an
/// `Engine`, which hides the `Rc<RefCell<_>>` bookkeeping needed so that an
/// event body can itself schedule more events without deadlocking on the
/// queue's own borrow.
#[derive(Clone)]
pub struct Engine {
    queue: Rc<RefCell<EventQueue>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(EventQueue::new())),
        }
    }

    #[must_use]
    pub fn cur_cycle(&self) -> Cycle {
        self.queue.borrow().cur_cycle()
    }

    pub fn schedule_after(&self, delay: Cycle, f: impl FnOnce(Cycle) + 'static) {
        self.queue.borrow_mut().schedule_after(delay, f);
    }

    pub fn schedule_at(&self, fire_time: Cycle, f: impl FnOnce(Cycle) + 'static) {
        self.queue.borrow_mut().schedule_at(fire_time, f);
    }

    pub fn schedule_tick(&self, tick_fn: &Rc<dyn Fn(Cycle)>) {
        self.queue.borrow_mut().schedule_tick(tick_fn);
    }

    /// Run events until the queue is idle or `end_cycle` (exclusive of
    /// anything scheduled at or after it, per §8's run-to-end-bound rule)
    /// has been reached, whichever comes first.
    ///
    /// `end_cycle == None` drains the queue completely.
    pub fn run(&self, end_cycle: Option<Cycle>) {
        loop {
            let should_step = {
                let queue = self.queue.borrow();
                match (end_cycle, queue.heap.peek()) {
                    (_, None) => false,
                    (Some(end), Some(next)) => next.fire_time < end,
                    (None, Some(_)) => true,
                }
            };
            if !should_step {
                break;
            }
            // Pop under a short-lived borrow, then drop it before running
            // the event body: the body is free to call back into this
            // `Engine` to schedule more events.
            let popped = { self.queue.borrow_mut().pop_ready() };
            let Some((cycle, kind)) = popped else {
                break;
            };
            match kind {
                EventKind::Lambda(f) => f(cycle),
                EventKind::Tick(weak) => {
                    if let Some(tick_fn) = weak.upgrade() {
                        tick_fn(cycle);
                        self.queue
                            .borrow_mut()
                            .push(cycle + 1, EventKind::Tick(Weak::clone(&weak)));
                    }
                }
            }
        }
        if let Some(end) = end_cycle {
            let mut queue = self.queue.borrow_mut();
            queue.cur_cycle = queue.cur_cycle.max(end);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn events_fire_in_cycle_order() {
        let engine = Engine::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = Rc::clone(&order);
        engine.schedule_after(3, move |c| o1.borrow_mut().push((c, "a")));
        let o2 = Rc::clone(&order);
        engine.schedule_after(1, move |c| o2.borrow_mut().push((c, "b")));
        let o3 = Rc::clone(&order);
        engine.schedule_after(2, move |c| o3.borrow_mut().push((c, "c")));

        engine.run(None);
        assert_eq!(
            *order.borrow(),
            vec![(1, "b"), (2, "c"), (3, "a")]
        );
    }

    #[test]
    fn same_cycle_events_fire_fifo() {
        let engine = Engine::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..5 {
            let o = Rc::clone(&order);
            engine.schedule_after(0, move |_| o.borrow_mut().push(i));
        }
        engine.run(None);
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn run_advances_to_end_bound_even_if_idle() {
        let engine = Engine::new();
        engine.run(Some(10));
        assert_eq!(engine.cur_cycle(), 10);
    }

    #[test]
    fn run_stops_before_events_at_or_after_end() {
        let engine = Engine::new();
        let fired = Rc::new(RefCell::new(false));
        let f = Rc::clone(&fired);
        engine.schedule_after(5, move |_| *f.borrow_mut() = true);

        engine.run(Some(5));
        assert!(!*fired.borrow());
        assert_eq!(engine.cur_cycle(), 5);

        engine.run(None);
        assert!(*fired.borrow());
    }

    #[test]
    fn tick_rearms_every_cycle_until_dropped() {
        let engine = Engine::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let tick_fn: Rc<dyn Fn(Cycle)> = Rc::new(move |_| *c.borrow_mut() += 1);

        engine.schedule_tick(&tick_fn);
        engine.run(Some(4));
        assert_eq!(*count.borrow(), 4);

        drop(tick_fn);
        engine.run(Some(10));
        assert_eq!(*count.borrow(), 4);
    }

    #[test]
    fn event_body_can_schedule_more_events() {
        let engine = Engine::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = Rc::clone(&order);
        let e2 = engine.clone();
        engine.schedule_after(1, move |c| {
            o.borrow_mut().push(c);
            let o2 = Rc::clone(&o);
            e2.schedule_after(1, move |c2| o2.borrow_mut().push(c2));
        });

        engine.run(None);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }
}
