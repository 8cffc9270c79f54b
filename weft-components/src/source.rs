// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A traffic-generating test fixture.
//!
//! A [`Source`] emits one read-request [`Packet`] per tick for as long as
//! its [`Generator`] has data left, pushing each onto its single
//! downstream port's VC 0 and kicking the link so it is carried as soon as
//! buffer space allows.
//!
//! # Ports
//!
//! This component has one port:
//!  - One downstream port: `tx`
//!
//! VC lanes on `tx` are added by whatever binds a connection to it (the
//! factory, or [`crate::test_helpers::connect`] in a standalone test) —
//! this fixture has nothing to say about buffer sizing itself.
//!
//! [`random_payload_generator`] builds a [`Generator`] of random payload
//! bytes for a `Source` that doesn't care what it's carrying, for callers
//! who want varied traffic instead of a fixed byte pattern.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use weft_engine::{
    kick_port, Cycle, Engine, LayoutInfo, Packet, PacketId, PacketKind, Port, PortManager, SimObject,
    SimObjectBase,
};

/// Hands back one payload per call, `None` once exhausted.
pub type Generator = Box<dyn Iterator<Item = Vec<u8>>>;

/// A [`Generator`] producing `count` payloads of `payload_len` random bytes
/// each, deterministic for a given `seed` so a test or demo can reproduce a
/// run exactly. Useful for a traffic generator that wants varied payloads
/// without caring what's in them — the core treats payload bytes as opaque
/// either way.
#[must_use]
pub fn random_payload_generator(count: u64, payload_len: usize, seed: u64) -> Generator {
    let mut rng = StdRng::seed_from_u64(seed);
    Box::new((0..count).map(move |_| (0..payload_len).map(|_| rng.gen()).collect()))
}

pub struct Source {
    base: SimObjectBase,
    tx: Rc<RefCell<Port>>,
    generator: Generator,
    next_id: u64,
}

impl Source {
    #[must_use]
    pub fn new(name: impl Into<String>, engine: Engine, generator: Generator) -> Rc<RefCell<Self>> {
        let mut base = SimObjectBase::new(name, engine);
        let tx = base.ports.add_downstream_port("tx");
        Rc::new(RefCell::new(Self {
            base,
            tx,
            generator,
            next_id: 0,
        }))
    }

    #[must_use]
    pub fn tx(&self) -> Rc<RefCell<Port>> {
        Rc::clone(&self.tx)
    }

    #[must_use]
    pub fn generated_count(&self) -> u64 {
        self.next_id
    }
}

impl SimObject for Source {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn tick(&mut self, cycle: Cycle) {
        let Some(payload) = self.generator.next() else {
            return;
        };
        let id = PacketId(self.next_id);
        self.next_id += 1;
        let pkt = Packet::request(id, PacketKind::ReqRead, 0, 0, id.0, cycle, payload);
        if self.tx.borrow_mut().enqueue_output(0, pkt).is_err() {
            warn!("{}: tx VC full, dropping generated packet {id:?}", self.base.name);
            return;
        }
        kick_port(&self.tx, &self.base.engine);
    }

    fn port_manager(&self) -> &PortManager {
        &self.base.ports
    }

    fn port_manager_mut(&mut self) -> &mut PortManager {
        &mut self.base.ports
    }

    fn layout_mut(&mut self) -> &mut LayoutInfo {
        &mut self.base.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_packet_per_tick_until_exhausted() {
        let engine = Engine::new();
        let gen: Generator = Box::new((0u8..2).map(|i| vec![i]));
        let source = Source::new("source", engine.clone(), gen);
        source.borrow().tx.borrow_mut().add_output_vc(4, 0);

        source.borrow_mut().tick(0);
        source.borrow_mut().tick(1);
        source.borrow_mut().tick(2);

        assert_eq!(source.borrow().generated_count(), 2);
        assert_eq!(source.borrow().tx.borrow().output_vc_count(), 1);
    }

    #[test]
    fn random_payload_generator_is_deterministic_for_a_given_seed() {
        let a: Vec<Vec<u8>> = random_payload_generator(4, 3, 42).collect();
        let b: Vec<Vec<u8>> = random_payload_generator(4, 3, 42).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        assert!(a.iter().all(|p| p.len() == 3));
    }

    #[test]
    fn different_seeds_produce_different_payloads() {
        let a: Vec<Vec<u8>> = random_payload_generator(8, 4, 1).collect();
        let b: Vec<Vec<u8>> = random_payload_generator(8, 4, 2).collect();
        assert_ne!(a, b);
    }
}
