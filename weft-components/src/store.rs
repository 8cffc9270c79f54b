// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A buffering store.
//!
//! A [`Store`] holds up to `capacity` packets accepted on its upstream port,
//! `rx`, and forwards them, one per tick, out of its downstream port, `tx`,
//! in the order they arrived.
//!
//! # Ports
//!
//! This component has two ports:
//!  - One upstream port: `rx`
//!  - One downstream port: `tx`

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::warn;
use weft_engine::{kick_port, Cycle, Engine, LayoutInfo, Packet, Port, PortManager, SimObject, SimObjectBase};

pub struct Store {
    base: SimObjectBase,
    rx: Rc<RefCell<Port>>,
    tx: Rc<RefCell<Port>>,
    capacity: usize,
    held: VecDeque<Packet>,
}

impl Store {
    #[must_use]
    pub fn new(name: impl Into<String>, engine: Engine, capacity: usize) -> Rc<RefCell<Self>> {
        let mut base = SimObjectBase::new(name, engine);
        let rx = base.ports.add_upstream_port("rx");
        let tx = base.ports.add_downstream_port("tx");
        Rc::new(RefCell::new(Self {
            base,
            rx,
            tx,
            capacity,
            held: VecDeque::with_capacity(capacity),
        }))
    }

    #[must_use]
    pub fn rx(&self) -> Rc<RefCell<Port>> {
        Rc::clone(&self.rx)
    }

    #[must_use]
    pub fn tx(&self) -> Rc<RefCell<Port>> {
        Rc::clone(&self.tx)
    }

    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.held.len() >= self.capacity
    }
}

impl SimObject for Store {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn tick(&mut self, _cycle: Cycle) {
        let Some(pkt) = self.held.pop_front() else {
            return;
        };
        match self.tx.borrow_mut().enqueue_output(0, pkt) {
            Ok(()) => kick_port(&self.tx, &self.base.engine),
            Err(pkt) => {
                // tx lane is momentarily full; hold on to it and retry
                // next tick rather than dropping it.
                self.held.push_front(pkt);
            }
        }
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

    fn accept_request(&mut self, port_label: &str, pkt: Packet) -> Result<(), Packet> {
        if port_label != "rx" {
            return Err(pkt);
        }
        if self.is_full() {
            warn!("{}: store full at capacity {}, refusing {:?}", self.base.name, self.capacity, pkt.id());
            return Err(pkt);
        }
        self.held.push_back(pkt);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_engine::{PacketId, PacketKind};

    fn req(id: u64) -> Packet {
        Packet::request(PacketId(id), PacketKind::ReqRead, 0, 0, id, 0, vec![])
    }

    #[test]
    fn refuses_once_at_capacity() {
        let engine = Engine::new();
        let store = Store::new("store", engine, 2);

        assert!(store.borrow_mut().accept_request("rx", req(1)).is_ok());
        assert!(store.borrow_mut().accept_request("rx", req(2)).is_ok());
        assert!(store.borrow_mut().accept_request("rx", req(3)).is_err());
        assert_eq!(store.borrow().held_count(), 2);
    }

    #[test]
    fn tick_forwards_in_fifo_order() {
        let engine = Engine::new();
        let store = Store::new("store", engine, 4);
        store.borrow().tx.borrow_mut().add_output_vc(4, 0);

        store.borrow_mut().accept_request("rx", req(1)).unwrap();
        store.borrow_mut().accept_request("rx", req(2)).unwrap();

        store.borrow_mut().tick(0);
        assert_eq!(store.borrow().held_count(), 1);
        store.borrow_mut().tick(1);
        assert_eq!(store.borrow().held_count(), 0);
    }
}
