// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A traffic-sinking test fixture.
//!
//! A [`Sink`] accepts and records every request it receives on its single
//! upstream port, `rx`. It never issues a response.
//!
//! # Ports
//!
//! This component has one port:
//!  - One upstream port: `rx`

use std::cell::RefCell;
use std::rc::Rc;

use weft_engine::{Cycle, Engine, LayoutInfo, Packet, Port, PortManager, SimObject, SimObjectBase};

pub struct Sink {
    base: SimObjectBase,
    rx: Rc<RefCell<Port>>,
    received: Vec<Packet>,
}

impl Sink {
    #[must_use]
    pub fn new(name: impl Into<String>, engine: Engine) -> Rc<RefCell<Self>> {
        let mut base = SimObjectBase::new(name, engine);
        let rx = base.ports.add_upstream_port("rx");
        Rc::new(RefCell::new(Self {
            base,
            rx,
            received: Vec::new(),
        }))
    }

    #[must_use]
    pub fn rx(&self) -> Rc<RefCell<Port>> {
        Rc::clone(&self.rx)
    }

    #[must_use]
    pub fn received(&self) -> &[Packet] {
        &self.received
    }

    #[must_use]
    pub fn received_count(&self) -> usize {
        self.received.len()
    }
}

impl SimObject for Sink {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn tick(&mut self, _cycle: Cycle) {}

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
        self.received.push(pkt);
        Ok(())
    }
}
