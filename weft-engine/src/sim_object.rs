// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The capability interface every simulated module implements.
//!
//! Rather than a fat base class with runtime downcasting, `SimObject` is
//! deliberately minimal: a name, a per-cycle callback, access to the
//! object's [`PortManager`], and the two request/response entry points a
//! port uses to hand a packet to its owner. Anything else a concrete module
//! needs — registers, internal queues, whatever — lives on the concrete
//! type and is reached by the holder of a `Rc<RefCell<ConcreteType>>`, never
//! by downcasting a `dyn SimObject`.

use crate::event::Engine;
use crate::packet::{Packet, PacketId};
use crate::port_manager::PortManager;

/// Static placement information threaded through from the topology config,
/// used only for diagnostics and visualization — never by simulation logic
/// itself.
#[derive(Debug, Clone, Default)]
pub struct LayoutInfo {
    /// The dotted instance path assigned by the factory, e.g.
    /// `"cluster0.router2"`.
    pub instance_path: String,
    /// The `(x, y)` position given in the instance's config entry, if any.
    /// Stored verbatim; nothing in the simulation core reads it back.
    pub position: Option<(f64, f64)>,
}

/// Fields every `SimObject` implementation needs and would otherwise
/// duplicate: its own name, a handle onto the shared event queue, the
/// layout info the factory assigned it, and its port manager.
///
/// Composed into a concrete type (`struct Router { base: SimObjectBase, ...
/// }`) rather than provided by a default trait method, so a module can
/// delegate to it explicitly wherever that reads more clearly than hiding
/// the indirection behind a trait default.
pub struct SimObjectBase {
    pub name: String,
    pub engine: Engine,
    pub layout: LayoutInfo,
    pub ports: PortManager,
}

impl SimObjectBase {
    #[must_use]
    pub fn new(name: impl Into<String>, engine: Engine) -> Self {
        Self {
            name: name.into(),
            engine,
            layout: LayoutInfo::default(),
            ports: PortManager::new(),
        }
    }
}

/// The minimal capability surface the factory and the port fabric need from
/// every module, whatever its concrete behavior.
pub trait SimObject {
    /// The object's own name, as used in diagnostics and in endpoint
    /// resolution (`"name.port"`).
    fn name(&self) -> &str;

    /// Advance the object by one simulated cycle. Scheduled automatically
    /// once by the factory via [`Engine::schedule_tick`]; the object does
    /// not need to re-arm itself.
    fn tick(&mut self, cycle: crate::event::Cycle);

    /// Shared access to the object's ports, so the transport fabric can
    /// route packets without knowing the object's concrete type.
    fn port_manager(&self) -> &PortManager;

    /// Mutable access to the object's ports, used during topology
    /// construction to bind connections.
    fn port_manager_mut(&mut self) -> &mut PortManager;

    /// Mutable access to the object's [`LayoutInfo`], used by the factory
    /// to stamp the instance path and config-declared position after
    /// construction.
    fn layout_mut(&mut self) -> &mut LayoutInfo;

    /// Deliver an inbound request arriving on `port_label`. The default
    /// implementation refuses every request; modules that accept requests
    /// override it.
    fn accept_request(&mut self, port_label: &str, pkt: Packet) -> Result<(), Packet> {
        let _ = port_label;
        Err(pkt)
    }

    /// Deliver an inbound response, keyed by the [`PacketId`] of the
    /// request it answers. The default implementation refuses every
    /// response; modules that issue requests override it.
    fn accept_response(&mut self, port_label: &str, pkt: Packet) -> Result<(), Packet> {
        let _ = (port_label, pkt.original_req().unwrap_or(PacketId(0)));
        Err(pkt)
    }
}
