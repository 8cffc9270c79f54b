// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The discrete-event kernel and port/channel transport fabric for WEFT.
//!
//! This crate is deliberately free of any notion of a topology file or a
//! module registry — it only knows how to run cycles, move packets between
//! connected ports, and gate that traffic with credits. Building a graph of
//! objects out of a config file is [`weft_config`](../weft_config/index.html)'s job; this crate just
//! gives it the primitives to wire up.

pub mod credit;
pub mod event;
pub mod packet;
pub mod port;
pub mod port_manager;
pub mod sim_object;
pub mod vc;

pub use credit::CreditPool;
pub use event::{Cycle, Engine, EventQueue};
pub use packet::{Packet, PacketId, PacketKind};
pub use port::{drive_tick, kick_port, Port, PortPair, Side};
pub use port_manager::{PortManager, PortStats};
pub use sim_object::{LayoutInfo, SimObject, SimObjectBase};
pub use vc::{VcStats, VirtualChannel};
