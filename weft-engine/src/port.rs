// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Ports: the transport endpoints a [`SimObject`](crate::SimObject) uses to
//! exchange packets with its neighbors.
//!
//! Every port owns two sets of lanes: `input_vcs`, which buffer traffic
//! arriving from the peer until this object's owner next gets a chance to
//! consume it, and `output_vcs`, which buffer traffic waiting to leave. An
//! upstream port's input VCs hold inbound requests and its output VCs hold
//! the responses it sends back; a downstream port's input VCs hold inbound
//! responses and its output VCs hold the requests it sends out. Two ports
//! are joined by a [`PortPair`], which carries the link latency: a
//! successful drain of an output lane is delivered into the peer's matching
//! input lane after `latency` cycles elapse, dropping (with a counted
//! statistic, never silently) if that input lane is full. Nothing here
//! invokes the owner's callbacks directly — that happens once per cycle,
//! from [`drive_tick`], which drains one ready input packet per port before
//! calling the object's own `tick`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::{trace, warn};

use crate::event::{Cycle, Engine};
use crate::packet::Packet;
use crate::port_manager::PortStats;
use crate::sim_object::SimObject;
use crate::vc::VirtualChannel;

/// Which direction of traffic a port is the local endpoint for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Faces the requester: input VCs hold inbound requests, output VCs
    /// hold outbound responses.
    Upstream,
    /// Faces the target: input VCs hold inbound responses, output VCs
    /// hold outbound requests.
    Downstream,
}

/// A transport endpoint: a named, possibly-connected bundle of input and
/// output virtual-channel lanes with priority/round-robin arbitration
/// between lanes of the same direction.
pub struct Port {
    side: Side,
    label: String,
    input_vcs: Vec<VirtualChannel>,
    output_vcs: Vec<VirtualChannel>,
    in_rr: usize,
    out_rr: usize,
    /// Index into the topology's pair table, used only so the factory and
    /// diagnostics can name a link (`"router0.north <-> router1.south"`)
    /// without holding the pair itself.
    pub(crate) pair_index: Option<usize>,
    /// The link this port is bound to, if any. Held directly (rather than
    /// looked up through a central registry by `pair_index` alone) so that
    /// any holder of this `Port` can drive or re-drive delivery on it.
    connection: Option<Rc<RefCell<PortPair>>>,
    dispatch_stats: PortStats,
}

impl Port {
    #[must_use]
    pub fn new(side: Side, label: impl Into<String>) -> Self {
        Self {
            side,
            label: label.into(),
            input_vcs: Vec::new(),
            output_vcs: Vec::new(),
            in_rr: 0,
            out_rr: 0,
            pair_index: None,
            connection: None,
            dispatch_stats: PortStats::default(),
        }
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.pair_index.is_some()
    }

    /// Bind this port to a link. `pair_index` names the slot in the
    /// topology's pair table (for diagnostics and lookup); `pair` is the
    /// live connection itself.
    pub fn bind(&mut self, pair_index: usize, pair: Rc<RefCell<PortPair>>) {
        self.pair_index = Some(pair_index);
        self.connection = Some(pair);
    }

    #[must_use]
    pub fn connection(&self) -> Option<Rc<RefCell<PortPair>>> {
        self.connection.clone()
    }

    /// Add an input lane of the given buffer depth and arbitration
    /// priority (lower value wins ties-before-round-robin). Returns the
    /// new lane's index.
    pub fn add_input_vc(&mut self, capacity: usize, priority: u8) -> usize {
        self.input_vcs.push(VirtualChannel::new(capacity, priority));
        self.input_vcs.len() - 1
    }

    /// Add an output lane of the given buffer depth and priority. Returns
    /// the new lane's index.
    pub fn add_output_vc(&mut self, capacity: usize, priority: u8) -> usize {
        self.output_vcs.push(VirtualChannel::new(capacity, priority));
        self.output_vcs.len() - 1
    }

    #[must_use]
    pub fn input_vc_count(&self) -> usize {
        self.input_vcs.len()
    }

    #[must_use]
    pub fn output_vc_count(&self) -> usize {
        self.output_vcs.len()
    }

    /// Queue a packet for transmission on output lane `vc`. The caller is
    /// responsible for driving delivery afterwards via [`kick_port`]; this
    /// only buffers the packet.
    pub fn enqueue_output(&mut self, vc: usize, pkt: Packet) -> Result<(), Packet> {
        match self.output_vcs.get_mut(vc) {
            Some(lane) => {
                let is_credit = pkt.is_credit();
                let n = pkt.credits() as u64;
                let result = lane.try_enqueue(pkt);
                if result.is_ok() && is_credit {
                    self.dispatch_stats.credit_sent += n.max(1);
                }
                result
            }
            None => Err(pkt),
        }
    }

    /// Accept `pkt` arriving on input lane `vc` from the peer, stamping
    /// its `dst_cycle` at `cycle` regardless of whether the lane has room.
    /// Refused (full, or an out-of-range `vc`) enqueues are dropped with a
    /// counted statistic, matching the "back-pressure is normal, not
    /// fatal" failure model — the core never silently loses packets, but
    /// it also never blocks a link waiting for room that may never come.
    pub fn enqueue_input(&mut self, vc: usize, mut pkt: Packet, cycle: Cycle) -> Result<(), Packet> {
        pkt.stamp_dst_cycle(cycle);
        match self.input_vcs.get_mut(vc) {
            Some(lane) => lane.try_enqueue(pkt),
            None => {
                warn!("{}: invalid vc_id {vc} on inbound packet, dropping", self.label);
                Err(pkt)
            }
        }
    }

    fn select_ready_output(&mut self) -> Option<usize> {
        select_ready(&self.output_vcs, &mut self.out_rr)
    }

    fn select_ready_input(&mut self) -> Option<usize> {
        select_ready(&self.input_vcs, &mut self.in_rr)
    }

    fn pop_output(&mut self, vc: usize) -> Option<Packet> {
        self.output_vcs.get_mut(vc).and_then(VirtualChannel::pop)
    }

    fn pop_input(&mut self, vc: usize) -> Option<Packet> {
        self.input_vcs.get_mut(vc).and_then(VirtualChannel::pop)
    }

    fn push_front_input(&mut self, vc: usize, pkt: Packet) {
        if let Some(lane) = self.input_vcs.get_mut(vc) {
            lane.push_front(pkt);
        }
    }

    /// Record a packet as having been handed off to the owner's
    /// `accept_request`/`accept_response` callback, folding it into this
    /// port's `req_count`/`resp_count`/`byte_count`/delay statistics.
    fn note_dispatch(&mut self, pkt: &Packet) {
        self.dispatch_stats.byte_count += pkt.byte_len() as u64;
        if pkt.is_request() {
            self.dispatch_stats.req_count += 1;
        } else if pkt.is_response() {
            self.dispatch_stats.resp_count += 1;
            if let Some(delay) = pkt.original_req_delay() {
                self.dispatch_stats.record_delay(delay);
            }
        } else if pkt.is_credit() {
            self.dispatch_stats.credit_received += 1;
            self.dispatch_stats.credit_value += u64::from(pkt.credits());
        }
    }

    /// Aggregate the stats of every lane on this port plus the
    /// request/response/credit counters recorded at dispatch time.
    #[must_use]
    pub fn stats(&self) -> PortStats {
        let mut out = self.dispatch_stats;
        for lane in self.input_vcs.iter().chain(self.output_vcs.iter()) {
            let s = lane.stats();
            out.enqueued += s.enqueued;
            out.processed += s.processed;
            out.dropped += s.dropped;
        }
        out
    }
}

fn select_ready(vcs: &[VirtualChannel], rr_cursor: &mut usize) -> Option<usize> {
    let min_priority = vcs.iter().filter(|v| !v.is_empty()).map(VirtualChannel::priority).min()?;
    let candidates: Vec<usize> = vcs
        .iter()
        .enumerate()
        .filter(|(_, v)| v.priority() == min_priority && !v.is_empty())
        .map(|(i, _)| i)
        .collect();
    let start = *rr_cursor % candidates.len();
    *rr_cursor = (*rr_cursor + 1) % candidates.len().max(1);
    Some(candidates[start])
}

type ObjRef = Weak<RefCell<dyn SimObject>>;

/// The link joining two ports: latency plus the non-owning back-references
/// to each side's owning object needed to deliver a packet once its delay
/// elapses. `upstream`/`downstream` name which side plays which role;
/// requests flow downstream-to-upstream, responses the other way, both
/// carried by this one pair.
pub struct PortPair {
    latency: Cycle,
    upstream_owner: ObjRef,
    upstream_label: String,
    downstream_owner: ObjRef,
    downstream_label: String,
}

impl PortPair {
    #[must_use]
    pub fn new(
        latency: Cycle,
        upstream_owner: ObjRef,
        upstream_label: impl Into<String>,
        downstream_owner: ObjRef,
        downstream_label: impl Into<String>,
    ) -> Self {
        Self {
            latency,
            upstream_owner,
            upstream_label: upstream_label.into(),
            downstream_owner,
            downstream_label: downstream_label.into(),
        }
    }

    #[must_use]
    pub fn latency(&self) -> Cycle {
        self.latency
    }

    /// Attempt to drain one packet from `side`'s ready output lane and
    /// deliver it to the peer's matching input lane after `latency`
    /// cycles. Call again (or rely on the event-chained re-kick this
    /// schedules on every successful pop) whenever new traffic is
    /// enqueued, since a port with nothing queued does nothing until
    /// kicked again.
    pub fn kick(pair: &Rc<RefCell<PortPair>>, engine: &Engine, side: Side, port: &Rc<RefCell<Port>>) {
        let popped = {
            let mut p = port.borrow_mut();
            p.select_ready_output().and_then(|vc| p.pop_output(vc))
        };
        let Some(pkt) = popped else {
            return;
        };

        let (peer, peer_label) = {
            let pr = pair.borrow();
            match side {
                Side::Downstream => (pr.upstream_owner.clone(), pr.upstream_label.clone()),
                Side::Upstream => (pr.downstream_owner.clone(), pr.downstream_label.clone()),
            }
        };

        let latency = pair.borrow().latency;
        let pair_for_event = Rc::clone(pair);
        let port_for_event = Rc::clone(port);
        let engine_for_event = engine.clone();

        engine.schedule_after(latency, move |cycle| {
            Self::deliver(&pair_for_event, &engine_for_event, &port_for_event, side, peer, &peer_label, pkt, cycle);
        });
    }

    fn deliver(
        pair: &Rc<RefCell<PortPair>>,
        engine: &Engine,
        port: &Rc<RefCell<Port>>,
        side: Side,
        peer: ObjRef,
        peer_label: &str,
        pkt: Packet,
        cycle: Cycle,
    ) {
        let Some(peer_rc) = peer.upgrade() else {
            trace!("dropping packet at cycle {cycle}: peer object no longer exists");
            return;
        };

        let vc_id = pkt.vc_id();
        let peer_port = {
            let owner = peer_rc.borrow();
            match side {
                Side::Downstream => owner.port_manager().upstream_port(peer_label),
                Side::Upstream => owner.port_manager().downstream_port(peer_label),
            }
        };

        match peer_port {
            Some(peer_port) => {
                if peer_port.borrow_mut().enqueue_input(vc_id, pkt, cycle).is_err() {
                    warn!("{peer_label}: input vc {vc_id} full at cycle {cycle}, dropping packet");
                }
            }
            None => warn!("{peer_label}: no such port on peer, dropping packet"),
        }

        // More traffic may be waiting behind it on this same output lane;
        // keep the link busy regardless of whether this delivery landed.
        Self::kick(pair, engine, side, port);
    }
}

/// Drive (or re-drive) delivery on `port` if it is bound to a link. A
/// no-op on an unconnected port, so callers don't need to check
/// [`Port::is_connected`] themselves before kicking a port after enqueuing
/// traffic on it.
pub fn kick_port(port: &Rc<RefCell<Port>>, engine: &Engine) {
    let bound = {
        let p = port.borrow();
        p.connection().map(|pair| (pair, p.side()))
    };
    if let Some((pair, side)) = bound {
        PortPair::kick(&pair, engine, side, port);
    }
}

/// Run one cycle for `obj`: drain at most one ready inbound packet per
/// port (requests on each upstream port, responses on each downstream
/// port), dispatch it to the matching callback, then call the object's
/// own `tick`. A callback that refuses its packet gets it pushed back to
/// the head of the lane it came from, to be retried next cycle.
///
/// This is the generic half of §4's "owner's request callback is invoked
/// by a subsequent tick that drains the head of the highest-priority
/// non-empty VC" — every [`SimObject`] gets it for free rather than
/// reimplementing input-VC draining itself.
pub fn drive_tick<T: SimObject + ?Sized>(obj: &Rc<RefCell<T>>, cycle: Cycle) {
    let upstream_ports: Vec<_> = obj.borrow().port_manager().upstream_ports().to_vec();
    for port in upstream_ports {
        drain_one(&port, obj, cycle, true);
    }

    let downstream_ports: Vec<_> = obj.borrow().port_manager().downstream_ports().to_vec();
    for port in downstream_ports {
        drain_one(&port, obj, cycle, false);
    }

    obj.borrow_mut().tick(cycle);
}

fn drain_one<T: SimObject + ?Sized>(port: &Rc<RefCell<Port>>, obj: &Rc<RefCell<T>>, cycle: Cycle, is_request: bool) {
    let popped = {
        let mut p = port.borrow_mut();
        p.select_ready_input().and_then(|vc| p.pop_input(vc).map(|pkt| (vc, pkt)))
    };
    let Some((vc, pkt)) = popped else {
        return;
    };
    port.borrow_mut().note_dispatch(&pkt);
    let label = port.borrow().label().to_string();

    let result = {
        let mut o = obj.borrow_mut();
        if is_request {
            o.accept_request(&label, pkt)
        } else {
            o.accept_response(&label, pkt)
        }
    };
    if let Err(pkt) = result {
        warn!("{label}: owner refused packet at cycle {cycle}, retrying next cycle");
        port.borrow_mut().push_front_input(vc, pkt);
    }
}
