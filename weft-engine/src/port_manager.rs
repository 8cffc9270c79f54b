// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Per-object registry of ports, looked up by label during topology
//! construction and by the transport fabric when routing traffic.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::port::{Port, Side};

/// Aggregated traffic counters for one port, summed across every lane it
/// owns. Mirrors the field set of the original prototype's own
/// `PortStats` (`req_count`, `resp_count`, `byte_count`, `total_delay`,
/// `min_delay`, `max_delay`, `credit_sent`, `credit_received`,
/// `credit_value`) so nothing that used to be observable is lost, plus the
/// `enqueued`/`dropped` counters the data model's invariants are stated
/// against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub enqueued: u64,
    pub processed: u64,
    pub dropped: u64,
    pub req_count: u64,
    pub resp_count: u64,
    pub byte_count: u64,
    pub total_delay: u64,
    pub min_delay: Option<u64>,
    pub max_delay: Option<u64>,
    pub credit_sent: u64,
    pub credit_received: u64,
    pub credit_value: u64,
}

impl PortStats {
    pub fn merge(&mut self, other: &PortStats) {
        self.enqueued += other.enqueued;
        self.processed += other.processed;
        self.dropped += other.dropped;
        self.req_count += other.req_count;
        self.resp_count += other.resp_count;
        self.byte_count += other.byte_count;
        self.total_delay += other.total_delay;
        self.min_delay = min_option(self.min_delay, other.min_delay);
        self.max_delay = max_option(self.max_delay, other.max_delay);
        self.credit_sent += other.credit_sent;
        self.credit_received += other.credit_received;
        self.credit_value += other.credit_value;
    }

    /// Fold one more observed request/response delay into the running
    /// `total_delay`/`min_delay`/`max_delay` counters.
    pub fn record_delay(&mut self, delay: u64) {
        self.total_delay += delay;
        self.min_delay = Some(self.min_delay.map_or(delay, |m| m.min(delay)));
        self.max_delay = Some(self.max_delay.map_or(delay, |m| m.max(delay)));
    }
}

fn min_option(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn max_option(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Owns every [`Port`] a [`crate::SimObject`] exposes, indexed by label for
/// O(1) lookup during connection binding and routing.
#[derive(Default)]
pub struct PortManager {
    upstream: Vec<Rc<RefCell<Port>>>,
    downstream: Vec<Rc<RefCell<Port>>>,
    upstream_index: HashMap<String, usize>,
    downstream_index: HashMap<String, usize>,
}

impl PortManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new upstream-facing port (one whose input VCs receive
    /// requests and whose output VCs send responses), returning a shared
    /// handle to it. The port starts with no VC lanes; add them with
    /// [`Port::add_input_vc`]/[`Port::add_output_vc`].
    pub fn add_upstream_port(&mut self, label: impl Into<String>) -> Rc<RefCell<Port>> {
        let label = label.into();
        let port = Rc::new(RefCell::new(Port::new(Side::Upstream, label.clone())));
        self.upstream_index.insert(label, self.upstream.len());
        self.upstream.push(Rc::clone(&port));
        port
    }

    /// Register a new downstream-facing port (one whose output VCs send
    /// requests and whose input VCs receive responses), returning a shared
    /// handle to it.
    pub fn add_downstream_port(&mut self, label: impl Into<String>) -> Rc<RefCell<Port>> {
        let label = label.into();
        let port = Rc::new(RefCell::new(Port::new(Side::Downstream, label.clone())));
        self.downstream_index.insert(label, self.downstream.len());
        self.downstream.push(Rc::clone(&port));
        port
    }

    #[must_use]
    pub fn upstream_port(&self, label: &str) -> Option<Rc<RefCell<Port>>> {
        self.upstream_index.get(label).map(|&i| Rc::clone(&self.upstream[i]))
    }

    #[must_use]
    pub fn downstream_port(&self, label: &str) -> Option<Rc<RefCell<Port>>> {
        self.downstream_index.get(label).map(|&i| Rc::clone(&self.downstream[i]))
    }

    #[must_use]
    pub fn upstream_ports(&self) -> &[Rc<RefCell<Port>>] {
        &self.upstream
    }

    #[must_use]
    pub fn downstream_ports(&self) -> &[Rc<RefCell<Port>>] {
        &self.downstream
    }

    /// True once every registered port has been bound to a peer. Used by
    /// the factory's connection-resolution phase to flag modules left with
    /// dangling, unconnected endpoints.
    #[must_use]
    pub fn all_connected(&self) -> bool {
        self.upstream.iter().all(|p| p.borrow().is_connected())
            && self.downstream.iter().all(|p| p.borrow().is_connected())
    }

    /// Sum the stats of every port this object owns.
    #[must_use]
    pub fn aggregate_stats(&self) -> PortStats {
        let mut out = PortStats::default();
        for port in self.upstream.iter().chain(self.downstream.iter()) {
            out.merge(&port.borrow().stats());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_found_by_label() {
        let mut pm = PortManager::new();
        pm.add_upstream_port("in");
        pm.add_downstream_port("out");

        assert!(pm.upstream_port("in").is_some());
        assert!(pm.downstream_port("out").is_some());
        assert!(pm.upstream_port("missing").is_none());
    }

    #[test]
    fn all_connected_is_false_until_every_port_is_bound() {
        let mut pm = PortManager::new();
        let port = pm.add_upstream_port("in");
        assert!(!pm.all_connected());
        port.borrow_mut().pair_index = Some(0);
        assert!(pm.all_connected());
    }

    #[test]
    fn record_delay_tracks_min_and_max() {
        let mut stats = PortStats::default();
        stats.record_delay(5);
        stats.record_delay(2);
        stats.record_delay(9);
        assert_eq!(stats.total_delay, 16);
        assert_eq!(stats.min_delay, Some(2));
        assert_eq!(stats.max_delay, Some(9));
    }
}
