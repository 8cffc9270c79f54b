// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! End-to-end scenarios exercising the transport fabric through the
//! Source/Store/Sink fixtures: latency-correct delivery, VC backpressure,
//! and store capacity refusal.

use std::cell::RefCell;
use std::rc::Rc;

use weft_components::test_helpers::{connect, register_tick};
use weft_components::{Generator, Sink, Source, Store};
use weft_engine::{Engine, Packet, PacketId, PacketKind, SimObject};

struct Keepalive(Vec<Rc<dyn Fn(u64)>>);

#[test]
fn packets_arrive_after_the_configured_latency_and_in_order() {
    let engine = Engine::new();
    let generator: Generator = Box::new((0u8..5).map(|i| vec![i]));
    let source = Source::new("source", engine.clone(), generator);
    let sink = Sink::new("sink", engine.clone());
    connect(&source.borrow().tx(), &sink.borrow().rx(), 4, 8);

    let _keepalive = Keepalive(vec![register_tick(&engine, &source), register_tick(&engine, &sink)]);

    engine.run(Some(20));

    let received = sink.borrow().received_count();
    assert_eq!(received, 5);
    let payloads: Vec<u8> = sink
        .borrow()
        .received()
        .iter()
        .map(|p| p.payload()[0])
        .collect();
    assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
}

#[test]
fn a_full_virtual_channel_refuses_further_enqueues() {
    let engine = Engine::new();
    let generator: Generator = Box::new(std::iter::empty());
    let source = Source::new("source", engine, generator);
    let tx = source.borrow().tx();
    tx.borrow_mut().add_output_vc(2, 0);

    let req = |id: u64| Packet::request(PacketId(id), PacketKind::ReqRead, 0, 0, id, 0, vec![]);

    assert!(tx.borrow_mut().enqueue_output(0, req(1)).is_ok());
    assert!(tx.borrow_mut().enqueue_output(0, req(2)).is_ok());
    let refused = tx.borrow_mut().enqueue_output(0, req(3));
    assert!(refused.is_err());
}

#[test]
fn a_small_buffer_still_delivers_every_packet_eventually() {
    let engine = Engine::new();
    let generator: Generator = Box::new((0u8..3).map(|i| vec![i]));
    let source = Source::new("source", engine.clone(), generator);
    let sink = Sink::new("sink", engine.clone());
    // A single-slot lane forces back-pressure: the source can only have
    // one packet in flight at a time, but nothing is ever dropped since
    // the source only emits once its previous enqueue succeeded.
    connect(&source.borrow().tx(), &sink.borrow().rx(), 2, 1);

    let _keepalive = Keepalive(vec![register_tick(&engine, &source), register_tick(&engine, &sink)]);

    engine.run(Some(1));
    assert_eq!(sink.borrow().received_count(), 0);

    engine.run(Some(20));
    assert_eq!(sink.borrow().received_count(), 3);
}

#[test]
fn a_store_at_capacity_refuses_new_requests_until_it_drains() {
    let engine = Engine::new();
    let store = Store::new("store", engine.clone(), 2);
    let req = |id: u64| Packet::request(PacketId(id), PacketKind::ReqRead, 0, 0, id, 0, vec![]);

    assert!(store.borrow_mut().accept_request("rx", req(1)).is_ok());
    assert!(store.borrow_mut().accept_request("rx", req(2)).is_ok());
    assert!(store.borrow_mut().accept_request("rx", req(3)).is_err());

    // Ticking lets a held packet leave via `tx`, freeing a slot. `tx` has
    // no VC yet in this standalone test, so the drained packet is simply
    // dropped (no peer to deliver it to) — what matters here is that the
    // hold queue shrinks.
    store.borrow().tx().borrow_mut().add_output_vc(4, 0);
    store.borrow_mut().tick(0);
    assert_eq!(store.borrow().held_count(), 1);
}
