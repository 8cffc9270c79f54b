// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Packets: the unit of transport moved between ports.
//!
//! A `Packet` is an owned, moved resource, never a shared or borrowed one.
//! `Port::enqueue_output`/`enqueue_input` take a `Packet` by value and hand
//! it back in the `Err` case when the destination refuses it, so a caller
//! can retry or drop it — there is no point in the packet's lifetime where
//! two owners could disagree about who is responsible for freeing it.

use crate::event::Cycle;

/// What a packet carries. Exactly one of these ever holds for a given
/// packet; there is no packet that is simultaneously, say, a request and a
/// credit return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    ReqRead,
    ReqWrite,
    Resp,
    StreamData,
    CreditReturn,
}

impl PacketKind {
    #[must_use]
    pub fn is_request(self) -> bool {
        matches!(self, PacketKind::ReqRead | PacketKind::ReqWrite)
    }
}

/// Caller-assigned identity for a packet, used only to let a `Response` refer
/// back to the `Request` it answers without a raw pointer or a lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(pub u64);

/// A single unit of simulated traffic.
#[derive(Debug, Clone)]
pub struct Packet {
    id: PacketId,
    kind: PacketKind,
    payload: Vec<u8>,
    src_cycle: Cycle,
    dst_cycle: Cycle,
    vc_id: usize,
    stream_id: u32,
    seq_num: u64,
    credits: u32,
    /// Weak back-reference from a response to the request that caused it.
    /// Never carries ownership; `None` on every packet but a response.
    original_req: Option<PacketId>,
    /// The original request's own `src_cycle`/`dst_cycle`, copied in by
    /// [`Packet::response`] from the request being answered. Lets the
    /// module that issued the request measure end-to-end latency without
    /// keeping every in-flight request alive just to read its timestamps
    /// back out once the response returns.
    original_req_src_cycle: Option<Cycle>,
    original_req_dst_cycle: Option<Cycle>,
}

impl Packet {
    /// Build a new read or write request, stamped as issued at `src_cycle`.
    #[must_use]
    pub fn request(
        id: PacketId,
        kind: PacketKind,
        vc_id: usize,
        stream_id: u32,
        seq_num: u64,
        src_cycle: Cycle,
        payload: Vec<u8>,
    ) -> Self {
        assert!(kind.is_request(), "Packet::request called with a non-request kind");
        Self {
            id,
            kind,
            payload,
            src_cycle,
            dst_cycle: src_cycle,
            vc_id,
            stream_id,
            seq_num,
            credits: 0,
            original_req: None,
            original_req_src_cycle: None,
            original_req_dst_cycle: None,
        }
    }

    /// Build a response to `original`, a request that has already been
    /// delivered (its `dst_cycle` has been stamped). Carries `original`'s
    /// own cycle stamps forward so the issuing module can compute
    /// end-to-end latency once this response lands back on it.
    #[must_use]
    pub fn response(id: PacketId, original: &Packet, vc_id: usize, seq_num: u64, src_cycle: Cycle, payload: Vec<u8>) -> Self {
        Self {
            id,
            kind: PacketKind::Resp,
            payload,
            src_cycle,
            dst_cycle: src_cycle,
            vc_id,
            stream_id: original.stream_id,
            seq_num,
            credits: 0,
            original_req: Some(original.id),
            original_req_src_cycle: Some(original.src_cycle),
            original_req_dst_cycle: Some(original.dst_cycle),
        }
    }

    /// Build a streaming-data packet (e.g. a burst beat within a larger
    /// transfer), identified by `stream_id`/`seq_num` rather than a
    /// request/response pair.
    #[must_use]
    pub fn stream_data(id: PacketId, vc_id: usize, stream_id: u32, seq_num: u64, src_cycle: Cycle, payload: Vec<u8>) -> Self {
        Self {
            id,
            kind: PacketKind::StreamData,
            payload,
            src_cycle,
            dst_cycle: src_cycle,
            vc_id,
            stream_id,
            seq_num,
            credits: 0,
            original_req: None,
            original_req_src_cycle: None,
            original_req_dst_cycle: None,
        }
    }

    /// Build a credit-return packet handing `credits` buffer slots back to
    /// the peer on `stream_id`. Carries no payload.
    #[must_use]
    pub fn credit_return(id: PacketId, vc_id: usize, stream_id: u32, src_cycle: Cycle, credits: u32) -> Self {
        Self {
            id,
            kind: PacketKind::CreditReturn,
            payload: Vec::new(),
            src_cycle,
            dst_cycle: src_cycle,
            vc_id,
            stream_id,
            seq_num: 0,
            credits,
            original_req: None,
            original_req_src_cycle: None,
            original_req_dst_cycle: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> PacketId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    #[must_use]
    pub fn is_request(&self) -> bool {
        self.kind.is_request()
    }

    #[must_use]
    pub fn is_response(&self) -> bool {
        self.kind == PacketKind::Resp
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.kind == PacketKind::StreamData
    }

    #[must_use]
    pub fn is_credit(&self) -> bool {
        self.kind == PacketKind::CreditReturn
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    #[must_use]
    pub fn vc_id(&self) -> usize {
        self.vc_id
    }

    #[must_use]
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    #[must_use]
    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    #[must_use]
    pub fn credits(&self) -> u32 {
        self.credits
    }

    #[must_use]
    pub fn src_cycle(&self) -> Cycle {
        self.src_cycle
    }

    #[must_use]
    pub fn dst_cycle(&self) -> Cycle {
        self.dst_cycle
    }

    /// The request this packet answers, if it is a response.
    #[must_use]
    pub fn original_req(&self) -> Option<PacketId> {
        self.original_req
    }

    #[must_use]
    pub fn original_req_src_cycle(&self) -> Option<Cycle> {
        self.original_req_src_cycle
    }

    #[must_use]
    pub fn original_req_dst_cycle(&self) -> Option<Cycle> {
        self.original_req_dst_cycle
    }

    /// End-to-end delay of the request this response answers:
    /// `original_req.dst_cycle − original_req.src_cycle`. `None` on
    /// anything but a response.
    #[must_use]
    pub fn original_req_delay(&self) -> Option<u64> {
        match (self.original_req_dst_cycle, self.original_req_src_cycle) {
            (Some(dst), Some(src)) => Some(dst - src),
            _ => None,
        }
    }

    /// Mark this packet as having arrived at `cycle`. Called exactly once,
    /// by whichever port's `enqueue_input` first buffers it.
    pub fn stamp_dst_cycle(&mut self, cycle: Cycle) {
        debug_assert!(cycle >= self.src_cycle, "dst_cycle must not precede src_cycle");
        self.dst_cycle = cycle;
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_has_no_back_reference() {
        let req = Packet::request(PacketId(1), PacketKind::ReqRead, 0, 0, 0, 10, vec![1, 2, 3]);
        assert!(req.is_request());
        assert_eq!(req.original_req(), None);
        assert_eq!(req.byte_len(), 3);
        assert_eq!(req.src_cycle(), 10);
        assert_eq!(req.dst_cycle(), 10);
    }

    #[test]
    fn response_carries_forward_the_requests_own_timestamps() {
        let mut req = Packet::request(PacketId(7), PacketKind::ReqWrite, 1, 3, 0, 100, vec![]);
        req.stamp_dst_cycle(105);
        let resp = Packet::response(PacketId(8), &req, 1, 0, 105, vec![9]);
        assert!(resp.is_response());
        assert_eq!(resp.original_req(), Some(PacketId(7)));
        assert_eq!(resp.original_req_src_cycle(), Some(100));
        assert_eq!(resp.original_req_dst_cycle(), Some(105));
        assert_eq!(resp.original_req_delay(), Some(5));
        assert_eq!(resp.stream_id(), 3);
    }

    #[test]
    fn into_payload_consumes_the_packet() {
        let pkt = Packet::request(PacketId(1), PacketKind::ReqRead, 0, 0, 0, 0, vec![1, 2]);
        assert_eq!(pkt.into_payload(), vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "non-request kind")]
    fn request_rejects_non_request_kinds() {
        Packet::request(PacketId(1), PacketKind::Resp, 0, 0, 0, 0, vec![]);
    }
}
