// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The pipe is the carrier between a socket and one peer connection, as
//! the protocol sees it: half duplex in each direction, with explicit
//! availability states so a session completing an operation and a
//! protocol starting one never call into each other re-entrantly.

use std::sync::{Arc, Mutex, Weak};

use aio::{Addr, Event, EventQueues, Source};
use aio::ctx::Ctx;
use message::Message;
use options::EndpointOptions;
use transport::inproc::msgqueue::{MsgQueue, SendStatus};

/// The pipe yielded its slot back to the caller; the load balancer and
/// the fair queue rotate to another pipe until it announces again.
pub const PIPE_RELEASE: u32 = 1;
/// The protocol header was already split off the body by the carrier.
pub const PIPE_PARSED: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InState {
    Deactivated,
    Idle,
    Receiving,
    Received,
    Async
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutState {
    Deactivated,
    Idle,
    Sending,
    Sent,
    Async
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bound,
    Connected
}

/// The two directional queues shared by an inproc pipe pair.
pub struct InprocQueues {
    pub to_bound: Mutex<MsgQueue>,
    pub to_connected: Mutex<MsgQueue>
}

/// One end of an inproc pipe: bypasses the whole aio stack and talks to
/// the peer socket through shared message queues and cross-context
/// events. There is at most one inproc pipe between two endpoints, so
/// the peer endpoint id identifies the pipe on the other side.
pub struct InprocEnd {
    pub queues: Arc<InprocQueues>,
    pub side: Side,
    pub peer_ctx: Weak<Ctx>,
    pub peer_eid: usize,
    pub local_eid: usize,
    /// Message refused by the admission check, retried when the peer drains.
    pub pending: Option<Message>
}

impl InprocEnd {
    fn outgoing(&self) -> &Mutex<MsgQueue> {
        match self.side {
            Side::Bound => &self.queues.to_connected,
            Side::Connected => &self.queues.to_bound
        }
    }

    fn incoming(&self) -> &Mutex<MsgQueue> {
        match self.side {
            Side::Bound => &self.queues.to_bound,
            Side::Connected => &self.queues.to_connected
        }
    }
}

/// What actually moves the bytes behind a pipe.
pub enum Carrier {
    /// A per-connection session below an endpoint.
    Stream {
        eid: usize,
        cid: usize
    },
    Inproc(InprocEnd)
}

pub struct PipeBase {
    pub pid: usize,
    pub instate: InState,
    pub outstate: OutState,
    pub opts: EndpointOptions,
    pub carrier: Carrier
}

impl PipeBase {
    pub fn new(pid: usize, opts: EndpointOptions, carrier: Carrier) -> PipeBase {
        PipeBase {
            pid: pid,
            instate: InState::Deactivated,
            outstate: OutState::Deactivated,
            opts: opts,
            carrier: carrier
        }
    }
}

/// Makes the pipe visible to the protocol. Output is available right
/// away, input once the carrier reports the first message.
pub fn start(pb: &mut PipeBase, q: &mut EventQueues) {
    pb.instate = InState::Async;
    pb.outstate = OutState::Idle;
    q.raise(Addr::Sock, Source::Pipe, Event::PipeAdded, pb.pid);
}

/// Withdraws the pipe from the protocol.
pub fn stop(pb: &mut PipeBase, q: &mut EventQueues) {
    pb.instate = InState::Deactivated;
    pb.outstate = OutState::Deactivated;
    q.raise(Addr::Sock, Source::Pipe, Event::PipeRemoved, pb.pid);
}

/// The carrier completed an inbound message.
pub fn received(pb: &mut PipeBase, q: &mut EventQueues) {
    match pb.instate {
        InState::Receiving => pb.instate = InState::Received,
        InState::Async => {
            pb.instate = InState::Idle;
            q.raise(Addr::Sock, Source::Pipe, Event::In, pb.pid);
        },
        state => bad_state!("pipe(in)", state)
    }
}

/// The carrier completed an outbound message.
pub fn sent(pb: &mut PipeBase, q: &mut EventQueues) {
    match pb.outstate {
        OutState::Sending => pb.outstate = OutState::Sent,
        OutState::Async => {
            pb.outstate = OutState::Idle;
            q.raise(Addr::Sock, Source::Pipe, Event::Out, pb.pid);
        },
        state => bad_state!("pipe(out)", state)
    }
}

/// Inproc: push one message towards the peer socket.
/// Runs between `outstate = Sending` and the completion check.
pub fn inproc_send(pb: &mut PipeBase, q: &mut EventQueues, msg: Message) {
    let pid = pb.pid;
    let (status, peer) = match pb.carrier {
        Carrier::Inproc(ref mut end) => {
            let status = end.outgoing().lock().unwrap().send(msg);
            (status, (end.peer_ctx.clone(), end.peer_eid, end.local_eid))
        },
        _ => bad_state!("pipe(inproc)", pid)
    };

    match status {
        SendStatus::Ok => {
            sent(pb, q);
            notify_peer(q, &peer, Event::MsgIn);
        },
        SendStatus::OkFull => {
            // Queued, but the pipe stays withdrawn until the peer drains.
            notify_peer(q, &peer, Event::MsgIn);
        },
        SendStatus::Full(refused) => {
            if let Carrier::Inproc(ref mut end) = pb.carrier {
                end.pending = Some(refused);
            }
        }
    }
}

/// Inproc: pop the announced message.
/// Runs between `instate = Receiving` and the completion check.
pub fn inproc_recv(pb: &mut PipeBase, q: &mut EventQueues) -> Message {
    let (msg, more, peer) = match pb.carrier {
        Carrier::Inproc(ref mut end) => {
            let mut queue = end.incoming().lock().unwrap();
            let msg = queue.recv().expect("inproc pipe announced input it does not have");
            (msg, !queue.is_empty(), (end.peer_ctx.clone(), end.peer_eid, end.local_eid))
        },
        _ => bad_state!("pipe(inproc)", pb.pid)
    };

    notify_peer(q, &peer, Event::MsgOut);
    if more {
        received(pb, q);
    }
    msg
}

/// Inproc: the peer queued a message for us.
pub fn on_peer_msg_in(pb: &mut PipeBase, q: &mut EventQueues) {
    if pb.instate == InState::Async {
        received(pb, q);
    }
}

/// Inproc: the peer drained its side, retry a refused message and
/// reannounce output.
pub fn on_peer_msg_out(pb: &mut PipeBase, q: &mut EventQueues) {
    let retry = match pb.carrier {
        Carrier::Inproc(ref mut end) => end.pending.take(),
        _ => None
    };

    if let Some(msg) = retry {
        inproc_send(pb, q, msg);
        return;
    }

    if pb.outstate == OutState::Async {
        sent(pb, q);
    }
}

/// Whether the inproc carrier holds undelivered inbound messages.
pub fn inproc_has_input(pb: &PipeBase) -> bool {
    match pb.carrier {
        Carrier::Inproc(ref end) => !end.incoming().lock().unwrap().is_empty(),
        _ => false
    }
}

/// Tells the peer socket this pipe is gone.
pub fn inproc_notify_closed(pb: &PipeBase, q: &mut EventQueues) {
    if let Carrier::Inproc(ref end) = pb.carrier {
        notify_peer(q, &(end.peer_ctx.clone(), end.peer_eid, end.local_eid), Event::Shutdown);
    }
}

fn notify_peer(q: &mut EventQueues, peer: &(Weak<Ctx>, usize, usize), event: Event) {
    let &(ref ctx, peer_eid, local_eid) = peer;

    if let Some(ctx) = ctx.upgrade() {
        q.raise_to(ctx, Addr::Ep(peer_eid), Source::Peer, event, local_eid, None);
    }
}
