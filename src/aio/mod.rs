// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Asynchronous engine: a pool of worker threads drives hierarchies of
//! state machines, one hierarchy per socket, each serialized by its
//! context. State machines never call each other across the hierarchy;
//! they raise events that are fed under the target context.

#[macro_use]
pub mod fsm;
pub mod ctx;
pub mod poller;
pub mod timerset;
pub mod timer;
pub mod worker;
pub mod pool;
pub mod usock;
pub mod backoff;
pub mod dns;
pub mod streamhdr;

use std::sync::{Arc, Weak};

use pipe::InprocEnd;

use self::ctx::{Ctx, CtxOps};

/// Address of a state machine inside a socket hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addr {
    /// The socket-wide machine.
    Sock,
    /// An endpoint machine.
    Ep(usize),
    /// A per-connection machine below a bound endpoint.
    Conn(usize, usize)
}

/// Who raised an event. The receiving machine dispatches on
/// `(state, source, event)`; an unknown triple is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Direct action performed by the owner of the machine.
    Action,
    /// Readiness reported by the poller for a registered fd.
    Fd,
    /// Async-socket operations hopping to the worker thread.
    TaskStart,
    TaskConnect,
    TaskAccept,
    TaskSend,
    TaskRecv,
    TaskStop,
    /// Name resolution task.
    Dns,
    /// Protocol-version handshake.
    Hdr,
    HandshakeTimer,
    ReconnectTimer,
    ResendTimer,
    DeadlineTimer,
    LingerTimer,
    /// A per-connection session reporting to its endpoint.
    Session,
    /// A pipe reporting availability to the socket.
    Pipe,
    /// The remote half of an inproc pipe.
    Peer,
    /// An endpoint reporting to the socket.
    Endpoint
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    Stopped,
    /// Fd is readable.
    In,
    /// Fd is writable.
    Out,
    /// Fd level error or hangup.
    Err,
    /// A task posted to the worker is being executed on the worker thread.
    Execute,
    Timeout,
    Established,
    Accepted,
    AcceptError,
    Sent,
    Received,
    Shutdown,
    Error,
    Done,
    CloseHandshake,
    /// Inproc peer queued a message for us.
    MsgIn,
    /// Inproc peer drained a message we were blocked on.
    MsgOut,
    PipeAdded,
    PipeRemoved
}

/// One queued event. `arg` disambiguates its origin (pipe id, timer
/// generation, peer endpoint id); `attach` carries a new inproc pipe end
/// across contexts when two inproc endpoints pair up.
pub struct QueuedEvent {
    pub dst: Addr,
    pub src: Source,
    pub event: Event,
    pub arg: usize,
    pub attach: Option<Box<InprocEnd>>
}

/// The two event queues of a context: events for machines of this
/// hierarchy, drained before the context unlocks, and events for other
/// contexts, delivered after it unlocks.
pub struct EventQueues {
    pub intra: ::std::collections::VecDeque<QueuedEvent>,
    pub cross: Vec<(Arc<Ctx>, QueuedEvent)>
}

impl EventQueues {
    pub fn new() -> EventQueues {
        EventQueues {
            intra: ::std::collections::VecDeque::new(),
            cross: Vec::new()
        }
    }

    pub fn raise(&mut self, dst: Addr, src: Source, event: Event, arg: usize) {
        self.intra.push_back(QueuedEvent {
            dst: dst,
            src: src,
            event: event,
            arg: arg,
            attach: None
        });
    }

    pub fn raise_to(&mut self, ctx: Arc<Ctx>, dst: Addr, src: Source, event: Event, arg: usize, attach: Option<Box<InprocEnd>>) {
        self.cross.push((ctx, QueuedEvent {
            dst: dst,
            src: src,
            event: event,
            arg: arg,
            attach: attach
        }));
    }
}

/// Where a worker or a peer context should feed an event:
/// context, machine address, source tag.
#[derive(Clone)]
pub struct EventTarget {
    pub ctx: Weak<Ctx>,
    pub dst: Addr,
    pub src: Source
}

impl EventTarget {
    pub fn new(ctx: &Arc<Ctx>, dst: Addr, src: Source) -> EventTarget {
        EventTarget {
            ctx: Arc::downgrade(ctx),
            dst: dst,
            src: src
        }
    }

    pub fn with_src(&self, src: Source) -> EventTarget {
        EventTarget {
            ctx: self.ctx.clone(),
            dst: self.dst,
            src: src
        }
    }

    /// Feeds the event under the target context.
    /// A dead context swallows the event, late deliveries during
    /// socket teardown are expected.
    pub fn deliver(&self, event: Event, arg: usize) {
        if let Some(ctx) = self.ctx.upgrade() {
            ctx.deliver(QueuedEvent {
                dst: self.dst,
                src: self.src,
                event: event,
                arg: arg,
                attach: None
            });
        }
    }
}
