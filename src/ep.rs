// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! One bound or connected endpoint of a socket. The endpoint owns the
//! transport-specific machinery driving (re)connection or listening and
//! the per-connection sessions below it.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use aio::{Addr, Event, EventQueues, QueuedEvent, Source};
use aio::ctx::Ctx;
use aio::worker::Worker;
use global::SocketId;
use global::SocketType;
use message::Message;
use options::EndpointOptions;
use pipe::PipeBase;
use stats::Stats;
use transport::connecting::ConnEp;
use transport::binding::BindEp;
use transport::tcpmux::{BtcpmuxEp, CtcpmuxEp};
use transport::inproc::InprocEp;

/// The slice of the socket a transport machine is allowed to touch:
/// everything except the other endpoints and the protocol.
pub struct EpView<'a> {
    pub sock_id: SocketId,
    pub socktype: SocketType,
    pub q: &'a mut EventQueues,
    pub pipes: &'a mut HashMap<usize, PipeBase>,
    pub worker: &'a Arc<Worker>,
    pub ctx: &'a Arc<Ctx>,
    pub next_pipe_id: &'a mut usize,
    pub stats: &'a mut Stats,
    pub print_errors: bool
}

impl<'a> EpView<'a> {
    pub fn alloc_pipe_id(&mut self) -> usize {
        let pid = *self.next_pipe_id;
        *self.next_pipe_id += 1;
        pid
    }
}

pub enum EpKind {
    Connecting(ConnEp),
    Binding(BindEp),
    TcpmuxConnecting(CtcpmuxEp),
    TcpmuxBinding(BtcpmuxEp),
    Inproc(InprocEp)
}

pub struct Ep {
    pub eid: usize,
    pub addr: String,
    pub opts: EndpointOptions,
    pub kind: EpKind
}

impl Ep {
    pub fn new(eid: usize, addr: String, opts: EndpointOptions, kind: EpKind) -> Ep {
        Ep {
            eid: eid,
            addr: addr,
            opts: opts,
            kind: kind
        }
    }

    pub fn start(&mut self, view: &mut EpView) {
        debug!("[{:?}] endpoint [{}] starting: '{}'", view.sock_id, self.eid, self.addr);
        match self.kind {
            EpKind::Connecting(ref mut ep) => ep.start(view),
            EpKind::Binding(ref mut ep) => ep.start(view),
            EpKind::TcpmuxConnecting(ref mut ep) => ep.start(view),
            EpKind::TcpmuxBinding(ref mut ep) => ep.start(view),
            EpKind::Inproc(ref mut ep) => ep.start(view)
        }
    }

    pub fn feed(&mut self, view: &mut EpView, event: QueuedEvent) {
        match self.kind {
            EpKind::Connecting(ref mut ep) => ep.feed(view, event),
            EpKind::Binding(ref mut ep) => ep.feed(view, event),
            EpKind::TcpmuxConnecting(ref mut ep) => ep.feed(view, event),
            EpKind::TcpmuxBinding(ref mut ep) => ep.feed(view, event),
            EpKind::Inproc(ref mut ep) => ep.feed(view, event)
        }
    }

    /// Starts the asynchronous teardown; `Event::Stopped` is raised to
    /// the socket with the endpoint id once everything below is gone.
    pub fn stop(&mut self, view: &mut EpView) {
        debug!("[{:?}] endpoint [{}] stopping: '{}'", view.sock_id, self.eid, self.addr);
        match self.kind {
            EpKind::Connecting(ref mut ep) => ep.stop(view),
            EpKind::Binding(ref mut ep) => ep.stop(view),
            EpKind::TcpmuxConnecting(ref mut ep) => ep.stop(view),
            EpKind::TcpmuxBinding(ref mut ep) => ep.stop(view),
            EpKind::Inproc(ref mut ep) => ep.stop(view)
        }
    }

    /// Routes an outbound message into the session behind a pipe.
    pub fn send_on_pipe(&mut self, cid: usize, msg: Message) {
        match self.kind {
            EpKind::Connecting(ref mut ep) => ep.send_on_pipe(msg),
            EpKind::Binding(ref mut ep) => ep.send_on_pipe(cid, msg),
            EpKind::TcpmuxConnecting(ref mut ep) => ep.send_on_pipe(msg),
            EpKind::TcpmuxBinding(ref mut ep) => ep.send_on_pipe(cid, msg),
            EpKind::Inproc(..) => bad_state!("endpoint(send)", self.eid)
        }
    }

    /// Collects the announced inbound message from the session behind a
    /// pipe and rearms its read.
    pub fn recv_on_pipe(&mut self, cid: usize, pipes: &mut HashMap<usize, PipeBase>, q: &mut EventQueues) -> Message {
        match self.kind {
            EpKind::Connecting(ref mut ep) => ep.recv_on_pipe(pipes, q),
            EpKind::Binding(ref mut ep) => ep.recv_on_pipe(cid, pipes, q),
            EpKind::TcpmuxConnecting(ref mut ep) => ep.recv_on_pipe(pipes, q),
            EpKind::TcpmuxBinding(ref mut ep) => ep.recv_on_pipe(cid, pipes, q),
            EpKind::Inproc(..) => bad_state!("endpoint(recv)", self.eid)
        }
    }
}

/// Records a failure on an endpoint: raises the error level statistic
/// once per failure episode and, when enabled through the environment,
/// reports it on stderr. Recovery is the endpoint's backoff loop, not
/// the caller's concern.
pub fn set_error(view: &mut EpView, eid: usize, addr: &str, err: &io::Error, had_error: &mut bool) {
    if !*had_error {
        *had_error = true;
        view.stats.current_ep_errors += 1;
    }
    if view.print_errors {
        eprintln!("gridmq: socket {:?} endpoint {} ({}): {}", view.sock_id, eid, addr, err);
    }
}

/// The endpoint recovered; undo its contribution to the error level.
pub fn clear_error(view: &mut EpView, had_error: &mut bool) {
    if *had_error {
        *had_error = false;
        if view.stats.current_ep_errors > 0 {
            view.stats.current_ep_errors -= 1;
        }
    }
}

/// Raises the final stop acknowledgement for an endpoint.
pub fn raise_stopped(view: &mut EpView, eid: usize) {
    view.q.raise(Addr::Sock, Source::Endpoint, Event::Stopped, eid);
}
