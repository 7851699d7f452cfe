// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The socket-wide machine: owns the protocol, the endpoint list and the
//! pipe set, routes events into them and mirrors the protocol readiness
//! into the gates the blocking calls wait on.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use aio::{Addr, Event, EventQueues, QueuedEvent, Source};
use aio::ctx::Ctx;
use aio::worker::Worker;
use efd::Efd;
use ep::{Ep, EpView};
use global::{IdSequence, SocketId, SocketType};
use message::Message;
use options::{SocketOption, SocketOptions};
use pipe::{InState, PipeBase};
use protocol::{self, PipeSet, Sockbase, EVENT_IN, EVENT_OUT};
use stats::Stats;
use transport::{self, TransportCtx};
use transport::inproc::InprocRegistry;
use io_error::{invalid_input_io_error, term_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockState {
    Active,
    /// Close requested; endpoints are tearing down.
    StoppingEps,
    /// Everything is gone; the termination gate is up.
    Fini
}

pub struct SockCore {
    pub id: SocketId,
    pub socktype: SocketType,
    pub state: SockState,
    /// Set on close and on session termination; blocked calls wake up
    /// and fail instead of waiting forever.
    pub zombie: bool,
    pub protocol: Box<Sockbase>,
    pub opts: SocketOptions,
    pub eps: HashMap<usize, Ep>,
    pub pipes: HashMap<usize, PipeBase>,
    pub q: EventQueues,
    pub worker: Arc<Worker>,
    pub send_efd: Arc<Efd>,
    pub recv_efd: Arc<Efd>,
    pub term_efd: Arc<Efd>,
    pub next_pipe_id: usize,
    pub eid_seq: IdSequence,
    pub stats: Stats,
    pub print_errors: bool,
    pub registry: Arc<InprocRegistry>
}

impl SockCore {
    pub fn new(
        id: SocketId,
        socktype: SocketType,
        worker: Arc<Worker>,
        eid_seq: IdSequence,
        registry: Arc<InprocRegistry>,
        print_errors: bool) -> SockCore {
        SockCore {
            id: id,
            socktype: socktype,
            state: SockState::Active,
            zombie: false,
            protocol: protocol::create_sockbase(socktype),
            opts: SocketOptions::default(),
            eps: HashMap::new(),
            pipes: HashMap::new(),
            q: EventQueues::new(),
            worker: worker,
            send_efd: Arc::new(Efd::new()),
            recv_efd: Arc::new(Efd::new()),
            term_efd: Arc::new(Efd::new()),
            next_pipe_id: 1,
            eid_seq: eid_seq,
            stats: Stats::new(),
            print_errors: print_errors,
            registry: registry
        }
    }
}

/// Routes one event into the hierarchy. Runs under the context.
pub fn feed(ctx: &Arc<Ctx>, core: &mut SockCore, event: QueuedEvent) {
    match event.dst {
        Addr::Sock => feed_sock(core, event),
        Addr::Ep(eid) | Addr::Conn(eid, _) => {
            let SockCore {
                ref mut eps,
                ref mut pipes,
                ref mut q,
                ref worker,
                ref mut stats,
                ref mut next_pipe_id,
                id,
                socktype,
                print_errors,
                ..
            } = *core;

            match eps.get_mut(&eid) {
                Some(ep) => {
                    let mut view = EpView {
                        sock_id: id,
                        socktype: socktype,
                        q: q,
                        pipes: pipes,
                        worker: worker,
                        ctx: ctx,
                        next_pipe_id: next_pipe_id,
                        stats: stats,
                        print_errors: print_errors
                    };
                    ep.feed(&mut view, event);
                },
                None => trace!("[{:?}] event for a gone endpoint [{}]", id, eid)
            }
        }
    }
}

fn feed_sock(core: &mut SockCore, event: QueuedEvent) {
    match event.src {
        Source::Pipe => on_pipe_event(core, event.event, event.arg),
        Source::ResendTimer | Source::DeadlineTimer => {
            let SockCore { ref mut protocol, ref mut pipes, ref mut eps, ref mut q, .. } = *core;
            let mut set = PipeSet { pipes: pipes, eps: eps, q: q };
            protocol.on_timer(&mut set, event.src, event.event, event.arg);
        },
        Source::Endpoint => match event.event {
            Event::Stopped => {
                core.eps.remove(&event.arg);
                check_eps_done(core);
            },
            event => bad_event!("sock", core.state, Source::Endpoint, event)
        },
        src => bad_event!("sock", core.state, src, event.event)
    }
}

fn on_pipe_event(core: &mut SockCore, event: Event, pid: usize) {
    // A pipe may die between raising and draining; events for withdrawn
    // pipes are dropped here.
    let active = core.pipes.get(&pid).
        map(|pb| pb.instate != InState::Deactivated).
        unwrap_or(false);

    {
        let SockCore { ref mut protocol, ref mut pipes, ref mut eps, ref mut q, .. } = *core;
        let mut set = PipeSet { pipes: pipes, eps: eps, q: q };

        match event {
            Event::PipeAdded if active => {
                protocol.add_pipe(&mut set, pid);
                protocol.on_pipe_out(&mut set, pid);
            },
            Event::In if active => protocol.on_pipe_in(&mut set, pid),
            Event::Out if active => protocol.on_pipe_out(&mut set, pid),
            Event::PipeRemoved => protocol.remove_pipe(&mut set, pid),
            Event::PipeAdded | Event::In | Event::Out => {},
            event => bad_event!("sock", SockState::Active, Source::Pipe, event)
        }
    }

    if event == Event::PipeRemoved {
        core.pipes.remove(&pid);
        core.stats.dropped_connections += 1;
    }
}

/// Refreshes the blocking gates from the protocol readiness; runs on
/// every context leave so user threads observe the latest levels.
pub fn on_leave(core: &mut SockCore) {
    let events = core.protocol.events();

    core.send_efd.set_level(core.zombie || events & EVENT_OUT != 0);
    core.recv_efd.set_level(core.zombie || events & EVENT_IN != 0);

    if core.state == SockState::Fini {
        core.term_efd.signal();
    }
}

/// Creates and starts an endpoint; returns its id.
pub fn add_endpoint(ctx: &Arc<Ctx>, core: &mut SockCore, address: &str, is_bind: bool) -> io::Result<usize> {
    if core.zombie {
        return Err(term_error());
    }

    let eid = core.eid_seq.next();
    let snapshot = core.opts.endpoint_snapshot();
    let kind = {
        let tc = TransportCtx {
            sock_id: core.id,
            socktype: core.socktype,
            eid: eid,
            opts: &snapshot,
            worker: &core.worker,
            ctx: ctx,
            registry: &core.registry
        };
        transport::create_endpoint(&tc, address, is_bind)
    };
    let kind = match kind {
        Ok(kind) => kind,
        Err(err) => {
            if is_bind {
                core.stats.bind_errors += 1;
            } else {
                core.stats.connect_errors += 1;
            }
            return Err(err);
        }
    };

    core.eps.insert(eid, Ep::new(eid, address.to_owned(), snapshot, kind));

    let SockCore {
        ref mut eps,
        ref mut pipes,
        ref mut q,
        ref worker,
        ref mut stats,
        ref mut next_pipe_id,
        id,
        socktype,
        print_errors,
        ..
    } = *core;
    let mut view = EpView {
        sock_id: id,
        socktype: socktype,
        q: q,
        pipes: pipes,
        worker: worker,
        ctx: ctx,
        next_pipe_id: next_pipe_id,
        stats: stats,
        print_errors: print_errors
    };
    eps.get_mut(&eid).unwrap().start(&mut view);

    Ok(eid)
}

/// Removes one endpoint from a live socket.
pub fn shutdown_endpoint(ctx: &Arc<Ctx>, core: &mut SockCore, eid: usize) -> io::Result<()> {
    if core.zombie {
        return Err(term_error());
    }

    let SockCore {
        ref mut eps,
        ref mut pipes,
        ref mut q,
        ref worker,
        ref mut stats,
        ref mut next_pipe_id,
        id,
        socktype,
        print_errors,
        ..
    } = *core;

    match eps.get_mut(&eid) {
        Some(ep) => {
            let mut view = EpView {
                sock_id: id,
                socktype: socktype,
                q: q,
                pipes: pipes,
                worker: worker,
                ctx: ctx,
                next_pipe_id: next_pipe_id,
                stats: stats,
                print_errors: print_errors
            };
            ep.stop(&mut view);
            Ok(())
        },
        None => Err(invalid_input_io_error("no such endpoint"))
    }
}

/// One send attempt; would-block is reported for the caller to wait on
/// the send gate.
pub fn try_send(core: &mut SockCore, msg: Message) -> io::Result<()> {
    if core.zombie {
        return Err(term_error());
    }

    let len = msg.len() as u64;
    let result = {
        let SockCore { ref mut protocol, ref mut pipes, ref mut eps, ref mut q, .. } = *core;
        let mut set = PipeSet { pipes: pipes, eps: eps, q: q };
        protocol.send(&mut set, msg)
    };

    if result.is_ok() {
        core.stats.messages_sent += 1;
        core.stats.bytes_sent += len;
    }
    result
}

/// One receive attempt; would-block is reported for the caller to wait
/// on the receive gate.
pub fn try_recv(core: &mut SockCore) -> io::Result<Message> {
    if core.zombie {
        return Err(term_error());
    }

    let result = {
        let SockCore { ref mut protocol, ref mut pipes, ref mut eps, ref mut q, .. } = *core;
        let mut set = PipeSet { pipes: pipes, eps: eps, q: q };
        protocol.recv(&mut set)
    };

    if let Ok(ref msg) = result {
        core.stats.messages_received += 1;
        core.stats.bytes_received += msg.len() as u64;
    }
    result
}

pub fn set_option(core: &mut SockCore, option: SocketOption) -> io::Result<()> {
    if core.zombie {
        return Err(term_error());
    }

    match option {
        SocketOption::Linger(value) => core.opts.linger = value,
        SocketOption::SendBuffer(value) => core.opts.send_buffer = value,
        SocketOption::RecvBuffer(value) => core.opts.recv_buffer = value,
        SocketOption::SendTimeout(value) => core.opts.send_timeout = value,
        SocketOption::RecvTimeout(value) => core.opts.recv_timeout = value,
        SocketOption::ReconnectInterval(value) => core.opts.reconnect_ivl = value,
        SocketOption::ReconnectIntervalMax(value) => core.opts.reconnect_ivl_max = value,
        SocketOption::SendPriority(value) => {
            if value < 1 || value > 16 {
                return Err(invalid_input_io_error("priority must be between 1 and 16"));
            }
            core.opts.send_priority = value;
        },
        SocketOption::RecvPriority(value) => {
            if value < 1 || value > 16 {
                return Err(invalid_input_io_error("priority must be between 1 and 16"));
            }
            core.opts.recv_priority = value;
        },
        SocketOption::Ipv4Only(value) => core.opts.ipv4only = value,
        SocketOption::SocketName(value) => {
            if value.len() > 63 {
                return Err(invalid_input_io_error("socket name too long"));
            }
            core.opts.socket_name = Some(value);
        },
        SocketOption::RecvMaxSize(value) => core.opts.recv_max_size = value,
        SocketOption::TcpNoDelay(value) => core.opts.tcp_nodelay = value,
        SocketOption::WsMsgType(value) => core.opts.ws_msg_type = value,
        protocol_option => return core.protocol.set_option(&protocol_option)
    }
    Ok(())
}

/// Starts the asynchronous close: wakes blocked calls, stops the
/// protocol and every endpoint. The termination gate goes up when the
/// last endpoint is gone.
pub fn start_close(ctx: &Arc<Ctx>, core: &mut SockCore) {
    core.zombie = true;
    if core.state != SockState::Active {
        return;
    }

    core.state = SockState::StoppingEps;
    core.protocol.stop();

    let eids: Vec<usize> = core.eps.keys().cloned().collect();
    for eid in eids {
        let SockCore {
            ref mut eps,
            ref mut pipes,
            ref mut q,
            ref worker,
            ref mut stats,
            ref mut next_pipe_id,
            id,
            socktype,
            print_errors,
            ..
        } = *core;
        if let Some(ep) = eps.get_mut(&eid) {
            let mut view = EpView {
                sock_id: id,
                socktype: socktype,
                q: q,
                pipes: pipes,
                worker: worker,
                ctx: ctx,
                next_pipe_id: next_pipe_id,
                stats: stats,
                print_errors: print_errors
            };
            ep.stop(&mut view);
        }
    }
    check_eps_done(core);
}

/// The session is terminating: blocked and future calls fail without
/// tearing the socket down; close still does that.
pub fn zombify(core: &mut SockCore) {
    core.zombie = true;
}

fn check_eps_done(core: &mut SockCore) {
    if core.state == SockState::StoppingEps && core.eps.is_empty() {
        core.state = SockState::Fini;
        debug!("[{:?}] socket reached its terminal state", core.id);
    }
}
