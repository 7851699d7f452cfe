// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Connect-side endpoint machine shared by the stream transports:
//! resolve, connect, run the session, and on any failure retry with
//! exponential backoff. Used by tcp, ipc and ws.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use aio::{Addr, Event, QueuedEvent, Source};
use aio::backoff::Backoff;
use aio::dns::{Dns, DnsOut};
use aio::EventTarget;
use aio::usock::{Usock, UsockOut};
use ep::{self, EpView};
use message::Message;
use options::EndpointOptions;
use transport::addr::{TcpAddr, TcpHost};
use transport::{Session, SessionKind, SessionOut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Resolving,
    Connecting,
    Active,
    /// Connection went down; waiting for the usock teardown before
    /// entering the backoff wait.
    StoppingUsock,
    /// Backoff timer running.
    Waiting,
    StoppingBackoff,
    /// Endpoint teardown in progress.
    Stopping,
    /// The peer told us not to come back.
    PeerGone
}

/// Where this endpoint connects to.
pub enum Remote {
    Tcp(TcpAddr),
    Ipc(PathBuf)
}

pub struct ConnEp {
    state: State,
    self_addr: Addr,
    addr_text: String,
    remote: Remote,
    session_kind: SessionKind,
    opts: EndpointOptions,
    usock: Option<Usock>,
    session: Option<Session>,
    dns: Dns,
    backoff: Backoff,
    had_error: bool,
    stopping: bool
}

impl ConnEp {
    pub fn new(view_ctx: &::transport::TransportCtx, addr_text: String, remote: Remote, session_kind: SessionKind) -> ConnEp {
        let self_addr = Addr::Ep(view_ctx.eid);
        let dns_target = EventTarget::new(view_ctx.ctx, self_addr, Source::Dns);
        let backoff_target = EventTarget::new(view_ctx.ctx, self_addr, Source::ReconnectTimer);
        let opts = view_ctx.opts.clone();

        ConnEp {
            state: State::Idle,
            self_addr: self_addr,
            addr_text: addr_text,
            remote: remote,
            session_kind: session_kind,
            opts: opts.clone(),
            usock: None,
            session: None,
            dns: Dns::new(view_ctx.worker.clone(), dns_target),
            backoff: Backoff::new(
                view_ctx.worker.clone(),
                backoff_target,
                opts.reconnect_ivl,
                opts.max_backoff()),
            had_error: false,
            stopping: false
        }
    }

    fn eid(&self) -> usize {
        match self.self_addr {
            Addr::Ep(eid) => eid,
            _ => unreachable!()
        }
    }

    pub fn start(&mut self, view: &mut EpView) {
        self.begin_attempt(view);
    }

    /// One connection attempt: resolve when the remote is a name,
    /// connect straight away otherwise.
    fn begin_attempt(&mut self, view: &mut EpView) {
        match self.remote {
            Remote::Tcp(ref tcp) => match tcp.host {
                TcpHost::Name(ref name) => {
                    let (name, port, ipv4only) = (name.clone(), tcp.port, self.opts.ipv4only);
                    self.state = State::Resolving;
                    self.dns.start(&name, port, ipv4only);
                    return;
                },
                _ => match tcp.literal_addr() {
                    Some(addr) => self.connect_tcp(view, addr),
                    None => self.attempt_failed(view, invalid_input_error())
                }
            },
            Remote::Ipc(ref path) => {
                let path = path.clone();
                let target = EventTarget::new(view.ctx, self.self_addr, Source::Fd);
                match Usock::unix_connect(view.worker.clone(), target, &path) {
                    Ok(usock) => {
                        self.usock = Some(usock);
                        self.state = State::Connecting;
                    },
                    Err(err) => self.attempt_failed(view, err)
                }
            }
        }
    }

    fn connect_tcp(&mut self, view: &mut EpView, addr: SocketAddr) {
        let target = EventTarget::new(view.ctx, self.self_addr, Source::Fd);

        match Usock::tcp_connect(view.worker.clone(), target, &addr) {
            Ok(usock) => {
                self.usock = Some(usock);
                self.state = State::Connecting;
            },
            Err(err) => self.attempt_failed(view, err)
        }
    }

    /// Records the failure and enters the backoff wait.
    fn attempt_failed(&mut self, view: &mut EpView, err: io::Error) {
        let eid = self.eid();
        ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
        view.stats.connect_errors += 1;

        if self.stopping {
            self.finish_stop(view);
            return;
        }
        self.state = State::Waiting;
        self.backoff.start();
    }

    fn activate(&mut self, view: &mut EpView) {
        let usock = self.usock.as_mut().unwrap();

        if let Some(io) = usock.io() {
            io.set_nodelay(self.opts.tcp_nodelay);
        }
        usock.activate();

        let mut session = Session::new(&self.session_kind, view, self.self_addr, self.opts.clone());
        session.start(usock, view);
        self.session = Some(session);
        self.state = State::Active;
    }

    /// Session or connection went down: detach the pipe and stop the
    /// usock; the backoff wait starts once it acknowledges.
    fn teardown_connection(&mut self, view: &mut EpView, peer_gone: bool) {
        if let Some(mut session) = self.session.take() {
            session.teardown(view);
        }
        match self.usock {
            Some(ref mut usock) => {
                usock.stop();
                self.state = if self.stopping {
                    State::Stopping
                } else if peer_gone {
                    State::PeerGone
                } else {
                    State::StoppingUsock
                };
            },
            None => {
                if self.stopping {
                    self.finish_stop(view);
                } else if peer_gone {
                    self.state = State::PeerGone;
                } else {
                    self.state = State::Waiting;
                    self.backoff.start();
                }
            }
        }
    }

    pub fn stop(&mut self, view: &mut EpView) {
        self.stopping = true;
        self.dns.stop();
        self.backoff.stop();

        if let Some(mut session) = self.session.take() {
            session.teardown(view);
        }
        match self.usock {
            Some(ref mut usock) => {
                usock.stop();
                self.state = State::Stopping;
            },
            None => self.finish_stop(view)
        }
    }

    fn finish_stop(&mut self, view: &mut EpView) {
        let eid = self.eid();
        self.state = State::Idle;
        ep::raise_stopped(view, eid);
    }

    pub fn feed(&mut self, view: &mut EpView, event: QueuedEvent) {
        match event.src {
            Source::Dns => self.on_dns(view, event.event),
            Source::ReconnectTimer => self.on_backoff(view, event.event, event.arg),
            Source::HandshakeTimer => self.on_session(view, event.src, event.event, event.arg),
            Source::Fd | Source::TaskConnect | Source::TaskSend | Source::TaskRecv |
            Source::TaskStop | Source::TaskStart | Source::TaskAccept =>
                self.on_usock(view, event.src, event.event),
            src => bad_event!("connecting endpoint", self.state, src, event.event)
        }
    }

    fn on_dns(&mut self, view: &mut EpView, event: Event) {
        match self.dns.feed(event) {
            Some(DnsOut::Done(Ok(addrs))) => {
                if self.state == State::Resolving {
                    self.connect_tcp(view, addrs[0]);
                }
            },
            Some(DnsOut::Done(Err(err))) => {
                if self.state == State::Resolving {
                    self.attempt_failed(view, err);
                }
            },
            Some(DnsOut::Stopped) => {
                if self.stopping && self.usock.is_none() {
                    self.finish_stop(view);
                }
            },
            None => {}
        }
    }

    fn on_backoff(&mut self, view: &mut EpView, event: Event, arg: usize) {
        match self.backoff.feed(event, arg) {
            Some(Event::Timeout) => {
                if self.state == State::Waiting {
                    self.backoff.stop();
                    self.state = State::StoppingBackoff;
                }
            },
            Some(Event::Stopped) => {
                if self.state == State::StoppingBackoff {
                    self.begin_attempt(view);
                } else if self.stopping && self.usock.is_none() && self.dns.is_idle() {
                    self.finish_stop(view);
                }
            },
            _ => {}
        }
    }

    fn on_session(&mut self, view: &mut EpView, src: Source, event: Event, arg: usize) {
        let out = match self.session {
            Some(ref mut session) => {
                let usock = self.usock.as_mut().expect("session without a usock");
                session.feed(usock, view, src, event, arg)
            },
            None => return
        };

        match out {
            Some(SessionOut::Activated) => {
                view.stats.established_connections += 1;
                let eid = self.eid();
                ep::clear_error(view, &mut self.had_error);
                self.backoff.reset();
                trace!("[{:?}] endpoint [{}] session active", view.sock_id, eid);
            },
            Some(SessionOut::Closed) => {
                view.stats.broken_connections += 1;
                self.teardown_connection(view, false);
            },
            Some(SessionOut::Error(err)) => {
                view.stats.broken_connections += 1;
                let eid = self.eid();
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                self.teardown_connection(view, false);
            },
            Some(SessionOut::PeerGone(err)) => {
                let eid = self.eid();
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                self.teardown_connection(view, true);
            },
            None => {}
        }
    }

    fn on_usock(&mut self, view: &mut EpView, src: Source, event: Event) {
        if self.session.is_some() && self.state == State::Active {
            self.on_session(view, src, event, 0);
            return;
        }

        let out = match self.usock {
            Some(ref mut usock) => usock.feed(src, event),
            None => return
        };

        match (self.state, out) {
            (State::Connecting, Some(UsockOut::Established)) => self.activate(view),
            (State::Connecting, Some(UsockOut::Error(err))) => {
                // The fd is already gone; go straight to the wait.
                self.usock = None;
                self.attempt_failed(view, err);
            },
            (State::StoppingUsock, Some(UsockOut::Stopped)) |
            (State::Stopping, Some(UsockOut::Stopped)) |
            (State::PeerGone, Some(UsockOut::Stopped)) => {
                self.usock = None;
                if self.stopping {
                    self.finish_stop(view);
                } else if self.state == State::PeerGone {
                    debug!("[{:?}] endpoint [{}] not reconnecting", view.sock_id, self.eid());
                } else {
                    self.state = State::Waiting;
                    self.backoff.start();
                }
            },
            (_, Some(UsockOut::Error(..))) | (_, None) => {},
            (state, _) => bad_event!("connecting endpoint", state, src, event)
        }
    }

    pub fn send_on_pipe(&mut self, msg: Message) {
        let session = self.session.as_mut().expect("send on a dead session");
        let usock = self.usock.as_mut().unwrap();
        session.send(usock, msg);
    }

    pub fn recv_on_pipe(&mut self, pipes: &mut ::std::collections::HashMap<usize, ::pipe::PipeBase>, q: &mut ::aio::EventQueues) -> Message {
        let session = self.session.as_mut().expect("recv on a dead session");
        let usock = self.usock.as_mut().unwrap();
        session.recv_collect(usock, pipes, q)
    }
}

fn invalid_input_error() -> io::Error {
    ::io_error::invalid_input_io_error("address cannot be connected to")
}
