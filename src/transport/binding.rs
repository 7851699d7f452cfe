// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Bind-side endpoint machine shared by the stream transports: listen,
//! and for every accepted connection run a session of its own. A new
//! accept starts once the previous child reached its active session, so
//! a handshaking peer cannot starve the listener. Used by tcp, ipc
//! and ws.

use std::collections::HashMap;

use aio::{Addr, Event, EventTarget, QueuedEvent, Source};
use aio::usock::{Usock, UsockIo, UsockOut};
use ep::{self, EpView};
use message::Message;
use options::EndpointOptions;
use transport::{Session, SessionKind, SessionOut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Stopping
}

struct Conn {
    usock: Usock,
    session: Option<Session>,
    dying: bool
}

pub struct BindEp {
    state: State,
    eid: usize,
    addr_text: String,
    session_kind: SessionKind,
    opts: EndpointOptions,
    listener: Usock,
    conns: HashMap<usize, Conn>,
    next_cid: usize,
    accept_pending: bool,
    listener_stopped: bool,
    had_error: bool
}

impl BindEp {
    pub fn new(tc: &::transport::TransportCtx, addr_text: String, listener: Usock, session_kind: SessionKind) -> BindEp {
        BindEp {
            state: State::Active,
            eid: tc.eid,
            addr_text: addr_text,
            session_kind: session_kind,
            opts: tc.opts.clone(),
            listener: listener,
            conns: HashMap::new(),
            next_cid: 1,
            accept_pending: false,
            listener_stopped: false,
            had_error: false
        }
    }

    pub fn start(&mut self, _view: &mut EpView) {
        self.listener.accept();
        self.accept_pending = true;
    }

    fn start_accept(&mut self) {
        if self.state == State::Active && !self.accept_pending {
            self.listener.accept();
            self.accept_pending = true;
        }
    }

    fn spawn_child(&mut self, view: &mut EpView, io: UsockIo) {
        let cid = self.next_cid;
        self.next_cid += 1;

        let self_addr = Addr::Conn(self.eid, cid);
        let target = EventTarget::new(view.ctx, self_addr, Source::Fd);
        let mut usock = match Usock::from_accepted(view.worker.clone(), target, io) {
            Ok(usock) => usock,
            Err(err) => {
                let eid = self.eid;
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                self.start_accept();
                return;
            }
        };

        if let Some(io) = usock.io() {
            io.set_nodelay(self.opts.tcp_nodelay);
        }
        usock.activate();

        let mut session = Session::new(&self.session_kind, view, self_addr, self.opts.clone());
        session.start(&mut usock, view);

        view.stats.accepted_connections += 1;
        self.conns.insert(cid, Conn {
            usock: usock,
            session: Some(session),
            dying: false
        });
    }

    pub fn feed(&mut self, view: &mut EpView, event: QueuedEvent) {
        match event.dst {
            Addr::Ep(..) => self.on_listener(view, event.src, event.event),
            Addr::Conn(_, cid) => self.on_conn(view, cid, event.src, event.event, event.arg),
            Addr::Sock => bad_event!("binding endpoint", self.state, event.src, event.event)
        }
    }

    fn on_listener(&mut self, view: &mut EpView, src: Source, event: Event) {
        match self.listener.feed(src, event) {
            Some(UsockOut::Accepted(io)) => {
                self.accept_pending = false;
                if self.state == State::Active {
                    self.spawn_child(view, io);
                }
            },
            Some(UsockOut::AcceptError) => {
                self.accept_pending = false;
                view.stats.accept_errors += 1;
                let err = self.listener.take_last_error().
                    unwrap_or_else(|| ::io_error::other_io_error("accept failed"));
                let eid = self.eid;
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                // A later child completion kicks the accept loop again,
                // once fds may have been released.
            },
            Some(UsockOut::Stopped) => {
                self.listener_stopped = true;
                self.maybe_finish_stop(view);
            },
            Some(UsockOut::Error(err)) => {
                let eid = self.eid;
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
            },
            _ => {}
        }
    }

    fn on_conn(&mut self, view: &mut EpView, cid: usize, src: Source, event: Event, arg: usize) {
        enum Step {
            Session(Option<SessionOut>),
            Stopped,
            Ignored
        }

        let step = {
            let conn = match self.conns.get_mut(&cid) {
                Some(conn) => conn,
                None => return
            };

            match conn.session {
                Some(ref mut session) if !conn.dying =>
                    Step::Session(session.feed(&mut conn.usock, view, src, event, arg)),
                _ => match conn.usock.feed(src, event) {
                    Some(UsockOut::Stopped) => Step::Stopped,
                    _ => Step::Ignored
                }
            }
        };

        let out = match step {
            Step::Stopped => {
                self.conns.remove(&cid);
                self.maybe_finish_stop(view);
                self.start_accept();
                return;
            },
            Step::Ignored => return,
            Step::Session(out) => out
        };

        match out {
            Some(SessionOut::Activated) => {
                let eid = self.eid;
                ep::clear_error(view, &mut self.had_error);
                trace!("[{:?}] endpoint [{}] accepted session active", view.sock_id, eid);
                self.start_accept();
            },
            Some(SessionOut::Closed) => {
                view.stats.broken_connections += 1;
                self.kill_conn(view, cid);
            },
            Some(SessionOut::Error(err)) | Some(SessionOut::PeerGone(err)) => {
                view.stats.broken_connections += 1;
                debug!("[{:?}] accepted connection [{}] failed: {:?}", view.sock_id, cid, err);
                self.kill_conn(view, cid);
            },
            None => {}
        }
    }

    fn kill_conn(&mut self, view: &mut EpView, cid: usize) {
        if let Some(conn) = self.conns.get_mut(&cid) {
            if let Some(mut session) = conn.session.take() {
                session.teardown(view);
            }
            conn.dying = true;
            conn.usock.stop();
        }
        self.start_accept();
    }

    pub fn stop(&mut self, view: &mut EpView) {
        self.state = State::Stopping;
        self.listener.stop();

        let cids: Vec<usize> = self.conns.keys().cloned().collect();
        for cid in cids {
            if let Some(conn) = self.conns.get_mut(&cid) {
                if !conn.dying {
                    if let Some(mut session) = conn.session.take() {
                        session.teardown(view);
                    }
                    conn.dying = true;
                    conn.usock.stop();
                }
            }
        }
        self.maybe_finish_stop(view);
    }

    fn maybe_finish_stop(&mut self, view: &mut EpView) {
        if self.state == State::Stopping && self.listener_stopped && self.conns.is_empty() {
            let eid = self.eid;
            ep::raise_stopped(view, eid);
        }
    }

    pub fn send_on_pipe(&mut self, cid: usize, msg: Message) {
        let conn = self.conns.get_mut(&cid).expect("send on a dead connection");
        let session = conn.session.as_mut().expect("send on a dead session");
        session.send(&mut conn.usock, msg);
    }

    pub fn recv_on_pipe(&mut self, cid: usize, pipes: &mut ::std::collections::HashMap<usize, ::pipe::PipeBase>, q: &mut ::aio::EventQueues) -> Message {
        let conn = self.conns.get_mut(&cid).expect("recv on a dead connection");
        let session = conn.session.as_mut().expect("recv on a dead session");
        session.recv_collect(&mut conn.usock, pipes, q)
    }
}
