// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! TCPMUX transport: `tcpmux://[iface;]host:port/service`. The bind side
//! does not listen itself: it registers the service with the local
//! multiplexer daemon over a unix socket and receives established
//! connections as file descriptors passed with `SCM_RIGHTS`. The connect
//! side is ordinary TCP prefixed with the RFC 1078 service request line.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::FromRawFd;
use std::path::PathBuf;

use aio::{Addr, Event, EventTarget, QueuedEvent, Source};
use aio::backoff::Backoff;
use aio::dns::{Dns, DnsOut};
use aio::usock::{Usock, UsockIo, UsockOut};
use ep::{self, EpKind, EpView};
use message::Message;
use mio;
use options::EndpointOptions;
use transport::{Session, SessionKind, SessionOut, Transport, TransportCtx};
use transport::addr::{parse_tcp, TcpAddr, TcpHost};
use io_error::{invalid_data_io_error, invalid_input_io_error};

pub struct TcpmuxTransport;

fn split_service(rest: &str) -> io::Result<(&str, &str)> {
    match rest.find('/') {
        Some(position) if position + 1 < rest.len() =>
            Ok((&rest[..position], &rest[position + 1..])),
        _ => Err(invalid_input_io_error("missing tcpmux service name"))
    }
}

impl Transport for TcpmuxTransport {
    fn scheme(&self) -> &'static str {
        "tcpmux"
    }

    fn bind(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        let (hostpart, service) = split_service(rest)?;
        let parsed = parse_tcp(hostpart, None)?;

        Ok(EpKind::TcpmuxBinding(BtcpmuxEp::new(
            tc,
            format!("tcpmux://{}", rest),
            parsed.port,
            service.to_owned())))
    }

    fn connect(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        let (hostpart, service) = split_service(rest)?;
        let parsed = parse_tcp(hostpart, None)?;

        Ok(EpKind::TcpmuxConnecting(CtcpmuxEp::new(
            tc,
            format!("tcpmux://{}", rest),
            parsed,
            service.to_owned())))
    }
}

/******************************************************************************/
/*  Connect side.                                                             */
/******************************************************************************/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CState {
    Idle,
    Resolving,
    Connecting,
    /// Service request line on the wire.
    SendingMuxHdr,
    /// Waiting for the `+`/`-` response line.
    ReceivingMuxHdr,
    Active,
    StoppingUsock,
    Waiting,
    StoppingBackoff,
    Stopping
}

pub struct CtcpmuxEp {
    state: CState,
    self_addr: Addr,
    addr_text: String,
    remote: TcpAddr,
    service: String,
    opts: EndpointOptions,
    usock: Option<Usock>,
    session: Option<Session>,
    line: Vec<u8>,
    dns: Dns,
    backoff: Backoff,
    had_error: bool,
    stopping: bool
}

impl CtcpmuxEp {
    fn new(tc: &TransportCtx, addr_text: String, remote: TcpAddr, service: String) -> CtcpmuxEp {
        let self_addr = Addr::Ep(tc.eid);
        let opts = tc.opts.clone();

        CtcpmuxEp {
            state: CState::Idle,
            self_addr: self_addr,
            addr_text: addr_text,
            remote: remote,
            service: service,
            opts: opts.clone(),
            usock: None,
            session: None,
            line: Vec::new(),
            dns: Dns::new(tc.worker.clone(), EventTarget::new(tc.ctx, self_addr, Source::Dns)),
            backoff: Backoff::new(
                tc.worker.clone(),
                EventTarget::new(tc.ctx, self_addr, Source::ReconnectTimer),
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

    fn begin_attempt(&mut self, view: &mut EpView) {
        match self.remote.host {
            TcpHost::Name(ref name) => {
                let (name, port, ipv4only) = (name.clone(), self.remote.port, self.opts.ipv4only);
                self.state = CState::Resolving;
                self.dns.start(&name, port, ipv4only);
            },
            _ => match self.remote.literal_addr() {
                Some(addr) => self.connect_to(view, addr),
                None => {
                    let err = invalid_input_io_error("address cannot be connected to");
                    self.attempt_failed(view, err);
                }
            }
        }
    }

    fn connect_to(&mut self, view: &mut EpView, addr: SocketAddr) {
        let target = EventTarget::new(view.ctx, self.self_addr, Source::Fd);

        match Usock::tcp_connect(view.worker.clone(), target, &addr) {
            Ok(usock) => {
                self.usock = Some(usock);
                self.state = CState::Connecting;
            },
            Err(err) => self.attempt_failed(view, err)
        }
    }

    fn attempt_failed(&mut self, view: &mut EpView, err: io::Error) {
        let eid = self.eid();
        ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
        view.stats.connect_errors += 1;

        if self.stopping {
            self.finish_stop(view);
        } else {
            self.state = CState::Waiting;
            self.backoff.start();
        }
    }

    /// Connected: issue the service request line before any SP traffic.
    fn send_mux_hdr(&mut self) {
        let usock = self.usock.as_mut().unwrap();

        usock.activate();
        let mut line = self.service.clone().into_bytes();
        line.extend_from_slice(b"\r\n");
        usock.send(line, None);
        self.line.clear();
        self.state = CState::SendingMuxHdr;
    }

    fn activate(&mut self, view: &mut EpView) {
        let usock = self.usock.as_mut().unwrap();

        if let Some(io) = usock.io() {
            io.set_nodelay(self.opts.tcp_nodelay);
        }

        let mut session = Session::new(
            &SessionKind::Stream { prefix_byte: false },
            view,
            self.self_addr,
            self.opts.clone());
        session.start(usock, view);
        self.session = Some(session);
        self.state = CState::Active;
    }

    fn teardown_connection(&mut self, view: &mut EpView) {
        if let Some(mut session) = self.session.take() {
            session.teardown(view);
        }
        match self.usock {
            Some(ref mut usock) => {
                usock.stop();
                self.state = if self.stopping { CState::Stopping } else { CState::StoppingUsock };
            },
            None => {
                if self.stopping {
                    self.finish_stop(view);
                } else {
                    self.state = CState::Waiting;
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
                self.state = CState::Stopping;
            },
            None => self.finish_stop(view)
        }
    }

    fn finish_stop(&mut self, view: &mut EpView) {
        let eid = self.eid();
        self.state = CState::Idle;
        ep::raise_stopped(view, eid);
    }

    pub fn feed(&mut self, view: &mut EpView, event: QueuedEvent) {
        match event.src {
            Source::Dns => match self.dns.feed(event.event) {
                Some(DnsOut::Done(Ok(addrs))) if self.state == CState::Resolving =>
                    self.connect_to(view, addrs[0]),
                Some(DnsOut::Done(Err(err))) if self.state == CState::Resolving =>
                    self.attempt_failed(view, err),
                Some(DnsOut::Stopped) if self.stopping && self.usock.is_none() =>
                    self.finish_stop(view),
                _ => {}
            },
            Source::ReconnectTimer => match self.backoff.feed(event.event, event.arg) {
                Some(Event::Timeout) if self.state == CState::Waiting => {
                    self.backoff.stop();
                    self.state = CState::StoppingBackoff;
                },
                Some(Event::Stopped) if self.state == CState::StoppingBackoff =>
                    self.begin_attempt(view),
                Some(Event::Stopped) if self.stopping && self.usock.is_none() =>
                    self.finish_stop(view),
                _ => {}
            },
            Source::HandshakeTimer => self.on_session(view, event.src, event.event, event.arg),
            _ => self.on_usock(view, event.src, event.event)
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
                ep::clear_error(view, &mut self.had_error);
                self.backoff.reset();
            },
            Some(SessionOut::Closed) => {
                view.stats.broken_connections += 1;
                self.teardown_connection(view);
            },
            Some(SessionOut::Error(err)) | Some(SessionOut::PeerGone(err)) => {
                view.stats.broken_connections += 1;
                let eid = self.eid();
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                self.teardown_connection(view);
            },
            None => {}
        }
    }

    fn on_usock(&mut self, view: &mut EpView, src: Source, event: Event) {
        if self.session.is_some() && self.state == CState::Active {
            self.on_session(view, src, event, 0);
            return;
        }

        let out = match self.usock {
            Some(ref mut usock) => usock.feed(src, event),
            None => return
        };

        match (self.state, out) {
            (CState::Connecting, Some(UsockOut::Established)) => self.send_mux_hdr(),
            (CState::SendingMuxHdr, Some(UsockOut::Sent)) => {
                self.state = CState::ReceivingMuxHdr;
                // Byte-wise: the SP preamble follows right behind the
                // response line and must stay in the socket.
                self.usock.as_mut().unwrap().recv_exact(1, false);
            },
            (CState::ReceivingMuxHdr, Some(UsockOut::Received)) => {
                let byte = self.usock.as_mut().unwrap().take_recv_buf();
                self.line.extend_from_slice(&byte);

                if self.line.ends_with(b"\r\n") {
                    if self.line.first() == Some(&b'+') {
                        self.activate(view);
                    } else {
                        let err = invalid_data_io_error("tcpmux service refused");
                        let eid = self.eid();
                        ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                        self.teardown_connection(view);
                    }
                } else if self.line.len() > 256 {
                    let err = invalid_data_io_error("tcpmux response line too long");
                    let eid = self.eid();
                    ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                    self.teardown_connection(view);
                } else {
                    self.usock.as_mut().unwrap().recv_exact(1, false);
                }
            },
            (_, Some(UsockOut::Error(err))) => {
                self.usock = None;
                self.attempt_failed(view, err);
            },
            (_, Some(UsockOut::Shutdown)) => {
                let err = invalid_data_io_error("tcpmux daemon closed the connection");
                let eid = self.eid();
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                self.teardown_connection(view);
            },
            (_, Some(UsockOut::Stopped)) => {
                self.usock = None;
                if self.stopping {
                    self.finish_stop(view);
                } else {
                    self.state = CState::Waiting;
                    self.backoff.start();
                }
            },
            (_, None) => {},
            // Completions of operations overtaken by a state change.
            (CState::Stopping, Some(_)) => {},
            (state, _) => bad_event!("tcpmux connect endpoint", state, src, event)
        }
    }

    pub fn send_on_pipe(&mut self, msg: Message) {
        let session = self.session.as_mut().expect("send on a dead session");
        let usock = self.usock.as_mut().unwrap();
        session.send(usock, msg);
    }

    pub fn recv_on_pipe(&mut self, pipes: &mut HashMap<usize, ::pipe::PipeBase>, q: &mut ::aio::EventQueues) -> Message {
        let session = self.session.as_mut().expect("recv on a dead session");
        let usock = self.usock.as_mut().unwrap();
        session.recv_collect(usock, pipes, q)
    }
}

/******************************************************************************/
/*  Bind side.                                                                */
/******************************************************************************/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BState {
    Idle,
    Connecting,
    /// Service registration on the wire.
    Registering,
    /// Waiting for the one-byte registration status.
    AwaitingStatus,
    /// Registered; every received byte comes with a connection fd.
    Active,
    Stopping
}

struct MuxConn {
    usock: Usock,
    session: Option<Session>,
    dying: bool
}

pub struct BtcpmuxEp {
    state: BState,
    eid: usize,
    addr_text: String,
    service: String,
    daemon_path: PathBuf,
    opts: EndpointOptions,
    control: Option<Usock>,
    conns: HashMap<usize, MuxConn>,
    next_cid: usize,
    control_stopped: bool,
    had_error: bool
}

impl BtcpmuxEp {
    fn new(tc: &TransportCtx, addr_text: String, port: u16, service: String) -> BtcpmuxEp {
        BtcpmuxEp {
            state: BState::Idle,
            eid: tc.eid,
            addr_text: addr_text,
            service: service,
            daemon_path: PathBuf::from(format!("/tmp/tcpmux-{}.ipc", port)),
            opts: tc.opts.clone(),
            control: None,
            conns: HashMap::new(),
            next_cid: 1,
            control_stopped: false,
            had_error: false
        }
    }

    pub fn start(&mut self, view: &mut EpView) {
        let target = EventTarget::new(view.ctx, Addr::Ep(self.eid), Source::Fd);

        match Usock::unix_connect(view.worker.clone(), target, &self.daemon_path) {
            Ok(usock) => {
                self.control = Some(usock);
                self.state = BState::Connecting;
            },
            Err(err) => {
                let eid = self.eid;
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
            }
        }
    }

    /// Registration frame: service name length in network byte order,
    /// then the name.
    fn register_service(&mut self) {
        let usock = self.control.as_mut().unwrap();

        usock.activate();
        let mut frame = Vec::with_capacity(2 + self.service.len());
        frame.push((self.service.len() >> 8) as u8);
        frame.push(self.service.len() as u8);
        frame.extend_from_slice(self.service.as_bytes());
        usock.send(frame, None);
        self.state = BState::Registering;
    }

    fn await_connection(&mut self) {
        self.control.as_mut().unwrap().recv_exact(1, true);
    }

    fn spawn_conn(&mut self, view: &mut EpView, fd: ::std::os::unix::io::RawFd) {
        let stream = unsafe { ::std::net::TcpStream::from_raw_fd(fd) };
        if stream.set_nonblocking(true).is_err() {
            return;
        }
        let stream = match mio::net::TcpStream::from_stream(stream) {
            Ok(stream) => stream,
            Err(_) => return
        };

        let cid = self.next_cid;
        self.next_cid += 1;

        let self_addr = Addr::Conn(self.eid, cid);
        let target = EventTarget::new(view.ctx, self_addr, Source::Fd);
        let mut usock = match Usock::from_accepted(view.worker.clone(), target, UsockIo::TcpStream(stream)) {
            Ok(usock) => usock,
            Err(err) => {
                let eid = self.eid;
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                return;
            }
        };

        if let Some(io) = usock.io() {
            io.set_nodelay(self.opts.tcp_nodelay);
        }
        usock.activate();

        let mut session = Session::new(
            &SessionKind::Stream { prefix_byte: false },
            view,
            self_addr,
            self.opts.clone());
        session.start(&mut usock, view);

        view.stats.accepted_connections += 1;
        self.conns.insert(cid, MuxConn {
            usock: usock,
            session: Some(session),
            dying: false
        });
    }

    pub fn feed(&mut self, view: &mut EpView, event: QueuedEvent) {
        match event.dst {
            Addr::Ep(..) => self.on_control(view, event.src, event.event),
            Addr::Conn(_, cid) => self.on_conn(view, cid, event.src, event.event, event.arg),
            Addr::Sock => bad_event!("tcpmux bind endpoint", self.state, event.src, event.event)
        }
    }

    fn on_control(&mut self, view: &mut EpView, src: Source, event: Event) {
        let out = match self.control {
            Some(ref mut usock) => usock.feed(src, event),
            None => return
        };

        match (self.state, out) {
            (BState::Connecting, Some(UsockOut::Established)) => self.register_service(),
            (BState::Registering, Some(UsockOut::Sent)) => {
                self.state = BState::AwaitingStatus;
                self.control.as_mut().unwrap().recv_exact(1, false);
            },
            (BState::AwaitingStatus, Some(UsockOut::Received)) => {
                let status = self.control.as_mut().unwrap().take_recv_buf();
                if status.first() == Some(&0) {
                    self.state = BState::Active;
                    ep::clear_error(view, &mut self.had_error);
                    self.await_connection();
                } else {
                    let err = invalid_data_io_error("tcpmux service registration refused");
                    let eid = self.eid;
                    ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
                }
            },
            (BState::Active, Some(UsockOut::Received)) => {
                let fd = {
                    let usock = self.control.as_mut().unwrap();
                    let _ = usock.take_recv_buf();
                    usock.take_received_fd()
                };
                if let Some(fd) = fd {
                    self.spawn_conn(view, fd);
                }
                self.await_connection();
            },
            (_, Some(UsockOut::Error(err))) => {
                self.control = None;
                let eid = self.eid;
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
            },
            (_, Some(UsockOut::Shutdown)) => {
                let err = invalid_data_io_error("tcpmux daemon closed the connection");
                let eid = self.eid;
                ep::set_error(view, eid, &self.addr_text, &err, &mut self.had_error);
            },
            (_, Some(UsockOut::Stopped)) => {
                self.control = None;
                self.control_stopped = true;
                self.maybe_finish_stop(view);
            },
            (_, None) => {},
            (BState::Stopping, Some(_)) => {},
            (state, _) => bad_event!("tcpmux bind endpoint", state, src, event)
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
                return;
            },
            Step::Ignored => return,
            Step::Session(out) => out
        };

        match out {
            Some(SessionOut::Activated) => {
                view.stats.established_connections += 1;
            },
            Some(SessionOut::Closed) |
            Some(SessionOut::Error(..)) |
            Some(SessionOut::PeerGone(..)) => {
                view.stats.broken_connections += 1;
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
    }

    pub fn stop(&mut self, view: &mut EpView) {
        self.state = BState::Stopping;

        match self.control {
            Some(ref mut usock) => usock.stop(),
            None => self.control_stopped = true
        }
        let cids: Vec<usize> = self.conns.keys().cloned().collect();
        for cid in cids {
            self.kill_conn(view, cid);
        }
        self.maybe_finish_stop(view);
    }

    fn maybe_finish_stop(&mut self, view: &mut EpView) {
        if self.state == BState::Stopping && self.control_stopped && self.conns.is_empty() {
            let eid = self.eid;
            ep::raise_stopped(view, eid);
        }
    }

    pub fn send_on_pipe(&mut self, cid: usize, msg: Message) {
        let conn = self.conns.get_mut(&cid).expect("send on a dead connection");
        let session = conn.session.as_mut().expect("send on a dead session");
        session.send(&mut conn.usock, msg);
    }

    pub fn recv_on_pipe(&mut self, cid: usize, pipes: &mut HashMap<usize, ::pipe::PipeBase>, q: &mut ::aio::EventQueues) -> Message {
        let conn = self.conns.get_mut(&cid).expect("recv on a dead connection");
        let session = conn.session.as_mut().expect("recv on a dead session");
        session.recv_collect(&mut conn.usock, pipes, q)
    }
}
