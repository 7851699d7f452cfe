// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Pluggable transports. The set is fixed at build time: a scheme is
//! looked up in a static registry and asked to produce the endpoint
//! machinery for a bind or a connect.

pub mod addr;
pub mod stream;
pub mod connecting;
pub mod binding;
pub mod tcp;
pub mod ipc;
pub mod tcpmux;
pub mod ws;
pub mod inproc;

use std::io;
use std::sync::Arc;

use aio::{Addr, Event, Source};
use aio::ctx::Ctx;
use aio::usock::Usock;
use aio::worker::Worker;
use ep::{EpKind, EpView};
use global::{SocketId, SocketType};
use message::Message;
use options::EndpointOptions;
use io_error::protocol_not_supported_error;

use self::stream::StreamSession;
use self::ws::sws::WsSession;
use self::inproc::InprocRegistry;

/// Everything a transport needs to build an endpoint.
pub struct TransportCtx<'a> {
    pub sock_id: SocketId,
    pub socktype: SocketType,
    pub eid: usize,
    pub opts: &'a EndpointOptions,
    pub worker: &'a Arc<Worker>,
    pub ctx: &'a Arc<Ctx>,
    pub registry: &'a Arc<InprocRegistry>
}

pub trait Transport: Sync {
    fn scheme(&self) -> &'static str;
    fn bind(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind>;
    fn connect(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind>;
}

static TRANSPORTS: [&'static Transport; 5] = [
    &inproc::InprocTransport,
    &ipc::IpcTransport,
    &tcp::TcpTransport,
    &tcpmux::TcpmuxTransport,
    &ws::WsTransport
];

/// Builds the endpoint machinery for `scheme://rest`.
pub fn create_endpoint(tc: &TransportCtx, address: &str, is_bind: bool) -> io::Result<EpKind> {
    let (scheme, rest) = addr::split_scheme(address)?;

    for transport in TRANSPORTS.iter() {
        if transport.scheme() == scheme {
            return if is_bind {
                transport.bind(tc, rest)
            } else {
                transport.connect(tc, rest)
            };
        }
    }
    Err(protocol_not_supported_error())
}

/// How a connection-oriented endpoint frames its byte stream.
#[derive(Clone)]
pub enum SessionKind {
    /// Length-prefixed SP frames, with the one-byte frame type of the
    /// ipc flavor when `prefix_byte` is set.
    Stream {
        prefix_byte: bool
    },
    /// RFC 6455 framing over an HTTP upgrade handshake.
    Ws {
        client: bool,
        host: String,
        path: String
    }
}

/// What a session reports to the endpoint above it.
pub enum SessionOut {
    /// Handshake done, pipe attached to the socket.
    Activated,
    /// Peer closed cleanly; reconnecting is fine.
    Closed,
    /// The connection failed; reconnect after backoff.
    Error(io::Error),
    /// The peer violated the protocol badly enough that the endpoint
    /// must not reconnect.
    PeerGone(io::Error)
}

/// A per-connection session: bridges the raw byte stream and the
/// SP-framed pipe handed to the protocol.
pub enum Session {
    Stream(StreamSession),
    Ws(WsSession)
}

impl Session {
    pub fn new(kind: &SessionKind, view: &EpView, self_addr: Addr, opts: EndpointOptions) -> Session {
        match *kind {
            SessionKind::Stream { prefix_byte } =>
                Session::Stream(StreamSession::new(view, self_addr, opts, prefix_byte)),
            SessionKind::Ws { client, ref host, ref path } =>
                Session::Ws(WsSession::new(view, self_addr, opts, client, host.clone(), path.clone()))
        }
    }

    pub fn start(&mut self, usock: &mut Usock, view: &mut EpView) {
        match *self {
            Session::Stream(ref mut session) => session.start(usock, view),
            Session::Ws(ref mut session) => session.start(usock, view)
        }
    }

    pub fn feed(&mut self, usock: &mut Usock, view: &mut EpView, src: Source, event: Event, arg: usize) -> Option<SessionOut> {
        match *self {
            Session::Stream(ref mut session) => session.feed(usock, view, src, event, arg),
            Session::Ws(ref mut session) => session.feed(usock, view, src, event, arg)
        }
    }

    pub fn send(&mut self, usock: &mut Usock, msg: Message) {
        match *self {
            Session::Stream(ref mut session) => session.send(usock, msg),
            Session::Ws(ref mut session) => session.send(usock, msg)
        }
    }

    pub fn recv_collect(&mut self, usock: &mut Usock, pipes: &mut ::std::collections::HashMap<usize, ::pipe::PipeBase>, q: &mut ::aio::EventQueues) -> Message {
        match *self {
            Session::Stream(ref mut session) => session.recv_collect(usock),
            Session::Ws(ref mut session) => session.recv_collect(usock, pipes, q)
        }
    }

    pub fn teardown(&mut self, view: &mut EpView) {
        match *self {
            Session::Stream(ref mut session) => session.teardown(view),
            Session::Ws(ref mut session) => session.teardown(view)
        }
    }
}

/// The pipe carrier coordinates of a session living at `self_addr`.
pub fn addr_to_conn(self_addr: Addr) -> (usize, usize) {
    match self_addr {
        Addr::Ep(eid) => (eid, 0),
        Addr::Conn(eid, cid) => (eid, cid),
        Addr::Sock => bad_state!("session", self_addr)
    }
}
