// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! In-process transport: `inproc://name`, name up to 128 bytes. Bound
//! and connected endpoints meet in a session-wide directory; a matching
//! pair shares two message queues and skips the whole aio stack.

pub mod msgqueue;

use std::io;
use std::sync::{Arc, Mutex, Weak};

use aio::{Addr, Event, QueuedEvent, Source};
use aio::ctx::Ctx;
use ep::{self, EpKind, EpView};
use global::SocketType;
use options::EndpointOptions;
use pipe::{self, Carrier, InprocEnd, InprocQueues, PipeBase, Side};
use transport::{Transport, TransportCtx};
use io_error::{addr_in_use_error, name_too_long_error};

use self::msgqueue::MsgQueue;

pub const NAME_MAX: usize = 128;

struct Entry {
    name: String,
    eid: usize,
    ctx: Weak<Ctx>,
    socktype: SocketType,
    recv_buffer: usize,
    /// A connected entry pairs with at most one bound endpoint.
    claimed: bool
}

pub struct PeerInfo {
    pub eid: usize,
    pub ctx: Weak<Ctx>,
    pub recv_buffer: usize
}

impl Entry {
    fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            eid: self.eid,
            ctx: self.ctx.clone(),
            recv_buffer: self.recv_buffer
        }
    }

    fn is_alive(&self) -> bool {
        self.ctx.upgrade().is_some()
    }
}

/// Directory of the inproc endpoints of one session.
pub struct InprocRegistry {
    bound: Mutex<Vec<Entry>>,
    connected: Mutex<Vec<Entry>>
}

impl InprocRegistry {
    pub fn new() -> InprocRegistry {
        InprocRegistry {
            bound: Mutex::new(Vec::new()),
            connected: Mutex::new(Vec::new())
        }
    }

    fn register_bound(&self, entry: Entry) -> io::Result<()> {
        let mut bound = self.bound.lock().unwrap();

        bound.retain(|e| e.is_alive());
        if bound.iter().any(|e| e.name == entry.name) {
            return Err(addr_in_use_error());
        }
        bound.push(entry);
        Ok(())
    }

    fn register_connected(&self, entry: Entry) {
        let mut connected = self.connected.lock().unwrap();

        connected.retain(|e| e.is_alive());
        connected.push(entry);
    }

    fn unregister(&self, eid: usize) {
        self.bound.lock().unwrap().retain(|e| e.eid != eid);
        self.connected.lock().unwrap().retain(|e| e.eid != eid);
    }

    /// For a starting bound endpoint: claims every compatible connected
    /// endpoint waiting on this name.
    fn claim_connected_peers(&self, name: &str, socktype: SocketType) -> Vec<PeerInfo> {
        let mut connected = self.connected.lock().unwrap();
        let mut peers = Vec::new();

        for entry in connected.iter_mut() {
            if entry.name == name && !entry.claimed && entry.is_alive()
                && socktype.matches(entry.socktype) {
                entry.claimed = true;
                peers.push(entry.peer_info());
            }
        }
        peers
    }

    /// For a starting connected endpoint: pairs with the bound endpoint
    /// of this name, claiming the caller's own entry so the bound side
    /// does not pair it a second time.
    fn claim_bound_peer(&self, name: &str, socktype: SocketType, own_eid: usize) -> Option<PeerInfo> {
        let bound = self.bound.lock().unwrap();
        let mut connected = self.connected.lock().unwrap();

        let own = connected.iter_mut().find(|e| e.eid == own_eid)?;
        if own.claimed {
            return None;
        }

        let peer = bound.iter().find(|e| {
            e.name == name && e.is_alive() && socktype.matches(e.socktype)
        })?;

        own.claimed = true;
        Some(peer.peer_info())
    }
}

pub struct InprocTransport;

impl Transport for InprocTransport {
    fn scheme(&self) -> &'static str {
        "inproc"
    }

    fn bind(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        if rest.len() > NAME_MAX {
            return Err(name_too_long_error());
        }
        tc.registry.register_bound(Entry {
            name: rest.to_owned(),
            eid: tc.eid,
            ctx: Arc::downgrade(tc.ctx),
            socktype: tc.socktype,
            recv_buffer: tc.opts.recv_buffer,
            claimed: false
        })?;

        Ok(EpKind::Inproc(InprocEp::new(tc, rest.to_owned(), true)))
    }

    fn connect(&self, tc: &TransportCtx, rest: &str) -> io::Result<EpKind> {
        if rest.len() > NAME_MAX {
            return Err(name_too_long_error());
        }
        tc.registry.register_connected(Entry {
            name: rest.to_owned(),
            eid: tc.eid,
            ctx: Arc::downgrade(tc.ctx),
            socktype: tc.socktype,
            recv_buffer: tc.opts.recv_buffer,
            claimed: false
        });

        Ok(EpKind::Inproc(InprocEp::new(tc, rest.to_owned(), false)))
    }
}

pub struct InprocEp {
    eid: usize,
    name: String,
    is_bound: bool,
    opts: EndpointOptions,
    registry: Arc<InprocRegistry>,
    /// Peer endpoint id to local pipe id, one pipe per peer endpoint.
    peers: ::std::collections::HashMap<usize, usize>
}

impl InprocEp {
    fn new(tc: &TransportCtx, name: String, is_bound: bool) -> InprocEp {
        InprocEp {
            eid: tc.eid,
            name: name,
            is_bound: is_bound,
            opts: tc.opts.clone(),
            registry: tc.registry.clone(),
            peers: ::std::collections::HashMap::new()
        }
    }

    pub fn start(&mut self, view: &mut EpView) {
        if self.is_bound {
            let peers = self.registry.claim_connected_peers(&self.name, view.socktype);
            for peer in peers {
                self.pair_up(view, peer);
            }
        } else if let Some(peer) = self.registry.claim_bound_peer(&self.name, view.socktype, self.eid) {
            self.pair_up(view, peer);
        }
    }

    /// Creates the queue pair and both pipe ends; ours starts now, the
    /// peer's travels over a cross-context event.
    fn pair_up(&mut self, view: &mut EpView, peer: PeerInfo) {
        let peer_ctx = match peer.ctx.upgrade() {
            Some(ctx) => ctx,
            None => return
        };

        let (bound_buffer, connected_buffer) = if self.is_bound {
            (self.opts.recv_buffer, peer.recv_buffer)
        } else {
            (peer.recv_buffer, self.opts.recv_buffer)
        };
        let queues = Arc::new(InprocQueues {
            to_bound: Mutex::new(MsgQueue::new(bound_buffer)),
            to_connected: Mutex::new(MsgQueue::new(connected_buffer))
        });
        let (own_side, peer_side) = if self.is_bound {
            (Side::Bound, Side::Connected)
        } else {
            (Side::Connected, Side::Bound)
        };

        let own_end = InprocEnd {
            queues: queues.clone(),
            side: own_side,
            peer_ctx: peer.ctx.clone(),
            peer_eid: peer.eid,
            local_eid: self.eid,
            pending: None
        };
        self.install_pipe(view, own_end);

        let peer_end = InprocEnd {
            queues: queues,
            side: peer_side,
            peer_ctx: Arc::downgrade(view.ctx),
            peer_eid: self.eid,
            local_eid: peer.eid,
            pending: None
        };
        view.q.raise_to(
            peer_ctx,
            Addr::Ep(peer.eid),
            Source::Peer,
            Event::Accepted,
            self.eid,
            Some(Box::new(peer_end)));
    }

    fn install_pipe(&mut self, view: &mut EpView, end: InprocEnd) {
        let pid = view.alloc_pipe_id();
        let peer_eid = end.peer_eid;
        let mut pb = PipeBase::new(pid, self.opts.clone(), Carrier::Inproc(end));

        pipe::start(&mut pb, view.q);
        if pipe::inproc_has_input(&pb) {
            pipe::on_peer_msg_in(&mut pb, view.q);
        }
        view.pipes.insert(pid, pb);
        self.peers.insert(peer_eid, pid);
        view.stats.established_connections += 1;
    }

    pub fn feed(&mut self, view: &mut EpView, event: QueuedEvent) {
        if event.src != Source::Peer {
            bad_event!("inproc endpoint", self.eid, event.src, event.event);
        }

        match event.event {
            Event::Accepted => {
                if let Some(end) = event.attach {
                    self.install_pipe(view, *end);
                }
            },
            Event::MsgIn => {
                if let Some(pid) = self.peers.get(&event.arg) {
                    if let Some(pb) = view.pipes.get_mut(pid) {
                        pipe::on_peer_msg_in(pb, view.q);
                    }
                }
            },
            Event::MsgOut => {
                if let Some(pid) = self.peers.get(&event.arg) {
                    if let Some(pb) = view.pipes.get_mut(pid) {
                        pipe::on_peer_msg_out(pb, view.q);
                    }
                }
            },
            Event::Shutdown => {
                if let Some(pid) = self.peers.remove(&event.arg) {
                    if let Some(pb) = view.pipes.get_mut(&pid) {
                        pipe::stop(pb, view.q);
                    }
                }
            },
            event => bad_event!("inproc endpoint", self.eid, Source::Peer, event)
        }
    }

    pub fn stop(&mut self, view: &mut EpView) {
        self.registry.unregister(self.eid);

        for (_, pid) in self.peers.drain() {
            if let Some(pb) = view.pipes.get_mut(&pid) {
                pipe::inproc_notify_closed(pb, view.q);
                pipe::stop(pb, view.q);
            }
        }
        let eid = self.eid;
        ep::raise_stopped(view, eid);
    }
}
