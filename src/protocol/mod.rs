// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The protocol plugged into a socket. One implementation per socket
//! type; the socket machine routes user operations and pipe availability
//! into it and mirrors its readiness into the blocking gates.

pub mod excl;
pub mod priolist;
pub mod lb;
pub mod fq;
pub mod router;
pub mod pair;
pub mod pubsub;
pub mod reqrep;
pub mod survey;
pub mod pipeline;

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use aio::{Event, EventQueues, Source};
use aio::ctx::Ctx;
use aio::worker::Worker;
use ep::Ep;
use global::SocketType;
use message::Message;
use options::{EndpointOptions, SocketOption};
use pipe::{self, Carrier, InState, OutState, PipeBase, PIPE_PARSED, PIPE_RELEASE};
use io_error::no_protocol_option_error;

pub const EVENT_IN: u32 = 1;
pub const EVENT_OUT: u32 = 2;

/// The pipes of a socket, as seen by its protocol. Pipes are addressed
/// by id; the set routes the actual transfer to the carrier behind each
/// pipe and maintains the availability states.
pub struct PipeSet<'a> {
    pub pipes: &'a mut HashMap<usize, PipeBase>,
    pub eps: &'a mut HashMap<usize, Ep>,
    pub q: &'a mut EventQueues
}

enum Route {
    Stream(usize, usize),
    Inproc
}

impl<'a> PipeSet<'a> {
    pub fn opts(&self, pid: usize) -> &EndpointOptions {
        &self.pipes[&pid].opts
    }

    fn route(&self, pid: usize) -> Route {
        match self.pipes[&pid].carrier {
            Carrier::Stream { eid, cid } => Route::Stream(eid, cid),
            Carrier::Inproc(..) => Route::Inproc
        }
    }

    /// Hands one message to the pipe. Returns `PIPE_RELEASE` when the
    /// pipe will not take another message until it announces output
    /// again.
    pub fn send(&mut self, pid: usize, msg: Message) -> u32 {
        {
            let pb = self.pipes.get_mut(&pid).expect("send on unknown pipe");
            assert_eq!(OutState::Idle, pb.outstate, "send on a pipe that did not announce output");
            pb.outstate = OutState::Sending;
        }

        match self.route(pid) {
            Route::Stream(eid, cid) => {
                let ep = self.eps.get_mut(&eid).expect("pipe outlived its endpoint");
                ep.send_on_pipe(cid, msg);
            },
            Route::Inproc => {
                let pb = self.pipes.get_mut(&pid).unwrap();
                pipe::inproc_send(pb, &mut *self.q, msg);
            }
        }

        let pb = self.pipes.get_mut(&pid).unwrap();
        match pb.outstate {
            OutState::Sent => {
                pb.outstate = OutState::Idle;
                0
            },
            OutState::Sending => {
                pb.outstate = OutState::Async;
                PIPE_RELEASE
            },
            state => bad_state!("pipe set(send)", state)
        }
    }

    /// Collects the announced message from the pipe. `PIPE_PARSED` in the
    /// returned flags means the protocol header was already split off.
    pub fn recv(&mut self, pid: usize) -> (Message, u32) {
        {
            let pb = self.pipes.get_mut(&pid).expect("recv on unknown pipe");
            assert_eq!(InState::Idle, pb.instate, "recv on a pipe that did not announce input");
            pb.instate = InState::Receiving;
        }

        let (msg, parsed) = match self.route(pid) {
            Route::Stream(eid, cid) => {
                let ep = self.eps.get_mut(&eid).expect("pipe outlived its endpoint");
                (ep.recv_on_pipe(cid, &mut *self.pipes, &mut *self.q), false)
            },
            Route::Inproc => {
                let pb = self.pipes.get_mut(&pid).unwrap();
                (pipe::inproc_recv(pb, &mut *self.q), true)
            }
        };

        let pb = self.pipes.get_mut(&pid).unwrap();
        let mut flags = if parsed { PIPE_PARSED } else { 0 };
        match pb.instate {
            InState::Received => pb.instate = InState::Idle,
            InState::Receiving => {
                pb.instate = InState::Async;
                flags |= PIPE_RELEASE;
            },
            state => bad_state!("pipe set(recv)", state)
        }

        (msg, flags)
    }
}

/// Entry points of a protocol.
pub trait Sockbase: Send {
    fn socket_type(&self) -> SocketType;

    /// Called once the socket context exists, for protocols that own
    /// timers.
    fn started(&mut self, _worker: &Arc<Worker>, _ctx: &Arc<Ctx>) {}

    /// The socket is closing; cancel timers and forget pending state.
    fn stop(&mut self) {}

    fn add_pipe(&mut self, set: &mut PipeSet, pid: usize);
    fn remove_pipe(&mut self, set: &mut PipeSet, pid: usize);
    fn on_pipe_in(&mut self, set: &mut PipeSet, pid: usize);
    fn on_pipe_out(&mut self, set: &mut PipeSet, pid: usize);

    /// Bitmask of `EVENT_IN`/`EVENT_OUT`; mirrored into the blocking
    /// gates after every step.
    fn events(&self) -> u32;

    fn send(&mut self, set: &mut PipeSet, msg: Message) -> io::Result<()>;
    fn recv(&mut self, set: &mut PipeSet) -> io::Result<Message>;

    /// Protocol owned timers (request resend, survey deadline).
    fn on_timer(&mut self, _set: &mut PipeSet, _src: Source, _event: Event, _arg: usize) {}

    fn set_option(&mut self, _option: &SocketOption) -> io::Result<()> {
        Err(no_protocol_option_error())
    }
}

/// The socket-type registry. Fixed at build time; this is not a dynamic
/// plugin system.
pub fn create_sockbase(socktype: SocketType) -> Box<Sockbase> {
    match socktype {
        SocketType::Pair => Box::new(pair::Pair::new()),
        SocketType::Pub => Box::new(pubsub::pbu::Pub::new()),
        SocketType::Sub => Box::new(pubsub::sub::Sub::new()),
        SocketType::Req => Box::new(reqrep::req::Req::new()),
        SocketType::Rep => Box::new(reqrep::rep::Rep::new()),
        SocketType::Push => Box::new(pipeline::push::Push::new()),
        SocketType::Pull => Box::new(pipeline::pull::Pull::new()),
        SocketType::Surveyor => Box::new(survey::surveyor::Surveyor::new()),
        SocketType::Respondent => Box::new(survey::respondent::Respondent::new())
    }
}
