// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Requester. One request outstanding at a time; submitting a new one
//! cancels the old. The stored request is redispatched when the resend
//! interval elapses or the pipe it went to disappears, always under the
//! same id, and replies carrying any other id are dropped.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use rand;

use aio::{Addr, Event, EventTarget, Source};
use aio::ctx::Ctx;
use aio::timer::Timer;
use aio::worker::Worker;
use global::SocketType;
use message::{Chunk, Message};
use options::SocketOption;
use pipe::PIPE_PARSED;
use protocol::{EVENT_IN, EVENT_OUT, PipeSet, Sockbase};
use protocol::fq::FairQueue;
use protocol::lb::LoadBalancer;
use io_error::{fsm_error, is_would_block, no_protocol_option_error, would_block_error};

/// Requests unanswered for this long are resent.
const DEFAULT_RESEND_IVL: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// No request is submitted.
    Passive,
    /// Request submitted while no peer was available; waiting for one.
    Delayed,
    /// Request on the wire, waiting for the reply.
    Active,
    /// Resend interval elapsed, waiting for the timer to stop before
    /// dispatching again.
    TimedOut,
    /// A new request arrived while the old one was in flight; waiting
    /// for the timer to stop before dispatching the new one.
    Cancelling,
    /// Reply arrived, waiting for the timer to stop.
    StoppingTimer,
    /// Reply stored, not yet retrieved by the user.
    Done,
    Stopping
}

pub struct Req {
    state: State,
    lb: LoadBalancer,
    fq: FairQueue,
    /// Last assigned request id, 31 bits; the top bit marks the stack
    /// bottom on the wire.
    last_id: u32,
    request: Message,
    reply: Option<Message>,
    resend_ivl: Duration,
    timer: Option<Timer>,
    sent_to: Option<usize>
}

impl Req {
    pub fn new() -> Req {
        Req {
            state: State::Idle,
            lb: LoadBalancer::new(),
            fq: FairQueue::new(),
            // Random seed so replies to a previous incarnation of this
            // process never match a fresh request.
            last_id: rand::random(),
            request: Message::new(),
            reply: None,
            resend_ivl: Duration::from_millis(DEFAULT_RESEND_IVL),
            timer: None,
            sent_to: None
        }
    }

    fn in_progress(&self) -> bool {
        match self.state {
            State::Idle | State::Passive | State::Stopping => false,
            _ => true
        }
    }

    fn wire_id(&self) -> u32 {
        self.last_id | 0x80000000
    }

    fn timer(&mut self) -> &mut Timer {
        self.timer.as_mut().expect("req used before the socket started")
    }

    /// Dispatches the stored request over the load balancer, arming the
    /// resend timer, or parks in `Delayed` until a peer shows up.
    fn dispatch(&mut self, set: &mut PipeSet, allow_delay: bool) {
        let msg = self.request.clone();

        match self.lb.send(set, msg) {
            Ok(pid) => {
                let resend_ivl = self.resend_ivl;
                self.timer().start(resend_ivl);
                self.sent_to = Some(pid);
                self.state = State::Active;
            },
            Err(ref err) if is_would_block(err) => {
                assert!(allow_delay, "request dispatch with no pipe and no delay allowed");
                self.state = State::Delayed;
            },
            Err(err) => panic!("unexpected load balancer failure: {:?}", err)
        }
    }

    /// Pulls replies off the fair queue until one matches the current
    /// request; everything else is dropped.
    fn pull_reply(&mut self, set: &mut PipeSet) -> Option<Message> {
        loop {
            let (mut msg, flags, _) = match self.fq.recv(set) {
                Ok(received) => received,
                Err(_) => return None
            };

            if flags & PIPE_PARSED == 0 {
                if msg.body.len() < 4 {
                    continue;
                }
                let sphdr = Chunk::from_slice(&msg.body.as_slice()[..4]);
                msg.body.trim_front(4);
                msg.sphdr = sphdr;
            }

            if !self.in_progress() {
                continue;
            }
            if msg.sphdr.len() != 4 {
                continue;
            }

            let reply_id = BigEndian::read_u32(msg.sphdr.as_slice());
            if reply_id & 0x80000000 == 0 || reply_id != self.wire_id() {
                trace!("[req] dropping reply with stale id {:08x}", reply_id);
                continue;
            }

            msg.sphdr = Chunk::empty();
            return Some(msg);
        }
    }
}

impl Sockbase for Req {
    fn socket_type(&self) -> SocketType {
        SocketType::Req
    }

    fn started(&mut self, worker: &Arc<Worker>, ctx: &Arc<Ctx>) {
        let target = EventTarget::new(ctx, Addr::Sock, Source::ResendTimer);

        self.timer = Some(Timer::new(worker.clone(), target));
        self.state = State::Passive;
    }

    fn stop(&mut self) {
        if let Some(ref mut timer) = self.timer {
            timer.stop();
        }
        self.state = State::Stopping;
    }

    fn add_pipe(&mut self, set: &mut PipeSet, pid: usize) {
        let (sndprio, rcvprio) = {
            let opts = set.opts(pid);
            (opts.send_priority, opts.recv_priority)
        };

        self.lb.add(pid, sndprio);
        self.fq.add(pid, rcvprio);
    }

    fn remove_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.lb.remove(pid);
        self.fq.remove(pid);

        // The pipe carrying the request is gone: behave as if the
        // resend timer fired right away.
        if self.sent_to == Some(pid) && self.state == State::Active {
            self.timer().stop();
            self.sent_to = None;
            self.state = State::TimedOut;
        }
    }

    fn on_pipe_in(&mut self, set: &mut PipeSet, pid: usize) {
        self.fq.on_in(pid);

        if let Some(reply) = self.pull_reply(set) {
            self.reply = Some(reply);
            if self.state == State::Active {
                self.timer().stop();
                self.sent_to = None;
                self.state = State::StoppingTimer;
            }
        }
    }

    fn on_pipe_out(&mut self, set: &mut PipeSet, pid: usize) {
        self.lb.on_out(pid);

        if self.state == State::Delayed {
            self.dispatch(set, false);
        }
    }

    fn events(&self) -> u32 {
        // Output is always available: a new request cancels the old one.
        let mut events = EVENT_OUT;

        if self.state == State::Done {
            events |= EVENT_IN;
        }
        events
    }

    fn send(&mut self, set: &mut PipeSet, mut msg: Message) -> io::Result<()> {
        self.last_id = self.last_id.wrapping_add(1) & 0x7fffffff;

        let mut sphdr = [0; 4];
        BigEndian::write_u32(&mut sphdr, self.wire_id());
        msg.sphdr = Chunk::from_slice(&sphdr);

        self.request = msg;
        self.reply = None;

        match self.state {
            State::Passive | State::Done => self.dispatch(set, true),
            State::Delayed => {},
            State::Active | State::StoppingTimer => {
                self.timer().stop();
                self.sent_to = None;
                self.state = State::Cancelling;
            },
            State::TimedOut => self.state = State::Cancelling,
            State::Cancelling => {},
            state => bad_event!("req", state, Source::Action, Event::Sent)
        }
        Ok(())
    }

    fn recv(&mut self, _: &mut PipeSet) -> io::Result<Message> {
        if !self.in_progress() {
            return Err(fsm_error());
        }
        if self.state != State::Done {
            return Err(would_block_error());
        }

        let reply = self.reply.take().expect("req reached Done without a reply");
        self.state = State::Passive;
        Ok(reply)
    }

    fn on_timer(&mut self, set: &mut PipeSet, src: Source, event: Event, arg: usize) {
        assert_eq!(Source::ResendTimer, src);

        let event = match self.timer().feed(event, arg) {
            Some(event) => event,
            None => return
        };

        match (self.state, event) {
            (State::Active, Event::Timeout) => {
                self.timer().stop();
                self.sent_to = None;
                self.state = State::TimedOut;
            },
            (State::TimedOut, Event::Stopped) |
            (State::Cancelling, Event::Stopped) => self.dispatch(set, true),
            (State::StoppingTimer, Event::Stopped) => self.state = State::Done,
            (State::Stopping, Event::Stopped) => {},
            (state, event) => bad_event!("req", state, src, event)
        }
    }

    fn set_option(&mut self, option: &SocketOption) -> io::Result<()> {
        match *option {
            SocketOption::ResendInterval(ivl) => {
                self.resend_ivl = ivl;
                Ok(())
            },
            _ => Err(no_protocol_option_error())
        }
    }
}
