// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Replier. Receiving a request captures its backtrace; the next send
//! reattaches it so the reply finds its way back through any number of
//! intermediate hops. Sending without a request in progress is a state
//! machine violation.

use std::io;

use global::SocketType;
use message::{Chunk, Message};
use protocol::{EVENT_IN, EVENT_OUT, PipeSet, Sockbase};
use protocol::router::Router;
use io_error::fsm_error;

pub struct Rep {
    router: Router,
    backtrace: Option<Chunk>
}

impl Rep {
    pub fn new() -> Rep {
        Rep {
            router: Router::new(),
            backtrace: None
        }
    }
}

impl Sockbase for Rep {
    fn socket_type(&self) -> SocketType {
        SocketType::Rep
    }

    fn add_pipe(&mut self, set: &mut PipeSet, pid: usize) {
        self.router.add(set, pid);
    }

    fn remove_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.router.remove(pid);
    }

    fn on_pipe_in(&mut self, _: &mut PipeSet, pid: usize) {
        self.router.on_in(pid);
    }

    fn on_pipe_out(&mut self, _: &mut PipeSet, pid: usize) {
        self.router.on_out(pid);
    }

    fn events(&self) -> u32 {
        let mut events = 0;

        if self.router.can_recv() {
            events |= EVENT_IN;
        }
        if self.backtrace.is_some() {
            events |= EVENT_OUT;
        }
        events
    }

    fn send(&mut self, set: &mut PipeSet, mut msg: Message) -> io::Result<()> {
        // No request was received, there is nowhere to send a reply to.
        let backtrace = match self.backtrace.take() {
            Some(backtrace) => backtrace,
            None => return Err(fsm_error())
        };

        msg.sphdr = backtrace;
        self.router.send(set, msg)
    }

    fn recv(&mut self, set: &mut PipeSet) -> io::Result<Message> {
        // Receiving again while a request is in progress cancels it.
        self.backtrace = None;

        let mut msg = self.router.recv(set)?;

        self.backtrace = Some(msg.sphdr.take());
        Ok(msg)
    }
}
