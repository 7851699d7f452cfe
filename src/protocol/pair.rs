// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! One-to-one protocol: at most one active pipe; send and receive
//! delegate to it.

use std::io;

use global::SocketType;
use message::Message;
use protocol::{EVENT_IN, EVENT_OUT, PipeSet, Sockbase};
use protocol::excl::Excl;

pub struct Pair {
    excl: Excl
}

impl Pair {
    pub fn new() -> Pair {
        Pair { excl: Excl::new() }
    }
}

impl Sockbase for Pair {
    fn socket_type(&self) -> SocketType {
        SocketType::Pair
    }

    fn add_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        if !self.excl.add(pid) {
            debug!("[pair] rejecting second pipe [{}], already connected", pid);
        }
    }

    fn remove_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.excl.remove(pid);
    }

    fn on_pipe_in(&mut self, _: &mut PipeSet, pid: usize) {
        if self.excl.is_attached(pid) {
            self.excl.on_in(pid);
        }
    }

    fn on_pipe_out(&mut self, _: &mut PipeSet, pid: usize) {
        if self.excl.is_attached(pid) {
            self.excl.on_out(pid);
        }
    }

    fn events(&self) -> u32 {
        let mut events = 0;

        if self.excl.can_recv() {
            events |= EVENT_IN;
        }
        if self.excl.can_send() {
            events |= EVENT_OUT;
        }
        events
    }

    fn send(&mut self, set: &mut PipeSet, msg: Message) -> io::Result<()> {
        self.excl.send(set, msg)
    }

    fn recv(&mut self, set: &mut PipeSet) -> io::Result<Message> {
        self.excl.recv(set).map(|(msg, _)| msg)
    }
}
