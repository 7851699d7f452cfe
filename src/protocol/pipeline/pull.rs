// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use global::SocketType;
use message::Message;
use protocol::{EVENT_IN, PipeSet, Sockbase};
use protocol::fq::FairQueue;
use io_error::other_io_error;

pub struct Pull {
    fq: FairQueue
}

impl Pull {
    pub fn new() -> Pull {
        Pull { fq: FairQueue::new() }
    }
}

impl Sockbase for Pull {
    fn socket_type(&self) -> SocketType {
        SocketType::Pull
    }

    fn add_pipe(&mut self, set: &mut PipeSet, pid: usize) {
        let priority = set.opts(pid).recv_priority;
        self.fq.add(pid, priority);
    }

    fn remove_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.fq.remove(pid);
    }

    fn on_pipe_in(&mut self, _: &mut PipeSet, pid: usize) {
        self.fq.on_in(pid);
    }

    fn on_pipe_out(&mut self, _: &mut PipeSet, _: usize) {
    }

    fn events(&self) -> u32 {
        if self.fq.can_recv() {
            EVENT_IN
        } else {
            0
        }
    }

    fn send(&mut self, _: &mut PipeSet, _: Message) -> io::Result<()> {
        Err(other_io_error("send not supported by protocol"))
    }

    fn recv(&mut self, set: &mut PipeSet) -> io::Result<Message> {
        self.fq.recv(set).map(|(msg, _, _)| msg)
    }
}
