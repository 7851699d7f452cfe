// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use global::SocketType;
use message::Message;
use protocol::{EVENT_OUT, PipeSet, Sockbase};
use protocol::lb::LoadBalancer;
use io_error::other_io_error;

pub struct Push {
    lb: LoadBalancer
}

impl Push {
    pub fn new() -> Push {
        Push { lb: LoadBalancer::new() }
    }
}

impl Sockbase for Push {
    fn socket_type(&self) -> SocketType {
        SocketType::Push
    }

    fn add_pipe(&mut self, set: &mut PipeSet, pid: usize) {
        let priority = set.opts(pid).send_priority;
        self.lb.add(pid, priority);
    }

    fn remove_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.lb.remove(pid);
    }

    fn on_pipe_in(&mut self, _: &mut PipeSet, _: usize) {
    }

    fn on_pipe_out(&mut self, _: &mut PipeSet, pid: usize) {
        self.lb.on_out(pid);
    }

    fn events(&self) -> u32 {
        if self.lb.can_send() {
            EVENT_OUT
        } else {
            0
        }
    }

    fn send(&mut self, set: &mut PipeSet, msg: Message) -> io::Result<()> {
        self.lb.send(set, msg).map(|_| ())
    }

    fn recv(&mut self, _: &mut PipeSet) -> io::Result<Message> {
        Err(other_io_error("recv not supported by protocol"))
    }
}
