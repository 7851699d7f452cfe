// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Load balancer: spreads outbound messages over the sendable pipes,
//! best priority first, round-robin inside a priority.

use std::io;

use message::Message;
use pipe::PIPE_RELEASE;
use protocol::PipeSet;
use protocol::priolist::Priolist;
use io_error::would_block_error;

pub struct LoadBalancer {
    pipes: Priolist
}

impl LoadBalancer {
    pub fn new() -> LoadBalancer {
        LoadBalancer { pipes: Priolist::new() }
    }

    pub fn add(&mut self, pid: usize, send_priority: u8) {
        self.pipes.add(pid, send_priority);
    }

    pub fn remove(&mut self, pid: usize) {
        self.pipes.remove(pid);
    }

    pub fn on_out(&mut self, pid: usize) {
        self.pipes.activate(pid);
    }

    pub fn can_send(&self) -> bool {
        self.pipes.is_active()
    }

    pub fn current_priority(&self) -> Option<u8> {
        self.pipes.current_priority()
    }

    /// Sends to the preferred pipe, reporting which one took the message.
    pub fn send(&mut self, set: &mut PipeSet, msg: Message) -> io::Result<usize> {
        match self.pipes.pop() {
            Some(pid) => {
                let flags = set.send(pid, msg);
                if flags & PIPE_RELEASE == 0 {
                    self.pipes.rotate(pid);
                }
                Ok(pid)
            },
            None => Err(would_block_error())
        }
    }
}
