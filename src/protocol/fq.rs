// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Fair queue: drains the receivable pipes evenly, best priority first,
//! round-robin inside a priority.

use std::io;

use message::Message;
use pipe::PIPE_RELEASE;
use protocol::PipeSet;
use protocol::priolist::Priolist;
use io_error::would_block_error;

pub struct FairQueue {
    pipes: Priolist
}

impl FairQueue {
    pub fn new() -> FairQueue {
        FairQueue { pipes: Priolist::new() }
    }

    pub fn add(&mut self, pid: usize, recv_priority: u8) {
        self.pipes.add(pid, recv_priority);
    }

    pub fn remove(&mut self, pid: usize) {
        self.pipes.remove(pid);
    }

    pub fn on_in(&mut self, pid: usize) {
        self.pipes.activate(pid);
    }

    pub fn can_recv(&self) -> bool {
        self.pipes.is_active()
    }

    /// Receives from the next pipe in line, reporting which pipe the
    /// message came from and the carrier flags.
    pub fn recv(&mut self, set: &mut PipeSet) -> io::Result<(Message, u32, usize)> {
        match self.pipes.pop() {
            Some(pid) => {
                let (msg, flags) = set.recv(pid);
                if flags & PIPE_RELEASE == 0 {
                    self.pipes.rotate(pid);
                }
                Ok((msg, flags, pid))
            },
            None => Err(would_block_error())
        }
    }
}
