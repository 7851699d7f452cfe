// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Publisher: every message goes to every subscriber whose pipe can take
//! it right now. A pipe that cannot drops the message without exerting
//! backpressure on the others. Receiving is not defined.

use std::collections::HashSet;
use std::io;

use global::SocketType;
use message::Message;
use pipe::PIPE_RELEASE;
use protocol::{EVENT_OUT, PipeSet, Sockbase};
use io_error::other_io_error;

pub struct Pub {
    pipes: HashSet<usize>,
    dist: HashSet<usize>
}

impl Pub {
    pub fn new() -> Pub {
        Pub {
            pipes: HashSet::new(),
            dist: HashSet::new()
        }
    }

    fn broadcast(&mut self, set: &mut PipeSet, msg: Message) {
        let targets: Vec<usize> = self.dist.iter().cloned().collect();

        for pid in targets {
            let flags = set.send(pid, msg.clone());
            if flags & PIPE_RELEASE != 0 {
                self.dist.remove(&pid);
            }
        }
    }
}

impl Sockbase for Pub {
    fn socket_type(&self) -> SocketType {
        SocketType::Pub
    }

    fn add_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.pipes.insert(pid);
    }

    fn remove_pipe(&mut self, _: &mut PipeSet, pid: usize) {
        self.dist.remove(&pid);
        self.pipes.remove(&pid);
    }

    fn on_pipe_in(&mut self, _: &mut PipeSet, _: usize) {
    }

    fn on_pipe_out(&mut self, _: &mut PipeSet, pid: usize) {
        if self.pipes.contains(&pid) {
            self.dist.insert(pid);
        }
    }

    fn events(&self) -> u32 {
        // Sending never blocks: subscribers that cannot keep up lose
        // messages instead.
        EVENT_OUT
    }

    fn send(&mut self, set: &mut PipeSet, msg: Message) -> io::Result<()> {
        self.broadcast(set, msg);
        Ok(())
    }

    fn recv(&mut self, _: &mut PipeSet) -> io::Result<Message> {
        Err(other_io_error("recv not supported by protocol"))
    }
}
