// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Subscriber: fair-queues inbound messages and delivers the ones whose
//! body starts with a subscribed topic; everything else is dropped on
//! the spot. Sending is not defined.

use std::io;

use global::SocketType;
use message::Message;
use options::SocketOption;
use protocol::{EVENT_IN, PipeSet, Sockbase};
use protocol::fq::FairQueue;
use protocol::pubsub::trie::Trie;
use io_error::{no_protocol_option_error, other_io_error, would_block_error};

pub struct Sub {
    fq: FairQueue,
    subscriptions: Trie
}

impl Sub {
    pub fn new() -> Sub {
        Sub {
            fq: FairQueue::new(),
            subscriptions: Trie::new()
        }
    }
}

impl Sockbase for Sub {
    fn socket_type(&self) -> SocketType {
        SocketType::Sub
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
        loop {
            let (msg, _) = self.fq.recv(set).map(|(msg, flags, _)| (msg, flags))?;

            if self.subscriptions.matches(msg.body()) {
                return Ok(msg);
            }
            trace!("[sub] dropping message matching no subscription");

            if !self.fq.can_recv() {
                return Err(would_block_error());
            }
        }
    }

    fn set_option(&mut self, option: &SocketOption) -> io::Result<()> {
        match *option {
            SocketOption::Subscribe(ref topic) => {
                self.subscriptions.subscribe(topic.as_bytes());
                Ok(())
            },
            SocketOption::Unsubscribe(ref topic) => {
                self.subscriptions.unsubscribe(topic.as_bytes()).map(|_| ())
            },
            _ => Err(no_protocol_option_error())
        }
    }
}
